//! Index ranges moved through each boundary buffer.
//!
//! Ranges are a pure function of the direction (offset and quadrant), the
//! neighbor's relative refinement, the role (pack = send, unpack = receive)
//! and the block extents. The buffer pool sizes storage from
//! [`element_count`], which is computed from the geometry independently;
//! [`IndexBox::count`] of every range must agree with it.
//!
//! Per axis, with interior `s..e`, ghost depth `g`, half-block width `h` and
//! the coarse interior `cs..ce`:
//!
//! | variant | role | offset 0          | offset −1      | offset +1      |
//! |---------|------|-------------------|----------------|----------------|
//! | same    | send | `s..e`            | `s..s+g`       | `e-g..e`       |
//! | same    | recv | `s..e`            | `s-g..s`       | `e..e+g`       |
//! | coarser | send | `cs..ce`          | `cs..cs+g`     | `ce-g..ce`     |
//! | coarser | recv | `cs..ce`          | `cs-g..cs`     | `ce..ce+g`     |
//! | finer   | send | `s+fh..s+(f+1)h`  | `s..s+g`       | `e-g..e`       |
//! | finer   | recv | `s+fh..s+(f+1)h`  | `s-g..s`       | `e..e+g`       |
//!
//! "coarser" ranges index the coarse array; the others index the fine one.

use std::ops::Range;

use itertools::iproduct;

use crate::data::indices::{AxisExtent, RegionIndices};
use crate::topology::direction::{Direction, DirectionClass};
use crate::topology::neighbor::Refinement;

/// Which side of the exchange a range describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Send,
    Recv,
}

/// Which array a range indexes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArraySel {
    Fine,
    Coarse,
}

impl ArraySel {
    pub fn for_variant(variant: Refinement) -> Self {
        match variant {
            Refinement::Coarser => ArraySel::Coarse,
            Refinement::Same | Refinement::Finer => ArraySel::Fine,
        }
    }
}

/// Half-open `(k, j, i)` box of cells.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IndexBox {
    pub k: Range<usize>,
    pub j: Range<usize>,
    pub i: Range<usize>,
}

impl IndexBox {
    pub fn count(&self) -> usize {
        self.k.len() * self.j.len() * self.i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Cells in buffer order: `k` slowest, `i` fastest.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        iproduct!(self.k.clone(), self.j.clone(), self.i.clone())
    }
}

/// Range along one axis.
pub fn axis_range(
    ext: AxisExtent,
    offset: i8,
    quadrant: usize,
    variant: Refinement,
    role: Role,
) -> Range<usize> {
    let g = ext.ng;
    let (s, e) = match variant {
        Refinement::Coarser => {
            let c = ext.coarse();
            (c.s(), c.e())
        }
        Refinement::Same | Refinement::Finer => (ext.s(), ext.e()),
    };
    match (offset, role) {
        (0, _) => match variant {
            Refinement::Finer => {
                let h = ext.half();
                // inactive axes have a single cell and no quadrants
                let q = if ext.is_active() { quadrant } else { 0 };
                let lo = s + q * h;
                lo..lo + h
            }
            Refinement::Same | Refinement::Coarser => s..e,
        },
        (o, Role::Send) if o < 0 => s..s + g,
        (_, Role::Send) => e - g..e,
        (o, Role::Recv) if o < 0 => s - g..s,
        (_, Role::Recv) => e..e + g,
    }
}

/// Cell box packed or unpacked for `dir` at the given refinement.
pub fn index_box(
    indcs: &RegionIndices,
    dir: Direction,
    variant: Refinement,
    role: Role,
) -> IndexBox {
    let r = |a: usize| {
        axis_range(indcs.axis(a), dir.offset(a), dir.quadrant_along(a), variant, role)
    };
    IndexBox {
        k: r(2),
        j: r(1),
        i: r(0),
    }
}

/// Elements per variable exchanged across `dir` at the given refinement.
///
/// Faces move a 2-D cross-section times the ghost depth, edges a line times
/// the ghost depth squared, corners the ghost depth cubed.
pub fn element_count(indcs: &RegionIndices, dir: Direction, variant: Refinement) -> usize {
    (0..3)
        .map(|a| {
            let ext = indcs.axis(a);
            if dir.offset(a) != 0 {
                ext.ng
            } else {
                match variant {
                    Refinement::Same => ext.n,
                    Refinement::Coarser | Refinement::Finer => ext.half(),
                }
            }
        })
        .product()
}

/// Face-flux values per variable sent from a fine block to a coarser face neighbor.
pub fn flux_count(indcs: &RegionIndices, dir: Direction) -> usize {
    if dir.class() != DirectionClass::Face {
        return 0;
    }
    (0..3)
        .filter(|&a| dir.offset(a) == 0)
        .map(|a| indcs.axis(a).half())
        .product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::direction::directions;

    fn all_variants() -> [Refinement; 3] {
        [Refinement::Coarser, Refinement::Same, Refinement::Finer]
    }

    #[test]
    fn same_level_face_ranges() {
        let idx = RegionIndices::new(8, 6, 1, 2).unwrap();
        let d = Direction::new(-1, 0, 0, 0, 0).unwrap();
        let send = index_box(&idx, d, Refinement::Same, Role::Send);
        let recv = index_box(&idx, d, Refinement::Same, Role::Recv);
        assert_eq!((send.i, send.j.clone(), send.k.clone()), (2..4, 2..8, 0..1));
        assert_eq!((recv.i, recv.j, recv.k), (0..2, 2..8, 0..1));
        let dir = Direction::new(0, 1, 0, 0, 0).unwrap();
        let up = index_box(&idx, dir, Refinement::Same, Role::Recv);
        assert_eq!((up.i, up.j), (2..10, 8..10));
    }

    #[test]
    fn finer_quadrants_split_the_face() {
        let idx = RegionIndices::new(8, 8, 1, 2).unwrap();
        let lower = Direction::new(1, 0, 0, 0, 0).unwrap();
        let upper = Direction::new(1, 0, 0, 1, 0).unwrap();
        let q0 = index_box(&idx, lower, Refinement::Finer, Role::Recv);
        let q1 = index_box(&idx, upper, Refinement::Finer, Role::Recv);
        assert_eq!((q0.i.clone(), q0.j), (10..12, 2..6));
        assert_eq!((q1.i, q1.j), (10..12, 6..10));
    }

    #[test]
    fn coarser_ranges_index_the_coarse_array() {
        let idx = RegionIndices::new(8, 8, 1, 2).unwrap();
        let d = Direction::new(0, -1, 0, 0, 0).unwrap();
        let send = index_box(&idx, d, Refinement::Coarser, Role::Send);
        let recv = index_box(&idx, d, Refinement::Coarser, Role::Recv);
        assert_eq!((send.i, send.j), (2..6, 2..4));
        assert_eq!((recv.i, recv.j), (2..6, 0..2));
        assert_eq!(ArraySel::for_variant(Refinement::Coarser), ArraySel::Coarse);
    }

    #[test]
    fn ranges_match_geometric_counts_everywhere() {
        for (nx, ny, nz) in [(8, 1, 1), (8, 6, 1), (6, 8, 4)] {
            let idx = RegionIndices::new(nx, ny, nz, 2).unwrap();
            for (_, d) in directions(idx.ndim()) {
                for v in all_variants() {
                    let n = element_count(&idx, d, v);
                    assert_eq!(index_box(&idx, d, v, Role::Send).count(), n, "{d:?} {v:?}");
                    assert_eq!(index_box(&idx, d, v, Role::Recv).count(), n, "{d:?} {v:?}");
                }
            }
        }
    }

    #[test]
    fn class_shapes() {
        let idx = RegionIndices::new(8, 6, 4, 2).unwrap();
        let face = Direction::new(1, 0, 0, 0, 0).unwrap();
        let edge = Direction::new(1, -1, 0, 0, 0).unwrap();
        let corner = Direction::new(1, 1, 1, 0, 0).unwrap();
        assert_eq!(element_count(&idx, face, Refinement::Same), 6 * 4 * 2);
        assert_eq!(element_count(&idx, edge, Refinement::Same), 4 * 2 * 2);
        assert_eq!(element_count(&idx, corner, Refinement::Same), 8);
        assert_eq!(flux_count(&idx, face), 3 * 2);
        assert_eq!(flux_count(&idx, edge), 0);
    }

    #[test]
    fn buffer_order_is_k_j_i() {
        let b = IndexBox {
            k: 0..1,
            j: 3..5,
            i: 1..3,
        };
        let cells: Vec<_> = b.cells().collect();
        assert_eq!(cells, vec![(0, 3, 1), (0, 3, 2), (0, 4, 1), (0, 4, 2)]);
    }
}
