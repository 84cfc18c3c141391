//! Neighbor directions and their slot encoding.
//!
//! A [`Direction`] is the geometric relation between a block and one
//! neighbor: an offset of −1/0/+1 along each axis plus, when the neighbor
//! region is more finely refined, the quadrant of the face or edge that the
//! finer neighbor covers. Every direction maps to one of [`NEIGHBOR_SLOTS`]
//! buffer slots; the mapping is defined here and nowhere else.
//!
//! Slot layout (`s(o) = (o + 1) / 2`):
//!
//! | slots  | relation      | index                                  |
//! |--------|---------------|----------------------------------------|
//! | 0–7    | x1 faces      | `4·s(o1) + f1 + 2·f2` (f1 ∥ x2, f2 ∥ x3)  |
//! | 8–15   | x2 faces      | `8 + 4·s(o2) + f1 + 2·f2` (f1 ∥ x1, f2 ∥ x3) |
//! | 16–23  | x1x2 edges    | `16 + 4·s(o2) + 2·s(o1) + f1` (f1 ∥ x3)  |
//! | 24–31  | x3 faces      | `24 + 4·s(o3) + f1 + 2·f2` (f1 ∥ x1, f2 ∥ x2) |
//! | 32–39  | x3x1 edges    | `32 + 4·s(o3) + 2·s(o1) + f1` (f1 ∥ x2)  |
//! | 40–47  | x2x3 edges    | `40 + 4·s(o3) + 2·s(o2) + f1` (f1 ∥ x1)  |
//! | 48–55  | corners       | `48 + 4·s(o3) + 2·s(o2) + s(o1)`          |

use once_cell::sync::Lazy;

use crate::mesh_error::MeshHaloError;

/// Total number of neighbor slots in three dimensions with refinement.
pub const NEIGHBOR_SLOTS: usize = 56;

/// Slot of the −x2 face (quadrant 0).
pub const X2_LOWER_FACE: usize = 8;
/// Slot of the +x2 face (quadrant 0).
pub const X2_UPPER_FACE: usize = 12;

/// Number of slots in use for a mesh of the given dimensionality.
pub const fn active_slots(ndim: usize) -> usize {
    match ndim {
        1 => 8,
        2 => 24,
        _ => NEIGHBOR_SLOTS,
    }
}

/// Geometric class of a direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DirectionClass {
    Face,
    Edge,
    Corner,
}

/// A neighbor relation: per-axis offsets and the sub-block quadrant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Direction {
    offset: [i8; 3],
    quadrant: [u8; 2],
}

static DIRECTION_TABLE: Lazy<[Direction; NEIGHBOR_SLOTS]> = Lazy::new(|| {
    let mut table = [Direction {
        offset: [0; 3],
        quadrant: [0; 2],
    }; NEIGHBOR_SLOTS];
    let mut filled = [false; NEIGHBOR_SLOTS];
    for o3 in -1i8..=1 {
        for o2 in -1i8..=1 {
            for o1 in -1i8..=1 {
                if (o1, o2, o3) == (0, 0, 0) {
                    continue;
                }
                let nfree = [o1, o2, o3].iter().filter(|&&o| o == 0).count();
                let (nf1, nf2) = match nfree {
                    2 => (2, 2),
                    1 => (2, 1),
                    _ => (1, 1),
                };
                for f2 in 0..nf2 {
                    for f1 in 0..nf1 {
                        let d = Direction {
                            offset: [o1, o2, o3],
                            quadrant: [f1, f2],
                        };
                        let slot = d.slot();
                        debug_assert!(!filled[slot], "slot {slot} encoded twice");
                        filled[slot] = true;
                        table[slot] = d;
                    }
                }
            }
        }
    }
    debug_assert!(filled.iter().all(|&f| f));
    table
});

#[inline]
fn side(o: i8) -> usize {
    ((o + 1) / 2) as usize
}

impl Direction {
    /// Build a direction from axis offsets and quadrant indices.
    ///
    /// Quadrant indices that do not apply to the direction's class must be 0.
    pub fn new(ox1: i8, ox2: i8, ox3: i8, f1: u8, f2: u8) -> Result<Self, MeshHaloError> {
        let offset = [ox1, ox2, ox3];
        if offset.iter().any(|o| !(-1..=1).contains(o)) || offset == [0, 0, 0] {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "direction offsets {offset:?} must be in -1..=1 and not all zero"
            )));
        }
        let d = Self {
            offset,
            quadrant: [f1, f2],
        };
        let (n1, n2) = d.quadrant_limits();
        if f1 >= n1 || f2 >= n2 {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "quadrant ({f1},{f2}) not valid for {:?} direction {offset:?}",
                d.class()
            )));
        }
        Ok(d)
    }

    /// Decode a slot index.
    pub fn from_slot(slot: usize) -> Result<Self, MeshHaloError> {
        DIRECTION_TABLE
            .get(slot)
            .copied()
            .ok_or(MeshHaloError::InvalidDirection(slot))
    }

    /// Encode this direction as a slot index.
    pub fn slot(self) -> usize {
        let [o1, o2, o3] = self.offset;
        let [f1, f2] = [self.quadrant[0] as usize, self.quadrant[1] as usize];
        match (o1 != 0, o2 != 0, o3 != 0) {
            (true, false, false) => 4 * side(o1) + f1 + 2 * f2,
            (false, true, false) => 8 + 4 * side(o2) + f1 + 2 * f2,
            (true, true, false) => 16 + 4 * side(o2) + 2 * side(o1) + f1,
            (false, false, true) => 24 + 4 * side(o3) + f1 + 2 * f2,
            (true, false, true) => 32 + 4 * side(o3) + 2 * side(o1) + f1,
            (false, true, true) => 40 + 4 * side(o3) + 2 * side(o2) + f1,
            (true, true, true) => 48 + 4 * side(o3) + 2 * side(o2) + side(o1),
            (false, false, false) => unreachable!("zero offset rejected at construction"),
        }
    }

    /// Offset along `axis` (0-based).
    #[inline]
    pub fn offset(self, axis: usize) -> i8 {
        self.offset[axis]
    }

    pub fn offsets(self) -> [i8; 3] {
        self.offset
    }

    pub fn class(self) -> DirectionClass {
        match self.offset.iter().filter(|&&o| o != 0).count() {
            1 => DirectionClass::Face,
            2 => DirectionClass::Edge,
            _ => DirectionClass::Corner,
        }
    }

    /// Axes carried by the quadrant indices `(f1, f2)`, in that order.
    pub fn quadrant_axes(self) -> [Option<usize>; 2] {
        match (self.offset[0] != 0, self.offset[1] != 0, self.offset[2] != 0) {
            (true, false, false) => [Some(1), Some(2)],
            (false, true, false) => [Some(0), Some(2)],
            (false, false, true) => [Some(0), Some(1)],
            (true, true, false) => [Some(2), None],
            (true, false, true) => [Some(1), None],
            (false, true, true) => [Some(0), None],
            _ => [None, None],
        }
    }

    /// Sub-block quadrant (0 or 1) along `axis`; 0 for axes crossed by the direction.
    pub fn quadrant_along(self, axis: usize) -> usize {
        let axes = self.quadrant_axes();
        axes.iter()
            .zip(self.quadrant)
            .find(|(a, _)| **a == Some(axis))
            .map_or(0, |(_, f)| f as usize)
    }

    /// The same relation seen from the neighbor, quadrant reset to 0.
    pub fn reversed(self) -> Self {
        Self {
            offset: self.offset.map(|o| -o),
            quadrant: [0, 0],
        }
    }

    /// Whether the direction only crosses axes active in an `ndim` mesh.
    pub fn is_active(self, ndim: usize) -> bool {
        self.slot() < active_slots(ndim)
    }

    fn quadrant_limits(self) -> (u8, u8) {
        match self.quadrant_axes() {
            [Some(_), Some(_)] => (2, 2),
            [Some(_), None] => (2, 1),
            _ => (1, 1),
        }
    }
}

/// Iterate over every direction active in an `ndim` mesh, in slot order.
pub fn directions(ndim: usize) -> impl Iterator<Item = (usize, Direction)> {
    DIRECTION_TABLE[..active_slots(ndim)]
        .iter()
        .copied()
        .enumerate()
}
