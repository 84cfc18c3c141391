//! Index extents of a block and its physical size.
//!
//! Every block in a pack has the same logical shape: `n` interior cells per
//! axis surrounded by `ng` ghost cells on both sides of each *active* axis.
//! Inactive axes (x2 in 1-D, x3 in 1-D/2-D) have one cell and no ghosts.
//! Interior cells along an axis occupy the half-open range `s()..e()`.

use serde::{Deserialize, Serialize};

use crate::data::Real;
use crate::mesh_error::MeshHaloError;

/// Extent of one axis of a block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisExtent {
    /// Interior cells.
    pub n: usize,
    /// Ghost depth on each side (0 on an inactive axis).
    pub ng: usize,
}

impl AxisExtent {
    pub const INACTIVE: AxisExtent = AxisExtent { n: 1, ng: 0 };

    #[inline]
    pub fn is_active(self) -> bool {
        self.ng > 0
    }

    /// First interior index.
    #[inline]
    pub fn s(self) -> usize {
        self.ng
    }

    /// One past the last interior index.
    #[inline]
    pub fn e(self) -> usize {
        self.ng + self.n
    }

    /// Total cells including ghosts.
    #[inline]
    pub fn ncells(self) -> usize {
        self.n + 2 * self.ng
    }

    /// Interior cells covered by half the block (one refinement quadrant).
    #[inline]
    pub fn half(self) -> usize {
        if self.is_active() { self.n / 2 } else { 1 }
    }

    /// Extent of the same axis in the coarse (restricted) array.
    pub fn coarse(self) -> AxisExtent {
        AxisExtent {
            n: self.half(),
            ng: self.ng,
        }
    }
}

/// Index extents shared by every block of a pack.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionIndices {
    pub axes: [AxisExtent; 3],
}

impl RegionIndices {
    /// Extents for `nx1 × nx2 × nx3` interior cells and ghost depth `ng`.
    ///
    /// An axis with one interior cell is inactive (x2 only when x3 is
    /// inactive too, matching 1-D/2-D/3-D meshes).
    pub fn new(nx1: usize, nx2: usize, nx3: usize, ng: usize) -> Result<Self, MeshHaloError> {
        if nx1 == 0 || nx2 == 0 || nx3 == 0 || ng == 0 {
            return Err(MeshHaloError::InvalidGeometry(format!(
                "extents ({nx1},{nx2},{nx3}) and ghost depth {ng} must be positive"
            )));
        }
        if nx2 == 1 && nx3 > 1 {
            return Err(MeshHaloError::InvalidGeometry(
                "x3 cannot be active while x2 is inactive".into(),
            ));
        }
        let axis = |n: usize, active: bool| {
            if active {
                AxisExtent { n, ng }
            } else {
                AxisExtent::INACTIVE
            }
        };
        let idx = Self {
            axes: [axis(nx1, true), axis(nx2, nx2 > 1), axis(nx3, nx3 > 1)],
        };
        for (a, ext) in idx.axes.iter().enumerate() {
            if ext.is_active() && ext.n < ng {
                return Err(MeshHaloError::InvalidGeometry(format!(
                    "axis x{} has {} interior cells, fewer than ghost depth {ng}",
                    a + 1,
                    ext.n
                )));
            }
        }
        Ok(idx)
    }

    #[inline]
    pub fn axis(&self, a: usize) -> AxisExtent {
        self.axes[a]
    }

    pub fn ng(&self) -> usize {
        self.axes[0].ng
    }

    pub fn ndim(&self) -> usize {
        self.axes.iter().filter(|a| a.is_active()).count()
    }

    pub fn multi_d(&self) -> bool {
        self.axes[1].is_active()
    }

    pub fn three_d(&self) -> bool {
        self.axes[2].is_active()
    }

    /// `(nk, nj, ni)` including ghosts.
    pub fn cell_dims(&self) -> (usize, usize, usize) {
        (
            self.axes[2].ncells(),
            self.axes[1].ncells(),
            self.axes[0].ncells(),
        )
    }

    /// Extents of the coarse array used on multi-level meshes.
    pub fn coarse(&self) -> RegionIndices {
        RegionIndices {
            axes: self.axes.map(AxisExtent::coarse),
        }
    }

    /// Multi-level exchange needs even interior counts and coarse interiors
    /// at least one ghost depth wide.
    pub fn check_multilevel(&self) -> Result<(), MeshHaloError> {
        for (a, ext) in self.axes.iter().enumerate() {
            if !ext.is_active() {
                continue;
            }
            if ext.n % 2 != 0 || ext.half() < ext.ng {
                return Err(MeshHaloError::InvalidGeometry(format!(
                    "axis x{}: {} cells cannot be split into coarse halves of at least {} cells",
                    a + 1,
                    ext.n,
                    ext.ng
                )));
            }
        }
        Ok(())
    }
}

/// Physical bounds and cell widths of one block.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockSize {
    pub min: [Real; 3],
    pub max: [Real; 3],
    pub dx: [Real; 3],
}

impl BlockSize {
    pub fn new(min: [Real; 3], max: [Real; 3], indcs: &RegionIndices) -> Self {
        let dx = std::array::from_fn(|a| (max[a] - min[a]) / indcs.axes[a].n as Real);
        Self { min, max, dx }
    }
}

/// Position of the center of interior cell `i` (0-based from the first interior cell).
#[inline]
pub fn cell_center_x(i: isize, nx: usize, xmin: Real, xmax: Real) -> Real {
    let lw = (i as Real + 0.5) / nx as Real;
    xmin * (1.0 - lw) + xmax * lw
}

/// Position of the left face of interior cell `i`.
#[inline]
pub fn left_edge_x(i: isize, nx: usize, xmin: Real, xmax: Real) -> Real {
    let lw = i as Real / nx as Real;
    xmin * (1.0 - lw) + xmax * lw
}
