//! Run-time configuration of the exchange layer.
//!
//! Both structs deserialize with `serde`, missing fields falling back to
//! [`Default`], so a driver can embed them in its own parameter file.

use serde::{Deserialize, Serialize};

use crate::data::array::CellVars;
use crate::data::indices::RegionIndices;
use crate::mesh_error::MeshHaloError;
use crate::shearing::remap::ReconstructionMethod;

/// Block-exchange parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaloConfig {
    /// Ghost cells on each side of every active axis.
    pub ghost_depth: usize,
    /// Allocate coarse arrays for neighbors at a different level.
    pub multilevel: bool,
}

impl Default for HaloConfig {
    fn default() -> Self {
        Self {
            ghost_depth: 2,
            multilevel: false,
        }
    }
}

impl HaloConfig {
    /// Index extents of a `nx1 × nx2 × nx3` block with this ghost depth.
    pub fn region_indices(
        &self,
        nx1: usize,
        nx2: usize,
        nx3: usize,
    ) -> Result<RegionIndices, MeshHaloError> {
        let indcs = RegionIndices::new(nx1, nx2, nx3, self.ghost_depth)?;
        if self.multilevel {
            indcs.check_multilevel()?;
        }
        Ok(indcs)
    }

    /// Cell-centered storage for `nmb` blocks, with a coarse copy when multi-level.
    pub fn cell_vars(&self, nmb: usize, nvar: usize, indcs: &RegionIndices) -> CellVars {
        CellVars::new(nmb, nvar, indcs, self.multilevel)
    }
}

/// Shearing-box parameters used by orbital advection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShearingBoxConfig {
    /// Dimensionless shear parameter `q` (1.5 for Keplerian flow).
    pub qshear: f64,
    /// Angular velocity of the rotating frame.
    pub omega0: f64,
    /// Largest integer cell shift; derived from the time-step bound when absent.
    pub max_jshift: Option<usize>,
    pub reconstruction: ReconstructionMethod,
}

impl Default for ShearingBoxConfig {
    fn default() -> Self {
        Self {
            qshear: 1.5,
            omega0: 1.0,
            max_jshift: None,
            reconstruction: ReconstructionMethod::Plm,
        }
    }
}

impl ShearingBoxConfig {
    pub fn validate(&self) -> Result<(), MeshHaloError> {
        if !self.qshear.is_finite() || !self.omega0.is_finite() {
            return Err(MeshHaloError::InvalidConfig(format!(
                "shear rate {} and angular velocity {} must be finite",
                self.qshear, self.omega0
            )));
        }
        self.reconstruction.check_remap_support()
    }
}
