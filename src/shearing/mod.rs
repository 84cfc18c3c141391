//! Shearing-box orbital advection: shift decomposition, conservative column
//! remap and the constrained-transport update of face-centered fields.

pub mod ct;
pub mod orbital;
pub mod remap;
pub mod shift;

pub use ct::{ct_update, divergence};
pub use orbital::{OrbitalAdvection, SHEAR_SLOTS, ShearKind};
pub use remap::ReconstructionMethod;
pub use shift::{OrbitalState, ShiftSplit, split_shift};
