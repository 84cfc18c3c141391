//! Field storage, block extents and restriction.

pub mod array;
pub mod indices;
pub mod restrict;

/// Floating-point type of every exchanged field.
pub type Real = f64;

pub use array::{BlockArray, CellVars, EdgeField, FaceField};
pub use indices::{AxisExtent, BlockSize, RegionIndices};
