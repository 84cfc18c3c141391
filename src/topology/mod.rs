//! Block topology as seen by the exchange engines.
//!
//! - [`direction`]: the 56-slot neighbor encoding
//! - [`neighbor`]: per-block neighbor tables and the rank layout
//! - [`lattice`]: builder for uniform (single-level) block lattices

pub mod direction;
pub mod lattice;
pub mod neighbor;

pub use direction::{Direction, DirectionClass, NEIGHBOR_SLOTS};
pub use neighbor::{BlockPack, NeighborDescriptor, Refinement};
