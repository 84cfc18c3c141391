#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-halo
//!
//! Boundary-data movement for block-structured meshes: ghost-zone (halo)
//! exchange between blocks that may live on different processes and at
//! different refinement levels, plus the orbital-advection remap across the
//! periodic x2 boundary of a shearing box.
//!
//! ## Features
//! - 56-slot neighbor encoding for faces, edges and corners, with refinement quadrants
//! - Buffer pool sized from geometry and cross-checked against the pack/unpack ranges
//! - Exchange engine with a same-rank fast path and pluggable transports
//!   (serial, in-process threads, MPI behind `mpi-support`)
//! - Conservative donor-cell / piecewise-linear column remap and a
//!   divergence-preserving constrained-transport update for face fields
//!
//! ## Exchange round
//!
//! ```text
//! init_recv -> pack_and_send -> recv_and_unpack (until Complete) -> clear_send / clear_recv
//! ```
//!
//! `recv_and_unpack` returns [`TaskStatus::Incomplete`](bvals::TaskStatus) while
//! anything is still in flight and leaves the field untouched; errors are
//! fatal for the run.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-halo = "0.3"
//! # features = ["mpi-support"]
//! ```

pub mod algs;
pub mod bvals;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod mesh_error;
pub mod shearing;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::AsyncMessageTransport;
    pub use crate::algs::communicator::{
        Delivery, LocalCopyTransport, LocalWorld, NoTransport, ProcessContext, Transport, Wait,
    };
    pub use crate::algs::wire::CommTag;
    pub use crate::bvals::{BoundaryValues, BufferKind, BufferStatus, TaskStatus};
    pub use crate::config::{HaloConfig, ShearingBoxConfig};
    pub use crate::data::restrict::restrict_cell_vars;
    pub use crate::data::{
        BlockArray, BlockSize, CellVars, EdgeField, FaceField, Real, RegionIndices,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh_error::MeshHaloError;
    pub use crate::shearing::{
        OrbitalAdvection, OrbitalState, ReconstructionMethod, ShearKind, ct_update, divergence,
    };
    pub use crate::topology::lattice::{Periodicity, UniformLattice};
    pub use crate::topology::{BlockPack, Direction, NeighborDescriptor, Refinement};
}
