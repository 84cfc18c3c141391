//! MeshHaloError: Unified error type for mesh-halo public APIs
//!
//! Every fallible operation in the crate returns this type. Transport
//! failures are fatal for the run; configuration variants are raised at
//! setup time (buffer allocation, engine construction) and never during an
//! exchange round.

use thiserror::Error;

use crate::algs::wire::CommTag;

/// Unified error type for mesh-halo operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshHaloError {
    /// Posting, testing or waiting on a non-blocking transfer failed.
    #[error("transport failure in {op} (peer {peer}, tag {tag}): {reason}")]
    Transport {
        op: &'static str,
        peer: usize,
        tag: CommTag,
        reason: String,
    },
    /// A received payload did not have the length the receiver computed.
    #[error("payload from rank {peer}: expected {expected} values, got {actual}")]
    PayloadLength {
        peer: usize,
        expected: usize,
        actual: usize,
    },
    /// Buffer storage does not match the pack/unpack index ranges.
    #[error("buffer slot {slot} ({variant}): sized for {expected} elements, ranges cover {actual}")]
    BufferSizeMismatch {
        slot: usize,
        variant: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A neighbor slot index outside the direction table.
    #[error("invalid neighbor slot {0}")]
    InvalidDirection(usize),
    /// A global block id that is not owned by the expected rank.
    #[error("block with global id {0} is not part of this pack")]
    MissingBlock(usize),
    /// Neighbor tables inconsistent with the block pack or with each other.
    #[error("topology mismatch: {0}")]
    TopologyMismatch(String),
    /// Two local packs target the same receive buffer in one round.
    #[error("receive buffer (block {block}, slot {slot}) has more than one writer")]
    DuplicateDestination { block: usize, slot: usize },
    /// A same-process pack reached a receive buffer whose receive was never initialised.
    #[error("receive buffer (block {block}, slot {slot}) written before init_recv")]
    ReceiveNotPosted { block: usize, slot: usize },
    /// A receive buffer was read while its transfer was still in flight.
    #[error("receive buffer (block {block}, slot {slot}) read before completion")]
    NotReady { block: usize, slot: usize },
    /// Reconstruction selector not implemented for the remap step.
    #[error("reconstruction method `{0}` is not supported by the orbital remap")]
    UnsupportedReconstruction(String),
    /// Integer shift larger than the exchanged ghost rows can serve.
    #[error("integer shift {shift} exceeds the configured maximum {max}")]
    ShiftOutOfRange { shift: i64, max: usize },
    /// Block extents incompatible with the requested exchange.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Configuration values rejected at setup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Debug invariant check failed.
    #[error("invariant violated: {0}")]
    Invariant(String),
}
