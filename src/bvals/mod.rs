//! Boundary values: buffer pool, pack/unpack kernels and the exchange engine.

pub mod buffer;
pub mod engine;
pub mod index_ranges;
pub mod kernels;
pub mod pool;

pub use buffer::{BoundaryBuffer, BufferCounts, BufferKind, BufferStatus, Lane};
pub use engine::{BoundaryValues, TaskStatus};
pub use pool::BufferPool;
