//! Message transports and the wire format they carry.

pub mod communicator;
pub mod wire;

pub use communicator::{Delivery, LocalWorld, NoTransport, ProcessContext, Transport, Wait};
