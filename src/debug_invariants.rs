//! Invariant hooks for the buffer pool and the exchange engines.

use crate::mesh_error::MeshHaloError;

/// Structures whose internal bookkeeping can be re-validated on demand.
pub trait DebugInvariants {
    /// Validate invariants and return the first violation found.
    fn validate_invariants(&self) -> Result<(), MeshHaloError>;

    /// Panic on a violation, but only in debug builds or when one of the
    /// invariant-checking features is on.
    fn debug_assert_invariants(&self) {
        crate::halo_invariants!(self.validate_invariants(), "debug_assert_invariants");
    }
}

/// Run a fallible check and panic with context when invariant checking is on.
#[macro_export]
macro_rules! halo_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[halo invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
