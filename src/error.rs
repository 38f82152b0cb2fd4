//! Internal fault taxonomy and the fail-fast escalation path.
//!
//! Nothing in this crate's public surface returns a recoverable `Result`:
//! a contract violation by the caller, or an internal invariant failure in
//! the collector itself, is a programming error rather than a condition a
//! caller can meaningfully handle. `fail` logs (when `gc_logging` is
//! enabled) and then aborts the process -- deliberately not a panic, so
//! that the process dies immediately rather than unwinding through
//! collector state a `catch_unwind` elsewhere might leave inconsistent.

use std::fmt;

#[derive(Debug)]
pub(crate) enum Fault {
    /// The caller violated a documented precondition.
    ContractViolation(&'static str),
    /// The system allocator could not satisfy a request even after a
    /// collection was triggered to make room.
    AllocatorExhausted,
    /// The collector detected its own internal state was inconsistent.
    InvariantFailure(&'static str),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::ContractViolation(msg) => write!(f, "contract violation: {msg}"),
            Fault::AllocatorExhausted => write!(f, "allocator exhausted after collection"),
            Fault::InvariantFailure(msg) => write!(f, "internal invariant failure: {msg}"),
        }
    }
}

pub(crate) fn fail(fault: Fault) -> ! {
    #[cfg(feature = "gc_logging")]
    tracing::error!(target: "convgc", %fault, "fatal collector fault");
    #[cfg(not(feature = "gc_logging"))]
    {
        eprintln!("convgc: fatal collector fault: {fault}");
    }
    std::process::abort()
}

pub(crate) fn require(condition: bool, message: &'static str) {
    if !condition {
        fail(Fault::ContractViolation(message));
    }
}
