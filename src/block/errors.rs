//! Error taxonomy for block construction, resolution, and execution.
//!
//! Construction-time errors (`InvalidInput`, `DependencyError`) fail fast and
//! leave the block untouched. Resolution-time ledger mismatches
//! (`ObjectNotFound`, `ObjectNotShared`) are caller errors and never retried.
//! Only transient transport errors (`Rpc`) are retryable; exhausting the
//! bounded backoff surfaces `ResolutionTimeout`. `Aborted` and `Failed` are
//! terminal ledger outcomes reported verbatim.

use thiserror::Error;

use crate::types::ObjectId;

/// Result alias used throughout the crate.
pub type PtbResult<T> = std::result::Result<T, PtbError>;

/// Error type covering the whole block lifecycle.
#[derive(Error, Debug)]
pub enum PtbError {
    /// Malformed caller input: bad ids, a pure value whose encoding does not
    /// match its declared type tag, or a call arity mismatch against the
    /// signature table.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Bad reference ordering or ownership: a forward result reference, an
    /// out-of-range handle, or a handle minted by a different block.
    #[error("Dependency error: {0}")]
    DependencyError(String),

    /// The referenced object does not exist on the ledger.
    #[error("Object not found: {id}")]
    ObjectNotFound { id: ObjectId },

    /// The object's actual ownership contradicts the reference hint
    /// (shared-hinted object is owned, or the reverse).
    #[error("Ownership mismatch for {id}: {detail}")]
    ObjectNotShared { id: ObjectId, detail: String },

    /// Bounded retry policy exhausted while talking to the ledger.
    #[error("Timed out waiting on ledger after {attempts} attempts")]
    ResolutionTimeout { attempts: u32 },

    /// Transient transport-level failure. The only retryable variant.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Encoded block exceeds the ledger's maximum transaction size.
    #[error("Serialized block is {size} bytes, exceeds maximum {max}")]
    SerializationOverflow { size: usize, max: usize },

    /// Serialization reached an input that was never resolved. Programmer
    /// error: resolve the pool before serializing. Fatal, never retried.
    #[error("Unresolved input reference at pool index {index}")]
    UnresolvedReference { index: u16 },

    /// Signing capability failure, including signer/sender mismatch.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The ledger executed the block but a command signaled a domain abort.
    /// Terminal; the reason is reported verbatim.
    #[error("Block aborted by ledger: {reason}")]
    Aborted { reason: String },

    /// The ledger could not execute the block at all (invalid signature,
    /// expired block, unknown package). Terminal.
    #[error("Block failed to execute: {reason}")]
    Failed { reason: String },

    /// Wrapped error from external crates.
    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl PtbError {
    /// Whether retrying the failed operation might succeed.
    ///
    /// Only transient transport errors qualify. Abort/failure outcomes and
    /// resolution-time mismatches are terminal by contract.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }

    /// Error category for logging and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "input",
            Self::DependencyError(_) => "dependency",
            Self::ObjectNotFound { .. } => "resolution",
            Self::ObjectNotShared { .. } => "resolution",
            Self::ResolutionTimeout { .. } => "timeout",
            Self::Rpc(_) => "rpc",
            Self::SerializationOverflow { .. } => "serialization",
            Self::UnresolvedReference { .. } => "serialization",
            Self::Signing(_) => "signing",
            Self::Aborted { .. } => "aborted",
            Self::Failed { .. } => "failed",
            Self::External(_) => "external",
        }
    }
}

// Convenience constructors for common scenarios
impl PtbError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    pub fn dependency(reason: impl Into<String>) -> Self {
        Self::DependencyError(reason.into())
    }

    pub fn rpc(reason: impl Into<String>) -> Self {
        Self::Rpc(reason.into())
    }

    pub fn signing(reason: impl Into<String>) -> Self {
        Self::Signing(reason.into())
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted { reason: reason.into() }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PtbError::invalid_input("bad tag");
        assert_eq!(err.to_string(), "Invalid input: bad tag");

        let err = PtbError::SerializationOverflow { size: 200_000, max: 131_072 };
        assert_eq!(
            err.to_string(),
            "Serialized block is 200000 bytes, exceeds maximum 131072"
        );
    }

    #[test]
    fn test_error_retryability() {
        assert!(PtbError::rpc("connection reset").is_retryable());

        assert!(!PtbError::invalid_input("x").is_retryable());
        assert!(!PtbError::dependency("x").is_retryable());
        assert!(!PtbError::aborted("insufficient funds").is_retryable());
        assert!(!PtbError::failed("unknown package").is_retryable());
        assert!(!PtbError::UnresolvedReference { index: 0 }.is_retryable());
        assert!(!PtbError::ResolutionTimeout { attempts: 5 }.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(PtbError::rpc("x").category(), "rpc");
        assert_eq!(PtbError::signing("x").category(), "signing");
        assert_eq!(
            PtbError::ObjectNotFound { id: crate::types::ObjectId::new([0xAA; 32]) }.category(),
            "resolution"
        );
    }
}
