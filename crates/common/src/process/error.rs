use std::fmt;

use crate::crypto::HybridError;
use crate::profile::{GetError, ProfileError, PutError};
use crate::store::{OpsError, StoreError};

/// Why a step's execute failed
///
/// The sole trigger for whole-process rollback. The variants follow the
/// retry policy boundaries: store errors were already retried (or timed out)
/// below this layer; decryption and precondition failures are never retried;
/// a stop request is an induced failure taking the same rollback path.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The store was unreachable or the operation timed out.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Fetching a remote document failed.
    #[error("get failed: {0}")]
    Get(#[from] GetError),
    /// A CAS update cycle failed after bounded retries.
    #[error("put failed: {0}")]
    Put(PutError),
    /// Content could not be decrypted. Fatal, never retried.
    #[error("decryption failed: {0}")]
    Decryption(#[from] HybridError),
    /// A structural precondition did not hold. Fatal, never retried.
    #[error("precondition failed: {0}")]
    Precondition(#[from] ProfileError),
    /// An ad-hoc precondition reported by a step.
    #[error("precondition failed: {0}")]
    Invalid(String),
    /// Encoding or decoding a document failed.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    /// The process was stopped by its caller before completing.
    #[error("process stopped: {0}")]
    Stopped(String),
}

impl From<OpsError> for ExecutionError {
    fn from(error: OpsError) -> Self {
        match error {
            OpsError::Store(e) => Self::Store(e),
            OpsError::Hybrid(e) => Self::Decryption(e),
            OpsError::Codec(e) => Self::Codec(e),
        }
    }
}

impl From<PutError> for ExecutionError {
    fn from(error: PutError) -> Self {
        // Keep precondition failures recognizable as such even when they
        // surfaced through an update cycle
        match error {
            PutError::Precondition(e) => Self::Precondition(e),
            other => Self::Put(other),
        }
    }
}

/// Why a process is rolling back, as handed to each step's rollback
#[derive(Debug, Clone)]
pub struct RollbackReason {
    /// Name of the step that failed (or was about to run when stopped).
    pub step: String,
    /// Rendered failure cause.
    pub message: String,
}

impl RollbackReason {
    pub fn new(step: impl Into<String>, error: &ExecutionError) -> Self {
        Self {
            step: step.into(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed: {}", self.step, self.message)
    }
}

/// A rollback step itself could not undo its effect
///
/// This is unrecoverable for the owning process: it terminates FAILED and
/// the error is reported, never retried and never silently ignored.
#[derive(Debug, Clone, thiserror::Error)]
#[error("rollback of step '{step}' failed: {message}")]
pub struct RollbackError {
    pub step: String,
    pub message: String,
}

impl RollbackError {
    pub fn new(step: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            step: step.into(),
            message: cause.to_string(),
        }
    }
}
