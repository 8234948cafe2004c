use thiserror::Error;

pub type Result<T> = std::result::Result<T, NexusError>;

/// The core's error kinds, per the error-handling design: these are kinds
/// (a small closed vocabulary the evaluator and host map to HTTP/GRPC
/// status), not an open-ended error type hierarchy.
#[derive(Debug, Clone, Error)]
pub enum NexusError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema lookup miss. Recoverable — the evaluator maps this to deny
    /// without retrying, per the fail-closed contract.
    #[error("unknown permission: {object_type}#{permission}")]
    UnknownPermission {
        object_type: String,
        permission: String,
    },

    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant {0} is gone")]
    TenantGone(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("cycle detected evaluating {0}")]
    CycleDetected(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl NexusError {
    /// Whether this error kind is safe to retry with backoff: `Unavailable`
    /// gets bounded retry; schema misses do not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NexusError::Unavailable(_))
    }

    /// Whether a failure of this kind should resolve to a deny decision
    /// rather than bubble up as an error to the caller.
    pub fn resolves_to_deny(&self) -> bool {
        matches!(
            self,
            NexusError::UnknownPermission { .. }
                | NexusError::UnknownObjectType(_)
                | NexusError::CycleDetected(_)
        )
    }
}
