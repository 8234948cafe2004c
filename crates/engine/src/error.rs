use nexus_models::NexusError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] nexus_store::StoreError),

    #[error(transparent)]
    Schema(#[from] nexus_schema::SchemaError),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("cycle detected resolving {0}")]
    CycleDetected(String),

    /// An already-classified core error, re-wrapped. Produced when a
    /// cached evaluation attempt fails and the failure must propagate to
    /// callers that only share the `Arc` the cache handed back, not the
    /// original owned error.
    #[error(transparent)]
    Core(#[from] NexusError),
}

impl From<EngineError> for NexusError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(e) => e.into(),
            EngineError::Schema(e) => e.into(),
            EngineError::DeadlineExceeded => NexusError::DeadlineExceeded,
            EngineError::CycleDetected(msg) => NexusError::CycleDetected(msg),
            EngineError::Core(e) => e,
        }
    }
}
