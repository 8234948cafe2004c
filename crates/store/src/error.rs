use nexus_models::NexusError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("tenant {0} is gone")]
    TenantGone(String),

    #[error("concurrent write conflict on {0}")]
    Conflict(String),

    #[error("parent-relation write would create a cycle: {0}")]
    CycleDetected(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<StoreError> for NexusError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => NexusError::Unavailable(e.to_string()),
            StoreError::TenantGone(t) => NexusError::TenantGone(t),
            StoreError::Conflict(msg) => NexusError::Conflict(msg),
            StoreError::CycleDetected(msg) => NexusError::CycleDetected(msg),
            StoreError::InvalidArgument(msg) => NexusError::InvalidArgument(msg),
        }
    }
}
