use nexus_models::NexusError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache key not found: {0}")]
    NotFound(String),

    #[error("cache error: {0}")]
    Other(String),
}

impl From<CacheError> for NexusError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound(_) => NexusError::Internal("unreachable: cache miss is not an error".to_string()),
            other => NexusError::Unavailable(other.to_string()),
        }
    }
}
