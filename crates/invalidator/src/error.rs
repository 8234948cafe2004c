use nexus_models::NexusError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InvalidatorError>;

#[derive(Debug, Error)]
pub enum InvalidatorError {
    #[error(transparent)]
    Store(#[from] nexus_store::StoreError),
}

impl From<InvalidatorError> for NexusError {
    fn from(err: InvalidatorError) -> Self {
        match err {
            InvalidatorError::Store(e) => e.into(),
        }
    }
}
