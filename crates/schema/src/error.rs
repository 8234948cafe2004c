use nexus_models::NexusError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemaError>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema for tenant {0} has no current version")]
    NoCurrentVersion(String),

    #[error("schema is invalid: {0:?}")]
    Invalid(Vec<String>),

    #[error("unknown permission {object_type}#{permission}")]
    UnknownPermission { object_type: String, permission: String },

    #[error("unknown object type {0}")]
    UnknownObjectType(String),
}

impl From<SchemaError> for NexusError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Database(e) => NexusError::Unavailable(e.to_string()),
            SchemaError::NoCurrentVersion(t) => NexusError::TenantGone(t),
            SchemaError::Invalid(errs) => NexusError::InvalidArgument(errs.join("; ")),
            SchemaError::UnknownPermission { object_type, permission } => {
                NexusError::UnknownPermission { object_type, permission }
            }
            SchemaError::UnknownObjectType(t) => NexusError::UnknownObjectType(t),
        }
    }
}
