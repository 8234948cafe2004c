pub mod error;
pub mod registry;
pub mod validate;

pub use error::{Result, SchemaError};
pub use registry::{InMemorySchemaRegistry, PostgresSchemaRegistry, SchemaRegistry};
pub use validate::{schema_to_dsl, validate_schema};
