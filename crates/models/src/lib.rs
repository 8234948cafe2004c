pub mod changelog;
pub mod check;
pub mod error;
pub mod ids;
pub mod schema;
pub mod tuple;

pub use changelog::{ChangeKind, ChangeLogEntry};
pub use check::{
    BulkCheckItem, BulkCheckRequest, CheckRequest, Consistency, Decision, TraceStep,
};
pub use error::{NexusError, Result};
pub use ids::{ObjectRef, Principal, Subject};
pub use schema::{Rule, Schema, TypeDefinition};
pub use tuple::{RelationTuple, TupleFilter, TuplePrimaryKey, WriteTupleRequest};
