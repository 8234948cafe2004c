use serde::{Deserialize, Serialize};

/// `(subject_type, subject_id, tenant_id)` — immutable for the scope of
/// one request. Yielded by the (external) authentication layer as
/// already-verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub tenant_id: String,
    pub subject_type: String,
    pub subject_id: String,
}

impl Principal {
    pub fn new(
        tenant_id: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
        }
    }
}

/// Resource identifier within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

/// Either a concrete `(type, id)` or a userset `(type, id, relation)` — a
/// check walks from one to the other via the rewrite tree and the tuple
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    Concrete { r#type: String, id: String },
    Userset { r#type: String, id: String, relation: String },
}

impl Subject {
    pub fn concrete(r#type: impl Into<String>, id: impl Into<String>) -> Self {
        Subject::Concrete { r#type: r#type.into(), id: id.into() }
    }
}
