use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A relation tuple — the atom of authorization data.
///
/// `(tenant_id, object_type, object_id, relation, subject_type,
/// subject_id, subject_relation?, expires_at?, created_at)`. When
/// `subject_relation` is set this is a Zanzibar userset tuple: "every
/// subject that has relation `subject_relation` on
/// `subject_type:subject_id` has `relation` on the object."
///
/// Primary key is every identifying column excluding timestamps. Tuples
/// are logically immutable — "updates" are delete+insert, and deletes
/// leave a record in the change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RelationTuple {
    pub tenant_id: String,
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
    /// The subject's home tenant, set only on `shared_*` tuples where it
    /// differs from `tenant_id` (the object's tenant). `None` means the
    /// subject lives in `tenant_id` same as the object.
    pub subject_tenant_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RelationTuple {
    /// The primary-key tuple (every identifying column).
    pub fn primary_key(&self) -> TuplePrimaryKey {
        TuplePrimaryKey {
            tenant_id: self.tenant_id.clone(),
            object_type: self.object_type.clone(),
            object_id: self.object_id.clone(),
            relation: self.relation.clone(),
            subject_type: self.subject_type.clone(),
            subject_id: self.subject_id.clone(),
            subject_relation: self.subject_relation.clone(),
        }
    }

    pub fn is_userset(&self) -> bool {
        self.subject_relation.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    /// A tuple whose relation begins with `shared_` expresses a
    /// cross-tenant grant — cross-tenant access is expressed only
    /// through `shared_*` relations, never ordinary ones.
    pub fn is_cross_tenant(&self) -> bool {
        self.relation.starts_with("shared_")
    }

    /// The subject's home tenant, defaulting to the object's tenant when
    /// unset.
    pub fn subject_tenant(&self) -> &str {
        self.subject_tenant_id.as_deref().unwrap_or(&self.tenant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuplePrimaryKey {
    pub tenant_id: String,
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
}

/// Request to write a new tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteTupleRequest {
    pub tenant_id: String,
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
    /// Required on `shared_*` tuples whose subject lives in a different
    /// tenant than `tenant_id`; `None` otherwise.
    #[serde(default)]
    pub subject_tenant_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Optional optimistic-concurrency token: reject with `Conflict` if
    /// the tenant's current change-log seq has advanced past this.
    pub expected_seq: Option<i64>,
}

/// Filter for querying tuples; any `None` field matches all values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TupleFilter {
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub relation: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
}
