use crate::tuple::RelationTuple;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "changelog_kind", rename_all = "lowercase"))]
pub enum ChangeKind {
    Write,
    Delete,
}

/// `(seq, tenant, tuple_before?, tuple_after?, kind, ts)`. Monotonic per
/// tenant. A schema reload also produces a synthetic entry (kind =
/// `Write`, tuple fields both `None`) so it can be dispatched through the
/// same invalidation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub seq: i64,
    pub tenant_id: String,
    pub kind: ChangeKind,
    pub tuple_before: Option<RelationTuple>,
    pub tuple_after: Option<RelationTuple>,
    pub ts: DateTime<Utc>,
}

impl ChangeLogEntry {
    /// `true` for the synthetic "schema changed, invalidate everything
    /// for this tenant" entry emitted on schema reload.
    pub fn is_schema_reload(&self) -> bool {
        self.tuple_before.is_none() && self.tuple_after.is_none()
    }

    /// The tuple this entry concerns, preferring the post-write tuple.
    pub fn tuple(&self) -> Option<&RelationTuple> {
        self.tuple_after.as_ref().or(self.tuple_before.as_ref())
    }
}
