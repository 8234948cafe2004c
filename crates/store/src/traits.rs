use async_trait::async_trait;
use nexus_models::{ChangeLogEntry, ObjectRef, RelationTuple, TupleFilter, TuplePrimaryKey, WriteTupleRequest};

use crate::error::Result;

/// Durable store of relation tuples plus the append-only change log.
///
/// A successful write is visible to subsequent reads from the same
/// process immediately; cross-process visibility is bounded by the
/// change-log poll interval. Writes are transactional per tuple; bulk
/// writes are atomic per batch. Reverse-index maintenance (the
/// `(tenant,subject_type,subject_id,relation)` index) happens in the same
/// transaction as the primary write.
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Idempotent if an identical tuple is already present. Returns the
    /// change-log seq the write was assigned. Fails `Conflict` if
    /// `expected_seq` is set and stale, `CycleDetected` if this is a
    /// `parent`-relation write that would create a cycle.
    async fn write(&self, request: WriteTupleRequest) -> Result<i64>;

    /// Idempotent — deleting an absent tuple is a no-op that still
    /// returns the current seq.
    async fn delete(&self, tenant_id: &str, pk: &TuplePrimaryKey) -> Result<i64>;

    async fn lookup_by_object(
        &self,
        tenant_id: &str,
        object_type: &str,
        object_id: &str,
        filter: &TupleFilter,
    ) -> Result<Vec<RelationTuple>>;

    async fn lookup_by_subject(
        &self,
        tenant_id: &str,
        subject_type: &str,
        subject_id: &str,
        filter: &TupleFilter,
    ) -> Result<Vec<RelationTuple>>;

    /// Follow `tupleset_relation` from `(object_type, object_id)` to the
    /// referenced objects — the primitive `tuple_to_userset` is built on.
    async fn lookup_tupleset(
        &self,
        tenant_id: &str,
        object_type: &str,
        object_id: &str,
        tupleset_relation: &str,
    ) -> Result<Vec<ObjectRef>>;

    async fn changelog_scan(
        &self,
        tenant_id: &str,
        since_seq: i64,
        max: usize,
    ) -> Result<Vec<ChangeLogEntry>>;

    /// The tenant's current (highest) change-log seq, used as the
    /// consistency token for a cold/empty read.
    async fn current_seq(&self, tenant_id: &str) -> Result<i64>;
}
