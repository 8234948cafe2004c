use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use nexus_models::{
    ChangeKind, ChangeLogEntry, ObjectRef, RelationTuple, TupleFilter, TuplePrimaryKey,
    WriteTupleRequest,
};

use crate::error::{Result, StoreError};
use crate::traits::TupleStore;

const PARENT_RELATION: &str = "parent";

#[derive(Default)]
struct Inner {
    tuples: Vec<RelationTuple>,
    changelog: Vec<ChangeLogEntry>,
}

/// In-process `TupleStore` for unit tests and engine-level scenario
/// tests — no database required. Enforces the same acyclicity and
/// idempotency invariants as the Postgres implementation.
#[derive(Default)]
pub struct InMemoryTupleStore {
    inner: Mutex<Inner>,
}

impl InMemoryTupleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn would_cycle(inner: &Inner, tenant_id: &str, object_type: &str, object_id: &str, subject_id: &str) -> bool {
        if object_id == subject_id {
            return true;
        }
        let mut frontier = vec![subject_id.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = frontier.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if id == object_id {
                return true;
            }
            for t in &inner.tuples {
                if t.tenant_id == tenant_id
                    && t.object_type == object_type
                    && t.object_id == id
                    && t.relation == PARENT_RELATION
                    && t.subject_type == object_type
                {
                    frontier.push(t.subject_id.clone());
                }
            }
        }
        false
    }
}

#[async_trait]
impl TupleStore for InMemoryTupleStore {
    async fn write(&self, request: WriteTupleRequest) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();

        if request.relation == PARENT_RELATION
            && request.object_type == request.subject_type
            && Self::would_cycle(&inner, &request.tenant_id, &request.object_type, &request.object_id, &request.subject_id)
        {
            return Err(StoreError::CycleDetected(format!(
                "{}:{} -> parent -> {}:{}",
                request.object_type, request.object_id, request.subject_type, request.subject_id
            )));
        }

        if let Some(expected) = request.expected_seq {
            let current = inner.changelog.last().map(|e| e.seq).unwrap_or(0);
            if current != expected {
                return Err(StoreError::Conflict(format!(
                    "expected seq {expected}, tenant is at {current}"
                )));
            }
        }

        if let Some(existing) = inner.tuples.iter_mut().find(|t| {
            t.tenant_id == request.tenant_id
                && t.object_type == request.object_type
                && t.object_id == request.object_id
                && t.relation == request.relation
                && t.subject_type == request.subject_type
                && t.subject_id == request.subject_id
                && t.subject_relation == request.subject_relation
        }) {
            existing.expires_at = request.expires_at;
            let seq = inner.changelog.last().map(|e| e.seq).unwrap_or(0);
            return Ok(seq);
        }

        let tuple = RelationTuple {
            tenant_id: request.tenant_id.clone(),
            object_type: request.object_type,
            object_id: request.object_id,
            relation: request.relation,
            subject_type: request.subject_type,
            subject_id: request.subject_id,
            subject_relation: request.subject_relation,
            subject_tenant_id: request.subject_tenant_id,
            expires_at: request.expires_at,
            created_at: Utc::now(),
        };
        inner.tuples.push(tuple.clone());

        let seq = inner.changelog.last().map(|e| e.seq).unwrap_or(0) + 1;
        inner.changelog.push(ChangeLogEntry {
            seq,
            tenant_id: request.tenant_id,
            kind: ChangeKind::Write,
            tuple_before: None,
            tuple_after: Some(tuple),
            ts: Utc::now(),
        });

        Ok(seq)
    }

    async fn delete(&self, tenant_id: &str, pk: &TuplePrimaryKey) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();

        let position = inner.tuples.iter().position(|t| {
            t.tenant_id == tenant_id
                && t.object_type == pk.object_type
                && t.object_id == pk.object_id
                && t.relation == pk.relation
                && t.subject_type == pk.subject_type
                && t.subject_id == pk.subject_id
                && t.subject_relation == pk.subject_relation
        });

        let Some(position) = position else {
            return Ok(inner.changelog.last().map(|e| e.seq).unwrap_or(0));
        };

        let removed = inner.tuples.remove(position);
        let seq = inner.changelog.last().map(|e| e.seq).unwrap_or(0) + 1;
        inner.changelog.push(ChangeLogEntry {
            seq,
            tenant_id: tenant_id.to_string(),
            kind: ChangeKind::Delete,
            tuple_before: Some(removed),
            tuple_after: None,
            ts: Utc::now(),
        });

        Ok(seq)
    }

    async fn lookup_by_object(
        &self,
        tenant_id: &str,
        object_type: &str,
        object_id: &str,
        filter: &TupleFilter,
    ) -> Result<Vec<RelationTuple>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tuples
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.object_type == object_type && t.object_id == object_id)
            .filter(|t| filter.relation.as_deref().map_or(true, |r| r == t.relation))
            .filter(|t| filter.subject_type.as_deref().map_or(true, |st| st == t.subject_type))
            .filter(|t| filter.subject_id.as_deref().map_or(true, |sid| sid == t.subject_id))
            .filter(|t| !t.is_expired(Utc::now()))
            .cloned()
            .collect())
    }

    async fn lookup_by_subject(
        &self,
        tenant_id: &str,
        subject_type: &str,
        subject_id: &str,
        filter: &TupleFilter,
    ) -> Result<Vec<RelationTuple>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tuples
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.subject_type == subject_type && t.subject_id == subject_id)
            .filter(|t| filter.relation.as_deref().map_or(true, |r| r == t.relation))
            .filter(|t| filter.object_type.as_deref().map_or(true, |ot| ot == t.object_type))
            .filter(|t| !t.is_expired(Utc::now()))
            .cloned()
            .collect())
    }

    async fn lookup_tupleset(
        &self,
        tenant_id: &str,
        object_type: &str,
        object_id: &str,
        tupleset_relation: &str,
    ) -> Result<Vec<ObjectRef>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tuples
            .iter()
            .filter(|t| {
                t.tenant_id == tenant_id
                    && t.object_type == object_type
                    && t.object_id == object_id
                    && t.relation == tupleset_relation
                    && !t.is_expired(Utc::now())
            })
            .map(|t| ObjectRef::new(t.subject_type.clone(), t.subject_id.clone()))
            .collect())
    }

    async fn changelog_scan(&self, tenant_id: &str, since_seq: i64, max: usize) -> Result<Vec<ChangeLogEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .changelog
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.seq > since_seq)
            .take(max)
            .cloned()
            .collect())
    }

    async fn current_seq(&self, tenant_id: &str) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .changelog
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .map(|e| e.seq)
            .max()
            .unwrap_or(0))
    }
}

impl InMemoryTupleStore {
    /// Appends a schema-reload marker (no tuple attached) to the
    /// changelog, mirroring what `PostgresSchemaRegistry::reload` writes
    /// via direct SQL. Test-only: production schema reloads never go
    /// through `TupleStore`.
    pub async fn inject_schema_reload_entry(&self, tenant_id: &str) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.changelog.last().map(|e| e.seq).unwrap_or(0) + 1;
        inner.changelog.push(ChangeLogEntry {
            seq,
            tenant_id: tenant_id.to_string(),
            kind: ChangeKind::Write,
            tuple_before: None,
            tuple_after: None,
            ts: Utc::now(),
        });
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(object_id: &str, relation: &str, subject_id: &str) -> WriteTupleRequest {
        WriteTupleRequest {
            tenant_id: "t1".to_string(),
            object_type: "folder".to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            subject_type: "folder".to_string(),
            subject_id: subject_id.to_string(),
            subject_relation: None,
            subject_tenant_id: None,
            expires_at: None,
            expected_seq: None,
        }
    }

    #[tokio::test]
    async fn write_then_lookup_round_trips() {
        let store = InMemoryTupleStore::new();
        store.write(req("a", "parent", "b")).await.unwrap();
        let found = store
            .lookup_by_object("t1", "folder", "a", &TupleFilter::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].subject_id, "b");
    }

    #[tokio::test]
    async fn write_is_idempotent() {
        let store = InMemoryTupleStore::new();
        let seq1 = store.write(req("a", "parent", "b")).await.unwrap();
        let seq2 = store.write(req("a", "parent", "b")).await.unwrap();
        assert_eq!(seq1, seq2);
        let found = store
            .lookup_by_object("t1", "folder", "a", &TupleFilter::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn direct_self_parent_is_rejected() {
        let store = InMemoryTupleStore::new();
        let err = store.write(req("a", "parent", "a")).await.unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected(_)));
    }

    #[tokio::test]
    async fn transitive_parent_cycle_is_rejected() {
        let store = InMemoryTupleStore::new();
        store.write(req("a", "parent", "b")).await.unwrap();
        store.write(req("b", "parent", "c")).await.unwrap();
        let err = store.write(req("c", "parent", "a")).await.unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent_on_absent_tuple() {
        let store = InMemoryTupleStore::new();
        let pk = TuplePrimaryKey {
            tenant_id: "t1".to_string(),
            object_type: "folder".to_string(),
            object_id: "a".to_string(),
            relation: "parent".to_string(),
            subject_type: "folder".to_string(),
            subject_id: "b".to_string(),
            subject_relation: None,
        };
        let seq = store.delete("t1", &pk).await.unwrap();
        assert_eq!(seq, 0);
    }

    #[tokio::test]
    async fn changelog_scan_is_monotonic_and_bounded() {
        let store = InMemoryTupleStore::new();
        store.write(req("a", "parent", "b")).await.unwrap();
        store.write(req("b", "parent", "c")).await.unwrap();
        let entries = store.changelog_scan("t1", 0, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, 1);
    }
}
