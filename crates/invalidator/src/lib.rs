pub mod error;
pub mod poller;

pub use error::{InvalidatorError, Result};
pub use poller::{Invalidator, InvalidatorConfig};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use nexus_cache::{CacheStack, CacheStackConfig, SubjectRelationObjectKey, SubproblemFamily};
    use nexus_interner::Interner;
    use nexus_store::{InMemoryTupleStore, TupleStore};

    use super::*;

    fn write(tenant: &str, object_type: &str, object_id: &str, relation: &str, subject_type: &str, subject_id: &str) -> nexus_models::WriteTupleRequest {
        nexus_models::WriteTupleRequest {
            tenant_id: tenant.to_string(),
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            subject_type: subject_type.to_string(),
            subject_id: subject_id.to_string(),
            subject_relation: None,
            subject_tenant_id: None,
            expires_at: None,
            expected_seq: None,
        }
    }

    #[tokio::test]
    async fn member_change_rebuilds_leopard_and_clears_membership_subproblem() {
        let store = Arc::new(InMemoryTupleStore::new());
        let cache = Arc::new(CacheStack::new(CacheStackConfig::default()));
        let interner = Arc::new(Interner::new());
        let invalidator = Invalidator::new(store.clone(), cache.clone(), interner.clone(), InvalidatorConfig::default());

        let key = SubjectRelationObjectKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
            relation: interner.intern("member"),
            object_type: interner.intern("group"),
            object_id: interner.intern("eng"),
        };
        cache.subproblem.set(SubproblemFamily::Membership, key, true, 0).await;

        store.write(write("t1", "group", "eng", "member", "user", "alice")).await.unwrap();
        let processed = invalidator.poll_once("t1").await.unwrap();
        assert_eq!(processed, 1);

        assert!(cache.subproblem.get(SubproblemFamily::Membership, key).await.is_none());

        let leopard_key = nexus_cache::LeopardKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
        };
        assert_eq!(cache.leopard.is_member(leopard_key, interner.intern("eng")), Some(true));
    }

    #[tokio::test]
    async fn schema_reload_entry_flushes_tenant() {
        let store = Arc::new(InMemoryTupleStore::new());
        let cache = Arc::new(CacheStack::new(CacheStackConfig::default()));
        let interner = Arc::new(Interner::new());
        let invalidator = Invalidator::new(store.clone(), cache.clone(), interner.clone(), InvalidatorConfig::default());

        let key = SubjectRelationObjectKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
            relation: interner.intern("viewer"),
            object_type: interner.intern("file"),
            object_id: interner.intern("a.txt"),
        };
        cache.subproblem.set(SubproblemFamily::Grant, key, true, 0).await;

        store.inject_schema_reload_entry("t1").await;
        invalidator.poll_once("t1").await.unwrap();

        assert!(cache.subproblem.get(SubproblemFamily::Grant, key).await.is_none());
    }

    #[tokio::test]
    async fn shared_tuple_indexes_distinct_subject_and_object_tenants() {
        let store = Arc::new(InMemoryTupleStore::new());
        let cache = Arc::new(CacheStack::new(CacheStackConfig::default()));
        let interner = Arc::new(Interner::new());
        let invalidator = Invalidator::new(store.clone(), cache.clone(), interner.clone(), InvalidatorConfig::default());

        let mut grant = write("t2", "file", "report.pdf", "shared_viewer", "user", "alice");
        grant.subject_tenant_id = Some("t1".to_string());
        store.write(grant).await.unwrap();
        invalidator.poll_once("t2").await.unwrap();

        let t1 = interner.intern("t1");
        let t2 = interner.intern("t2");
        let file_type = interner.intern("file");
        let report = interner.intern("report.pdf");

        let grants = cache.cross_tenant.grants_on_object(t2, file_type, report);
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].subject_tenant, t1);
        assert_eq!(grants[0].object_tenant, t2);
        assert_ne!(grants[0].subject_tenant, grants[0].object_tenant);
    }

    #[tokio::test]
    async fn lag_is_recorded_after_each_poll() {
        let store = Arc::new(InMemoryTupleStore::new());
        let cache = Arc::new(CacheStack::new(CacheStackConfig::default()));
        let interner = Arc::new(Interner::new());
        let invalidator = Invalidator::new(store.clone(), cache.clone(), interner.clone(), InvalidatorConfig::default());

        store.write(write("t1", "file", "a.txt", "viewer", "user", "alice")).await.unwrap();
        invalidator.poll_once("t1").await.unwrap();
        assert!(cache.lag.current("t1") >= 0);

        // No tolerance assumptions beyond "recorded something" — wall
        // clock drift in CI makes a tighter bound flaky.
        let _ = Duration::from_millis(0);
    }
}
