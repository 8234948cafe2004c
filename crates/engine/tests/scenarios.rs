use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nexus_cache::{CacheStack, CacheStackConfig, Grant};
use nexus_engine::{Evaluator, EvaluatorConfig};
use nexus_interner::Interner;
use nexus_models::{CheckRequest, Consistency, ObjectRef, Principal, Rule, Schema, TypeDefinition, WriteTupleRequest};
use nexus_schema::InMemorySchemaRegistry;
use nexus_store::{InMemoryTupleStore, TupleStore};

fn rel(name: &str, rule: Rule) -> (String, Rule) {
    (name.to_string(), rule)
}

fn file_and_folder_schema() -> Schema {
    let read_rule = Rule::Union(vec![
        Rule::computed("viewer"),
        Rule::computed("editor"),
        Rule::computed("shared_viewer"),
        Rule::tuple_to_userset("parent", Rule::computed("read")),
    ]);
    let write_rule = Rule::Union(vec![Rule::computed("editor")]);

    let file = TypeDefinition {
        object_type: "file".to_string(),
        relations: HashMap::from([
            rel("viewer", Rule::this()),
            rel("editor", Rule::this()),
            rel("shared_viewer", Rule::this()),
            rel("parent", Rule::this()),
            rel("read", read_rule.clone()),
            rel("write", write_rule.clone()),
        ]),
    };
    let folder = TypeDefinition {
        object_type: "folder".to_string(),
        relations: HashMap::from([
            rel("viewer", Rule::this()),
            rel("editor", Rule::this()),
            rel("parent", Rule::this()),
            rel("read", read_rule),
            rel("write", write_rule),
        ]),
    };
    let group = TypeDefinition {
        object_type: "group".to_string(),
        relations: HashMap::from([rel("member", Rule::this())]),
    };

    Schema { schema_version: "1".to_string(), type_definitions: vec![file, folder, group] }
}

fn test_evaluator(tenant: &str, schema: Schema) -> (Arc<Evaluator>, Arc<InMemoryTupleStore>) {
    let (evaluator, store, _cache, _interner) = test_evaluator_with_cache(tenant, schema);
    (evaluator, store)
}

fn test_evaluator_with_cache(
    tenant: &str,
    schema: Schema,
) -> (Arc<Evaluator>, Arc<InMemoryTupleStore>, Arc<CacheStack>, Arc<Interner>) {
    let store = Arc::new(InMemoryTupleStore::new());
    let registry = Arc::new(InMemorySchemaRegistry::new());
    registry.seed(tenant, schema);
    let cache = Arc::new(CacheStack::new(CacheStackConfig::default()));
    let interner = Arc::new(Interner::new());
    let evaluator =
        Arc::new(Evaluator::new(store.clone(), registry, cache.clone(), interner.clone(), EvaluatorConfig::default()));
    (evaluator, store, cache, interner)
}

fn write(tenant: &str, object_type: &str, object_id: &str, relation: &str, subject_type: &str, subject_id: &str) -> WriteTupleRequest {
    WriteTupleRequest {
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

fn shared_write(
    object_tenant: &str,
    object_type: &str,
    object_id: &str,
    relation: &str,
    subject_type: &str,
    subject_id: &str,
    subject_tenant: &str,
) -> WriteTupleRequest {
    let mut req = write(object_tenant, object_type, object_id, relation, subject_type, subject_id);
    req.subject_tenant_id = Some(subject_tenant.to_string());
    req
}

fn userset_write(
    tenant: &str,
    object_type: &str,
    object_id: &str,
    relation: &str,
    subject_type: &str,
    subject_id: &str,
    subject_relation: &str,
) -> WriteTupleRequest {
    let mut req = write(tenant, object_type, object_id, relation, subject_type, subject_id);
    req.subject_relation = Some(subject_relation.to_string());
    req
}

fn check_req(tenant: &str, subject: &str, permission: &str, object_type: &str, object_id: &str) -> CheckRequest {
    CheckRequest {
        principal: Principal::new(tenant, "user", subject),
        permission: permission.to_string(),
        object: ObjectRef::new(object_type, object_id),
        query_tenant_id: None,
        consistency: Consistency::Eventual,
        deadline: Duration::from_millis(500),
    }
}

fn cross_tenant_check_req(
    principal_tenant: &str,
    subject: &str,
    permission: &str,
    object_tenant: &str,
    object_type: &str,
    object_id: &str,
) -> CheckRequest {
    let mut req = check_req(principal_tenant, subject, permission, object_type, object_id);
    req.query_tenant_id = Some(object_tenant.to_string());
    req
}

#[tokio::test]
async fn scenario_1_direct_grant() {
    let (evaluator, store) = test_evaluator("t1", file_and_folder_schema());
    store.write(write("t1", "file", "/a.txt", "viewer", "user", "alice")).await.unwrap();

    let allow = evaluator.check(check_req("t1", "alice", "read", "file", "/a.txt")).await.unwrap();
    assert!(allow.allow);

    let deny = evaluator.check(check_req("t1", "bob", "read", "file", "/a.txt")).await.unwrap();
    assert!(!deny.allow);
}

#[tokio::test]
async fn scenario_2_inheritance_via_parent() {
    let (evaluator, store) = test_evaluator("t1", file_and_folder_schema());
    store.write(write("t1", "file", "/docs/a.txt", "parent", "folder", "/docs")).await.unwrap();
    store.write(write("t1", "folder", "/docs", "editor", "user", "alice")).await.unwrap();

    let decision = evaluator.check(check_req("t1", "alice", "read", "file", "/docs/a.txt")).await.unwrap();
    assert!(decision.allow);
}

#[tokio::test]
async fn scenario_3_group_membership() {
    let (evaluator, store) = test_evaluator("t1", file_and_folder_schema());
    store.write(write("t1", "group", "eng", "member", "user", "alice")).await.unwrap();
    store.write(userset_write("t1", "folder", "/src", "editor", "group", "eng", "member")).await.unwrap();

    let decision = evaluator.check(check_req("t1", "alice", "write", "folder", "/src")).await.unwrap();
    assert!(decision.allow);
}

#[tokio::test]
async fn scenario_5_cross_tenant_share() {
    // Tenant T2 shares report.pdf with alice, a T1 principal. Tuples live
    // in exactly one tenant (T2, the object's), so the grant carries
    // alice's home tenant explicitly; the invalidator would normally be
    // the one populating the Cross-Tenant Grant Index from this tuple,
    // so this test seeds it directly rather than running a poll loop.
    let (evaluator, store, cache, interner) = test_evaluator_with_cache("t2", file_and_folder_schema());
    store
        .write(shared_write("t2", "file", "report.pdf", "shared_viewer", "user", "alice", "t1"))
        .await
        .unwrap();

    cache.cross_tenant.insert(Grant {
        subject_tenant: interner.intern("t1"),
        subject_type: interner.intern("user"),
        subject_id: interner.intern("alice"),
        object_tenant: interner.intern("t2"),
        object_type: interner.intern("file"),
        object_id: interner.intern("report.pdf"),
        relation: interner.intern("shared_viewer"),
        expires_at: None,
    });

    let allowed = evaluator
        .check(cross_tenant_check_req("t1", "alice", "read", "t2", "file", "report.pdf"))
        .await
        .unwrap();
    assert!(allowed.allow);

    // A T1 principal for whom no shared_* grant exists is denied, even
    // though the underlying permission graph in T2 would allow a native
    // T2 subject.
    let denied = evaluator
        .check(cross_tenant_check_req("t1", "carol", "read", "t2", "file", "report.pdf"))
        .await
        .unwrap();
    assert!(!denied.allow);

    // A same-tenant T2 principal is unaffected and still goes through the
    // ordinary relation graph rather than the cross-tenant index.
    store.write(write("t2", "file", "report.pdf", "viewer", "user", "dave")).await.unwrap();
    let native = evaluator.check(check_req("t2", "dave", "read", "file", "report.pdf")).await.unwrap();
    assert!(native.allow);
}

#[tokio::test]
async fn cross_tenant_grant_never_reached_via_ordinary_relations() {
    // A shared_viewer tuple doesn't leak into ordinary (same-tenant)
    // relations like `viewer` — only the permission that actually unions
    // in `shared_viewer` sees it, and only for genuinely cross-tenant
    // principals.
    let (evaluator, store, cache, interner) = test_evaluator_with_cache("t2", file_and_folder_schema());
    store
        .write(shared_write("t2", "file", "report.pdf", "shared_viewer", "user", "alice", "t1"))
        .await
        .unwrap();

    cache.cross_tenant.insert(Grant {
        subject_tenant: interner.intern("t1"),
        subject_type: interner.intern("user"),
        subject_id: interner.intern("alice"),
        object_tenant: interner.intern("t2"),
        object_type: interner.intern("file"),
        object_id: interner.intern("report.pdf"),
        relation: interner.intern("shared_viewer"),
        expires_at: None,
    });

    let denied = evaluator
        .check(cross_tenant_check_req("t1", "alice", "write", "t2", "file", "report.pdf"))
        .await
        .unwrap();
    assert!(!denied.allow);
}

#[tokio::test]
async fn scenario_6_thundering_herd() {
    let (evaluator, store) = test_evaluator("t1", file_and_folder_schema());
    store.write(write("t1", "file", "/a.txt", "viewer", "user", "alice")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let evaluator = evaluator.clone();
        handles.push(tokio::spawn(async move {
            evaluator.check(check_req("t1", "alice", "read", "file", "/a.txt")).await.unwrap()
        }));
    }

    for h in handles {
        let decision = h.await.unwrap();
        assert!(decision.allow);
    }
}

#[tokio::test]
async fn bulk_check_matches_individual_checks() {
    let (evaluator, store) = test_evaluator("t1", file_and_folder_schema());
    store.write(write("t1", "file", "/a.txt", "viewer", "user", "alice")).await.unwrap();
    store.write(write("t1", "file", "/b.txt", "editor", "user", "bob")).await.unwrap();

    let req = nexus_models::BulkCheckRequest {
        principal: Principal::new("t1", "user", "alice"),
        items: vec![
            nexus_models::BulkCheckItem { permission: "read".to_string(), object: ObjectRef::new("file", "/a.txt") },
            nexus_models::BulkCheckItem { permission: "read".to_string(), object: ObjectRef::new("file", "/b.txt") },
        ],
        consistency: Consistency::Eventual,
        deadline: Duration::from_millis(500),
    };

    let results = evaluator.bulk_check(req).await.unwrap();
    let by_object: HashMap<_, _> = results.into_iter().map(|(item, d)| (item.object.object_id, d.allow)).collect();
    assert_eq!(by_object["/a.txt"], true);
    assert_eq!(by_object["/b.txt"], false);
}
