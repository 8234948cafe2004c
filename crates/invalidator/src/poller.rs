use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nexus_cache::{CacheStack, CrossTenantGrantIndex, Grant, SubproblemFamily, TigerKey};
use nexus_interner::Interner;
use nexus_models::{ChangeLogEntry, ObjectRef, RelationTuple, TupleFilter};
use nexus_store::TupleStore;
use parking_lot::RwLock;

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct InvalidatorConfig {
    pub poll_interval: Duration,
    pub ancestor_walk_max_depth: usize,
    pub batch_size: usize,
}

impl Default for InvalidatorConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_millis(100), ancestor_walk_max_depth: 64, batch_size: 500 }
    }
}

/// Single consumer per tenant: polls `changelog_scan` from the tenant's
/// last-seen seq and dispatches precise invalidations. A
/// lost or delayed invalidation cannot produce staleness beyond the
/// Final Cache's quantum or the Subproblem Cache's TTL — both act as a
/// safety net, so this poller favors simplicity over exactly-once
/// bookkeeping.
pub struct Invalidator {
    store: Arc<dyn TupleStore>,
    cache: Arc<CacheStack>,
    interner: Arc<Interner>,
    config: InvalidatorConfig,
    cursors: RwLock<HashMap<String, i64>>,
}

impl Invalidator {
    pub fn new(store: Arc<dyn TupleStore>, cache: Arc<CacheStack>, interner: Arc<Interner>, config: InvalidatorConfig) -> Self {
        Self { store, cache, interner, config, cursors: RwLock::new(HashMap::new()) }
    }

    pub fn config(&self) -> InvalidatorConfig {
        self.config
    }

    fn cursor(&self, tenant_id: &str) -> i64 {
        self.cursors.read().get(tenant_id).copied().unwrap_or(0)
    }

    fn set_cursor(&self, tenant_id: &str, seq: i64) {
        self.cursors.write().insert(tenant_id.to_string(), seq);
    }

    /// Runs the poll loop for `tenant_id` until `shutdown` is signaled.
    /// Callers spawn one of these per tenant they track — ordering is
    /// only guaranteed within a tenant, so cross-tenant parallelism is
    /// free.
    pub async fn run_tenant(&self, tenant_id: &str, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(err) = self.poll_once(tenant_id).await {
                        tracing::warn!(tenant_id, error = %err, "invalidator poll failed, will retry next interval");
                    }
                }
            }
        }
    }

    /// One poll iteration: fetch new change-log entries and dispatch
    /// each. Returns the number processed. Exposed directly so tests
    /// don't need to drive the full sleep loop.
    pub async fn poll_once(&self, tenant_id: &str) -> Result<usize> {
        let since = self.cursor(tenant_id);
        let entries = self.store.changelog_scan(tenant_id, since, self.config.batch_size).await?;

        for entry in &entries {
            self.dispatch(entry).await;
            self.set_cursor(tenant_id, entry.seq);
            let lag_ms = (Utc::now() - entry.ts).num_milliseconds().max(0);
            self.cache.lag.record(tenant_id, lag_ms);
        }

        if entries.is_empty() {
            self.cache.lag.record(tenant_id, 0);
        }

        Ok(entries.len())
    }

    async fn dispatch(&self, entry: &ChangeLogEntry) {
        if entry.is_schema_reload() {
            self.invalidate_schema_reload(&entry.tenant_id);
            return;
        }
        let Some(tuple) = entry.tuple() else { return };

        if tuple.relation == "member" {
            self.handle_member_change(tuple).await;
        } else if tuple.relation == "parent" {
            self.handle_parent_change(tuple).await;
        } else if tuple.is_cross_tenant() {
            self.handle_cross_tenant_change(tuple, matches!(entry.kind, nexus_models::ChangeKind::Delete)).await;
        } else {
            self.handle_grant_change(tuple).await;
        }
    }

    fn invalidate_schema_reload(&self, tenant_id: &str) {
        let tenant = self.interner.intern(tenant_id);
        for family in [SubproblemFamily::Membership, SubproblemFamily::Ancestry, SubproblemFamily::Grant] {
            self.cache.subproblem.invalidate_tenant(family, tenant);
        }
        self.cache.tiger.evict_tenant(tenant);
        self.cache.leopard.evict_tenant(tenant);
        self.cache.visibility.invalidate_tenant(tenant);
        tracing::info!(tenant_id, "schema reload: flushed every cache layer for tenant");
    }

    async fn handle_member_change(&self, tuple: &RelationTuple) {
        let tenant = self.interner.intern(&tuple.tenant_id);
        let subject_type = self.interner.intern(&tuple.subject_type);
        let subject_id = self.interner.intern(&tuple.subject_id);
        let group_type = self.interner.intern(&tuple.object_type);
        let group_id = self.interner.intern(&tuple.object_id);

        if let Some(closure) = rebuild_closure(&*self.store, &self.interner, &tuple.tenant_id, &tuple.subject_type, &tuple.subject_id).await {
            self.cache.leopard.rebuild(
                nexus_cache::LeopardKey { tenant, subject_type, subject_id },
                closure,
            );
        }

        self.cache.leopard.evict_containing(group_id);

        self.cache.subproblem.invalidate_subject(SubproblemFamily::Membership, tenant, subject_type, subject_id);
        self.cache.subproblem.invalidate_object(SubproblemFamily::Grant, tenant, group_type, group_id);
        self.cache.tiger.evict_object_in_tenant(tenant, group_id);
    }

    async fn handle_parent_change(&self, tuple: &RelationTuple) {
        let tenant = self.interner.intern(&tuple.tenant_id);
        let object_type = self.interner.intern(&tuple.object_type);
        let object_id = self.interner.intern(&tuple.object_id);

        self.cache.subproblem.invalidate_object(SubproblemFamily::Ancestry, tenant, object_type, object_id);
        self.cache.visibility.invalidate_directory_all_subjects(tenant, object_type, object_id);

        for ancestor in walk_ancestors(&*self.store, &tuple.tenant_id, &tuple.object_type, &tuple.object_id, self.config.ancestor_walk_max_depth).await {
            let a_type = self.interner.intern(&ancestor.object_type);
            let a_id = self.interner.intern(&ancestor.object_id);
            self.cache.subproblem.invalidate_object(SubproblemFamily::Ancestry, tenant, a_type, a_id);
            self.cache.visibility.invalidate_directory_all_subjects(tenant, a_type, a_id);
        }
    }

    async fn handle_cross_tenant_change(&self, tuple: &RelationTuple, is_delete: bool) {
        let subject_tenant = self.interner.intern(tuple.subject_tenant());
        let object_tenant = self.interner.intern(&tuple.tenant_id);
        let subject_type = self.interner.intern(&tuple.subject_type);
        let subject_id = self.interner.intern(&tuple.subject_id);
        let object_type = self.interner.intern(&tuple.object_type);
        let object_id = self.interner.intern(&tuple.object_id);
        let relation = self.interner.intern(&tuple.relation);

        let grant = Grant {
            subject_tenant,
            subject_type,
            subject_id,
            object_tenant,
            object_type,
            object_id,
            relation,
            expires_at: tuple.expires_at,
        };

        if is_delete {
            remove_grant(&self.cache.cross_tenant, &grant);
        } else {
            self.cache.cross_tenant.insert(grant);
        }

        let permission = self.interner.intern(&tuple.relation);
        self.cache.tiger.invalidate_object(TigerKey { tenant: object_tenant, subject_type, subject_id, permission }, object_id);
        self.cache.final_cache.invalidate(&nexus_cache::FinalKey {
            tenant: object_tenant,
            subject_type,
            subject_id,
            permission,
            object_type,
            object_id,
            quantum: self.cache.quantizer.quantum(Utc::now().timestamp()),
        });
    }

    async fn handle_grant_change(&self, tuple: &RelationTuple) {
        let tenant = self.interner.intern(&tuple.tenant_id);
        let object_type = self.interner.intern(&tuple.object_type);
        let object_id = self.interner.intern(&tuple.object_id);

        self.cache.tiger.evict_object_in_tenant(tenant, object_id);
        self.cache.subproblem.invalidate_object(SubproblemFamily::Grant, tenant, object_type, object_id);

        for ancestor in walk_ancestors(&*self.store, &tuple.tenant_id, &tuple.object_type, &tuple.object_id, self.config.ancestor_walk_max_depth).await {
            let a_type = self.interner.intern(&ancestor.object_type);
            let a_id = self.interner.intern(&ancestor.object_id);
            self.cache.visibility.invalidate_directory_all_subjects(tenant, a_type, a_id);
        }
    }
}

fn remove_grant(index: &CrossTenantGrantIndex, grant: &Grant) {
    index.remove(grant);
}

/// Walks the `parent` chain upward from `(object_type, object_id)`,
/// stopping at the first object with no `parent` tuple or at
/// `max_depth`.
async fn walk_ancestors(
    store: &dyn TupleStore,
    tenant_id: &str,
    object_type: &str,
    object_id: &str,
    max_depth: usize,
) -> Vec<ObjectRef> {
    let mut result = Vec::new();
    let mut current = ObjectRef::new(object_type, object_id);
    let filter = TupleFilter { relation: Some("parent".to_string()), ..Default::default() };

    for _ in 0..max_depth {
        let tuples = store
            .lookup_by_object(tenant_id, &current.object_type, &current.object_id, &filter)
            .await
            .unwrap_or_default();
        let Some(parent_tuple) = tuples.into_iter().find(|t| t.subject_relation.is_none()) else { break };
        let parent = ObjectRef::new(parent_tuple.subject_type, parent_tuple.subject_id);
        result.push(parent.clone());
        current = parent;
    }

    result
}

/// BFS over `member` tuples starting at `subject`, following userset
/// edges until fixpoint, to rebuild a Leopard closure. Returns `None`
/// if the subject has no `member` tuples at all (nothing to index).
async fn rebuild_closure(
    store: &dyn TupleStore,
    interner: &Interner,
    tenant_id: &str,
    subject_type: &str,
    subject_id: &str,
) -> Option<ahash::AHashSet<nexus_interner::Sym>> {
    let filter = TupleFilter { relation: Some("member".to_string()), ..Default::default() };
    let mut closure = ahash::AHashSet::default();
    let mut frontier = vec![(subject_type.to_string(), subject_id.to_string())];
    let mut seen = std::collections::HashSet::new();

    while let Some((s_type, s_id)) = frontier.pop() {
        if !seen.insert((s_type.clone(), s_id.clone())) {
            continue;
        }
        let tuples = store.lookup_by_subject(tenant_id, &s_type, &s_id, &filter).await.unwrap_or_default();
        for t in tuples {
            if t.subject_relation.is_some() {
                continue;
            }
            let group = interner.intern(&t.object_id);
            if closure.insert(group) {
                frontier.push((t.object_type.clone(), t.object_id.clone()));
            }
        }
    }

    if closure.is_empty() {
        None
    } else {
        Some(closure)
    }
}
