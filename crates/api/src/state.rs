use std::collections::HashSet;
use std::sync::Arc;

use nexus_cache::CacheStack;
use nexus_engine::Evaluator;
use nexus_invalidator::Invalidator;
use nexus_schema::SchemaRegistry;
use nexus_store::TupleStore;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Shared state for every handler: the store, schema registry, and cache
/// stack the engine composes, plus the invalidator it feeds. Mirrors the
/// teacher's single `AppState` struct holding `Arc`s to every service.
pub struct AppState {
    pub store: Arc<dyn TupleStore>,
    pub schema: Arc<dyn SchemaRegistry>,
    pub cache: Arc<CacheStack>,
    pub evaluator: Evaluator,
    pub invalidator: Arc<Invalidator>,
    shutdown_tx: watch::Sender<bool>,
    running_tenants: Mutex<HashSet<String>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TupleStore>,
        schema: Arc<dyn SchemaRegistry>,
        cache: Arc<CacheStack>,
        evaluator: Evaluator,
        invalidator: Arc<Invalidator>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            schema,
            cache,
            evaluator,
            invalidator,
            shutdown_tx,
            running_tenants: Mutex::new(HashSet::new()),
        }
    }

    /// Spawns the tenant's invalidator poll loop the first time the
    /// tenant is seen. One loop per tenant, per the invalidator's
    /// documented single-consumer-per-tenant contract.
    pub fn ensure_invalidator_running(self: &Arc<Self>, tenant_id: &str) {
        let mut running = self.running_tenants.lock();
        if running.contains(tenant_id) {
            return;
        }
        running.insert(tenant_id.to_string());
        drop(running);

        let invalidator = self.invalidator.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let tenant = tenant_id.to_string();
        tokio::spawn(async move {
            invalidator.run_tenant(&tenant, shutdown_rx).await;
        });
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
