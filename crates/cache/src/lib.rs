pub mod cross_tenant;
pub mod dedup;
pub mod error;
pub mod final_cache;
pub mod keys;
pub mod lag;
pub mod leopard;
pub mod redis_tier;
pub mod subproblem;
pub mod tiger;
pub mod visibility;

pub use cross_tenant::{CrossTenantGrantIndex, Grant};
pub use dedup::Deduplicator;
pub use error::{CacheError, Result};
pub use final_cache::{FinalCache, Quantizer};
pub use keys::{FinalKey, LeopardKey, SubjectRelationObjectKey, TigerKey, VisibilityKey};
pub use lag::LagTracker;
pub use leopard::LeopardIndex;
pub use redis_tier::{final_cache_key, RedisTier, RedisTierConfig};
pub use subproblem::{Family as SubproblemFamily, SubproblemCache, SubproblemCacheConfig};
pub use tiger::{Probe as TigerProbe, TigerCache};
pub use visibility::DirectoryVisibilityCache;

/// Every in-process cache layer, bundled for convenient construction
/// and sharing via a single `Arc` in `nexus-engine`/`nexus-invalidator`.
pub struct CacheStack {
    pub subproblem: SubproblemCache,
    pub tiger: TigerCache,
    pub leopard: LeopardIndex,
    pub cross_tenant: CrossTenantGrantIndex,
    pub visibility: DirectoryVisibilityCache,
    pub final_cache: FinalCache,
    pub quantizer: Quantizer,
    pub lag: LagTracker,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStackConfig {
    pub subproblem: SubproblemCacheConfig,
    pub tiger_max_entries_per_tenant: usize,
    pub visibility_ttl_secs: u64,
    pub visibility_max_capacity: u64,
    pub final_cache_max_capacity: u64,
    pub quantum_window_secs: i64,
}

impl Default for CacheStackConfig {
    fn default() -> Self {
        Self {
            subproblem: SubproblemCacheConfig::default(),
            tiger_max_entries_per_tenant: 100_000,
            visibility_ttl_secs: 300,
            visibility_max_capacity: 500_000,
            final_cache_max_capacity: 1_000_000,
            quantum_window_secs: 5,
        }
    }
}

impl CacheStack {
    pub fn new(config: CacheStackConfig) -> Self {
        Self {
            subproblem: SubproblemCache::new(config.subproblem),
            tiger: TigerCache::new(config.tiger_max_entries_per_tenant),
            leopard: LeopardIndex::new(),
            cross_tenant: CrossTenantGrantIndex::new(),
            visibility: DirectoryVisibilityCache::new(
                std::time::Duration::from_secs(config.visibility_ttl_secs),
                config.visibility_max_capacity,
            ),
            final_cache: FinalCache::new(config.quantum_window_secs, config.final_cache_max_capacity),
            quantizer: Quantizer::new(config.quantum_window_secs),
            lag: LagTracker::new(),
        }
    }
}
