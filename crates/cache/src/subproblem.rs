use std::time::Duration;

use moka::future::Cache;

use crate::keys::SubjectRelationObjectKey;

#[derive(Debug, Clone, Copy)]
pub struct CachedBool {
    pub value: bool,
    /// Change-log seq the evaluator had observed when this value was
    /// computed — compared against the tenant's known-fresh seq in
    /// `bounded`/`strong` consistency mode.
    pub seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Membership,
    Ancestry,
    Grant,
}

/// Three independent sub-stores with distinct TTLs: memberships are
/// stable (~300s), ancestry is very stable (~600s), grants are
/// volatile (~60s). Invalidation is primarily event-driven; TTL is the
/// safety net for entries the invalidator missed or that predate it.
pub struct SubproblemCache {
    membership: Cache<SubjectRelationObjectKey, CachedBool>,
    ancestry: Cache<SubjectRelationObjectKey, CachedBool>,
    grant: Cache<SubjectRelationObjectKey, CachedBool>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubproblemCacheConfig {
    pub membership_ttl: Duration,
    pub ancestry_ttl: Duration,
    pub grant_ttl: Duration,
    pub max_capacity_per_family: u64,
}

impl Default for SubproblemCacheConfig {
    fn default() -> Self {
        Self {
            membership_ttl: Duration::from_secs(300),
            ancestry_ttl: Duration::from_secs(600),
            grant_ttl: Duration::from_secs(60),
            max_capacity_per_family: 1_000_000,
        }
    }
}

impl SubproblemCache {
    pub fn new(config: SubproblemCacheConfig) -> Self {
        let build = |ttl: Duration| {
            Cache::builder()
                .max_capacity(config.max_capacity_per_family)
                .time_to_live(ttl)
                .build()
        };
        Self {
            membership: build(config.membership_ttl),
            ancestry: build(config.ancestry_ttl),
            grant: build(config.grant_ttl),
        }
    }

    fn family_cache(&self, family: Family) -> &Cache<SubjectRelationObjectKey, CachedBool> {
        match family {
            Family::Membership => &self.membership,
            Family::Ancestry => &self.ancestry,
            Family::Grant => &self.grant,
        }
    }

    pub async fn get(&self, family: Family, key: SubjectRelationObjectKey) -> Option<CachedBool> {
        self.family_cache(family).get(&key).await
    }

    pub async fn set(&self, family: Family, key: SubjectRelationObjectKey, value: bool, seq: i64) {
        self.family_cache(family).insert(key, CachedBool { value, seq }).await;
    }

    pub async fn invalidate(&self, family: Family, key: &SubjectRelationObjectKey) {
        self.family_cache(family).invalidate(key).await;
    }

    /// Flushes every entry for a tenant — used on schema reload, where
    /// every cached subproblem for the tenant may now mean something
    /// different.
    pub fn invalidate_tenant(&self, family: Family, tenant: nexus_interner::Sym) {
        let _ = self.family_cache(family).invalidate_entries_if(move |k, _v| k.tenant == tenant);
    }

    /// Flushes entries touching a specific object — used when a write
    /// or delete directly changes that object's tuples.
    pub fn invalidate_object(
        &self,
        family: Family,
        tenant: nexus_interner::Sym,
        object_type: nexus_interner::Sym,
        object_id: nexus_interner::Sym,
    ) {
        let _ = self.family_cache(family).invalidate_entries_if(move |k, _v| {
            k.tenant == tenant && k.object_type == object_type && k.object_id == object_id
        });
    }

    /// Flushes entries touching a specific subject — used when the
    /// invalidator determines a subject's membership set changed.
    pub fn invalidate_subject(
        &self,
        family: Family,
        tenant: nexus_interner::Sym,
        subject_type: nexus_interner::Sym,
        subject_id: nexus_interner::Sym,
    ) {
        let _ = self.family_cache(family).invalidate_entries_if(move |k, _v| {
            k.tenant == tenant && k.subject_type == subject_type && k.subject_id == subject_id
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_interner::Interner;

    fn key(interner: &Interner, tenant: &str, subject: &str, relation: &str, object: &str) -> SubjectRelationObjectKey {
        SubjectRelationObjectKey {
            tenant: interner.intern(tenant),
            subject_type: interner.intern("user"),
            subject_id: interner.intern(subject),
            relation: interner.intern(relation),
            object_type: interner.intern("folder"),
            object_id: interner.intern(object),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = SubproblemCache::new(SubproblemCacheConfig::default());
        let interner = Interner::new();
        let k = key(&interner, "t1", "alice", "viewer", "f1");
        cache.set(Family::Membership, k, true, 5).await;
        let found = cache.get(Family::Membership, k).await.unwrap();
        assert!(found.value);
        assert_eq!(found.seq, 5);
    }

    #[tokio::test]
    async fn families_are_isolated() {
        let cache = SubproblemCache::new(SubproblemCacheConfig::default());
        let interner = Interner::new();
        let k = key(&interner, "t1", "alice", "viewer", "f1");
        cache.set(Family::Membership, k, true, 1).await;
        assert!(cache.get(Family::Ancestry, k).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_tenant_clears_only_that_tenant() {
        let cache = SubproblemCache::new(SubproblemCacheConfig::default());
        let interner = Interner::new();
        let k1 = key(&interner, "t1", "alice", "viewer", "f1");
        let k2 = key(&interner, "t2", "alice", "viewer", "f1");
        cache.set(Family::Membership, k1, true, 1).await;
        cache.set(Family::Membership, k2, true, 1).await;
        cache.invalidate_tenant(Family::Membership, k1.tenant);
        cache.family_cache(Family::Membership).run_pending_tasks().await;
        assert!(cache.get(Family::Membership, k1).await.is_none());
        assert!(cache.get(Family::Membership, k2).await.is_some());
    }
}
