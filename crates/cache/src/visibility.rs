use std::time::Duration;

use moka::future::Cache;
use nexus_interner::Sym;

use crate::keys::VisibilityKey;

/// For each `(tenant, subject, directory_object)`, whether the subject
/// has at least one descendant on which any permission holds. Used to
/// prune whole subtrees from listings without walking every leaf.
pub struct DirectoryVisibilityCache {
    entries: Cache<VisibilityKey, bool>,
}

impl DirectoryVisibilityCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self { entries: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build() }
    }

    pub async fn get(&self, key: VisibilityKey) -> Option<bool> {
        self.entries.get(&key).await
    }

    pub async fn set(&self, key: VisibilityKey, visible: bool) {
        self.entries.insert(key, visible).await;
    }

    /// Invalidates every ancestor of a mutated object. Gaining or
    /// losing access to a leaf changes the visibility of every
    /// directory above it, so the invalidator must call this for the
    /// full ancestry chain, not just the mutated object itself.
    pub async fn invalidate_directory(&self, tenant: Sym, subject_type: Sym, subject_id: Sym, directory_type: Sym, directory_id: Sym) {
        let key = VisibilityKey { tenant, subject_type, subject_id, directory_type, directory_id };
        self.entries.invalidate(&key).await;
    }

    pub fn invalidate_tenant(&self, tenant: Sym) {
        let _ = self.entries.invalidate_entries_if(move |k, _v| k.tenant == tenant);
    }

    /// Invalidates one directory's visibility entry for every subject —
    /// used by the invalidator, which knows a directory's visibility
    /// changed but not which specific subjects are affected without
    /// re-walking group memberships.
    pub fn invalidate_directory_all_subjects(&self, tenant: Sym, directory_type: Sym, directory_id: Sym) {
        let _ = self.entries.invalidate_entries_if(move |k, _v| {
            k.tenant == tenant && k.directory_type == directory_type && k.directory_id == directory_id
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_interner::Interner;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = DirectoryVisibilityCache::new(Duration::from_secs(300), 10_000);
        let interner = Interner::new();
        let key = VisibilityKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
            directory_type: interner.intern("folder"),
            directory_id: interner.intern("root"),
        };
        cache.set(key, true).await;
        assert_eq!(cache.get(key).await, Some(true));
    }

    #[tokio::test]
    async fn invalidate_directory_clears_entry() {
        let cache = DirectoryVisibilityCache::new(Duration::from_secs(300), 10_000);
        let interner = Interner::new();
        let tenant = interner.intern("t1");
        let subject_type = interner.intern("user");
        let subject_id = interner.intern("alice");
        let directory_type = interner.intern("folder");
        let directory_id = interner.intern("root");
        let key = VisibilityKey { tenant, subject_type, subject_id, directory_type, directory_id };
        cache.set(key, true).await;
        cache.invalidate_directory(tenant, subject_type, subject_id, directory_type, directory_id).await;
        assert_eq!(cache.get(key).await, None);
    }
}
