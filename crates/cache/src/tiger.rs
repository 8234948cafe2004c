use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringBitmap;

use crate::keys::TigerKey;
use nexus_interner::Sym;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Yes,
    No,
    /// This object's Sym has never been probed for this key, or the
    /// key's bitmap pair doesn't exist at all — the caller must fall
    /// through to a cold evaluation, never treat this as deny.
    Unknown,
}

#[derive(Clone, Default)]
struct Entry {
    /// Object-Syms whose allow/deny answer has been resolved.
    known: RoaringBitmap,
    /// Subset of `known` for which the answer is allow.
    allow: RoaringBitmap,
}

/// Per-`(tenant, subject, permission)` compressed bitmap of
/// known-allow object-Syms. Entries are swapped whole on update — an
/// `Arc<Entry>` clone lets readers observe either the pre- or
/// post-update state, never a torn one.
#[derive(Default)]
pub struct TigerCache {
    entries: RwLock<ahash::AHashMap<TigerKey, Arc<Entry>>>,
    max_entries_per_tenant: usize,
}

impl TigerCache {
    pub fn new(max_entries_per_tenant: usize) -> Self {
        Self { entries: RwLock::new(ahash::AHashMap::new()), max_entries_per_tenant }
    }

    pub fn probe(&self, key: TigerKey, object: Sym) -> Probe {
        let object_id = sym_to_u32(object);
        let Some(entry) = self.entries.read().get(&key).cloned() else {
            return Probe::Unknown;
        };
        if !entry.known.contains(object_id) {
            Probe::Unknown
        } else if entry.allow.contains(object_id) {
            Probe::Yes
        } else {
            Probe::No
        }
    }

    pub fn set(&self, key: TigerKey, object: Sym, decision: bool) {
        let object_id = sym_to_u32(object);
        let mut entries = self.entries.write();

        if entries.len() >= self.max_entries_per_tenant && !entries.contains_key(&key) {
            // Evict an arbitrary entry. Whole-bitmap eviction only —
            // never partial, per the cache's documented eviction policy.
            if let Some(victim) = entries.keys().next().copied() {
                entries.remove(&victim);
            }
        }

        let mut entry = entries.get(&key).map(|e| (**e).clone()).unwrap_or_default();
        entry.known.insert(object_id);
        if decision {
            entry.allow.insert(object_id);
        } else {
            entry.allow.remove(object_id);
        }
        entries.insert(key, Arc::new(entry));
    }

    /// Intersects `objects` with the key's known-allow bitmap — the hot
    /// path for directory listings. Objects never probed are silently
    /// excluded; callers that need the stricter three-state answer
    /// should use `probe` instead.
    pub fn filter(&self, key: TigerKey, objects: impl IntoIterator<Item = Sym>) -> Vec<Sym> {
        let Some(entry) = self.entries.read().get(&key).cloned() else {
            return Vec::new();
        };
        objects.into_iter().filter(|o| entry.allow.contains(sym_to_u32(*o))).collect()
    }

    /// Removes the object's Sym from both bitmaps without discarding
    /// the rest of the key's known set — used when a single object's
    /// permission changes and the rest of the subject's bitmap is
    /// still valid.
    pub fn invalidate_object(&self, key: TigerKey, object: Sym) {
        let object_id = sym_to_u32(object);
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&key) {
            let mut updated = (**entry).clone();
            updated.known.remove(object_id);
            updated.allow.remove(object_id);
            entries.insert(key, Arc::new(updated));
        }
    }

    /// Removes `object` from every bitmap belonging to `tenant`,
    /// regardless of subject or permission. Conservative fallback for a
    /// direct/userset grant change on `object`, where the affected
    /// `(subject, permission)` pairs aren't known without a full
    /// re-evaluation.
    pub fn evict_object_in_tenant(&self, tenant: Sym, object: Sym) {
        let object_id = sym_to_u32(object);
        let mut entries = self.entries.write();
        let keys: Vec<TigerKey> = entries.keys().filter(|k| k.tenant == tenant).copied().collect();
        for key in keys {
            if let Some(entry) = entries.get(&key) {
                let mut updated = (**entry).clone();
                updated.known.remove(object_id);
                updated.allow.remove(object_id);
                entries.insert(key, Arc::new(updated));
            }
        }
    }

    /// Evicts the entire bitmap for a key — used when a subject's
    /// membership set changes broadly enough that incremental per-
    /// object updates aren't worth tracking.
    pub fn evict(&self, key: TigerKey) {
        self.entries.write().remove(&key);
    }

    pub fn evict_tenant(&self, tenant: Sym) {
        self.entries.write().retain(|k, _| k.tenant != tenant);
    }
}

fn sym_to_u32(sym: Sym) -> u32 {
    use string_interner::Symbol;
    sym.to_usize() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_interner::Interner;

    fn key(interner: &Interner) -> TigerKey {
        TigerKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
            permission: interner.intern("viewer"),
        }
    }

    #[test]
    fn unset_key_is_unknown() {
        let cache = TigerCache::new(1000);
        let interner = Interner::new();
        let obj = interner.intern("f1");
        assert_eq!(cache.probe(key(&interner), obj), Probe::Unknown);
    }

    #[test]
    fn set_then_probe_yes() {
        let cache = TigerCache::new(1000);
        let interner = Interner::new();
        let k = key(&interner);
        let obj = interner.intern("f1");
        cache.set(k, obj, true);
        assert_eq!(cache.probe(k, obj), Probe::Yes);
    }

    #[test]
    fn set_false_is_known_no_not_unknown() {
        let cache = TigerCache::new(1000);
        let interner = Interner::new();
        let k = key(&interner);
        let obj = interner.intern("f1");
        cache.set(k, obj, false);
        assert_eq!(cache.probe(k, obj), Probe::No);
    }

    #[test]
    fn unprobed_object_in_existing_key_is_unknown() {
        let cache = TigerCache::new(1000);
        let interner = Interner::new();
        let k = key(&interner);
        cache.set(k, interner.intern("f1"), true);
        assert_eq!(cache.probe(k, interner.intern("f2")), Probe::Unknown);
    }

    #[test]
    fn filter_keeps_only_known_allow() {
        let cache = TigerCache::new(1000);
        let interner = Interner::new();
        let k = key(&interner);
        let f1 = interner.intern("f1");
        let f2 = interner.intern("f2");
        let f3 = interner.intern("f3");
        cache.set(k, f1, true);
        cache.set(k, f2, false);
        let result = cache.filter(k, vec![f1, f2, f3]);
        assert_eq!(result, vec![f1]);
    }
}
