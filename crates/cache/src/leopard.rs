use std::sync::Arc;

use ahash::AHashSet;
use nexus_interner::Sym;
use parking_lot::RwLock;

use crate::keys::LeopardKey;

/// Per-tenant transitive closure of `member`-style relations. Lookup is
/// O(1) against the frozen set; rebuild is the caller's job (a BFS over
/// the tuple store) — this structure only owns the swap.
///
/// A rebuild replaces one subject's whole closure with a fresh `Arc`;
/// concurrent readers hold their own clone of the old or new `Arc` and
/// never see a partially-updated set.
#[derive(Default)]
pub struct LeopardIndex {
    closures: RwLock<ahash::AHashMap<LeopardKey, Arc<AHashSet<Sym>>>>,
}

impl LeopardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means the index has no opinion — the subject has never
    /// been indexed, or was evicted. The caller must treat this as
    /// "fall through to the tuple store," not as "not a member."
    pub fn is_member(&self, key: LeopardKey, group: Sym) -> Option<bool> {
        self.closures.read().get(&key).map(|closure| closure.contains(&group))
    }

    pub fn rebuild(&self, key: LeopardKey, closure: AHashSet<Sym>) {
        self.closures.write().insert(key, Arc::new(closure));
    }

    /// A group was deleted — every subject whose closure contains it
    /// must be rebuilt by the caller; this only drops the stale entries
    /// so stale `is_member` answers aren't served in the meantime.
    pub fn evict_containing(&self, group: Sym) {
        self.closures.write().retain(|_, closure| !closure.contains(&group));
    }

    pub fn evict_subject(&self, key: LeopardKey) {
        self.closures.write().remove(&key);
    }

    pub fn evict_tenant(&self, tenant: Sym) {
        self.closures.write().retain(|k, _| k.tenant != tenant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_interner::Interner;

    #[test]
    fn unindexed_subject_is_none() {
        let index = LeopardIndex::new();
        let interner = Interner::new();
        let key = LeopardKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
        };
        assert_eq!(index.is_member(key, interner.intern("eng")), None);
    }

    #[test]
    fn rebuild_then_lookup() {
        let index = LeopardIndex::new();
        let interner = Interner::new();
        let key = LeopardKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
        };
        let eng = interner.intern("eng");
        let mut closure = AHashSet::default();
        closure.insert(eng);
        index.rebuild(key, closure);
        assert_eq!(index.is_member(key, eng), Some(true));
        assert_eq!(index.is_member(key, interner.intern("sales")), Some(false));
    }

    #[test]
    fn evict_containing_drops_affected_subjects_only() {
        let index = LeopardIndex::new();
        let interner = Interner::new();
        let key_a = LeopardKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
        };
        let key_b = LeopardKey {
            tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("bob"),
        };
        let eng = interner.intern("eng");
        let sales = interner.intern("sales");
        index.rebuild(key_a, [eng].into_iter().collect());
        index.rebuild(key_b, [sales].into_iter().collect());
        index.evict_containing(eng);
        assert_eq!(index.is_member(key_a, eng), None);
        assert_eq!(index.is_member(key_b, sales), Some(true));
    }
}
