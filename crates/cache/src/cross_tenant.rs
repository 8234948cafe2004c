use chrono::{DateTime, Utc};
use nexus_interner::Sym;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy)]
pub struct Grant {
    pub subject_tenant: Sym,
    pub subject_type: Sym,
    pub subject_id: Sym,
    pub object_tenant: Sym,
    pub object_type: Sym,
    pub object_id: Sym,
    pub relation: Sym,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ObjectKey {
    tenant: Sym,
    object_type: Sym,
    object_id: Sym,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SubjectKey {
    tenant: Sym,
    subject_type: Sym,
    subject_id: Sym,
}

/// Dedicated index for tuples whose relation is in the `shared_*`
/// family — the only way one tenant's subject may reach another
/// tenant's object. Consulted before the normal graph walk whenever
/// `subject_tenant != object_tenant`; absence is deny until a grant is
/// written. TTL on this index is long because cross-tenant grants
/// mutate rarely; expiry is still checked per-read.
#[derive(Default)]
pub struct CrossTenantGrantIndex {
    by_object: RwLock<ahash::AHashMap<ObjectKey, Vec<Grant>>>,
    by_subject: RwLock<ahash::AHashMap<SubjectKey, Vec<Grant>>>,
}

impl CrossTenantGrantIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, grant: Grant) {
        let object_key = ObjectKey { tenant: grant.object_tenant, object_type: grant.object_type, object_id: grant.object_id };
        let subject_key = SubjectKey { tenant: grant.subject_tenant, subject_type: grant.subject_type, subject_id: grant.subject_id };
        self.by_object.write().entry(object_key).or_default().push(grant);
        self.by_subject.write().entry(subject_key).or_default().push(grant);
    }

    /// Grants reachable on `(object_tenant, object_type, object_id)` —
    /// expired grants are filtered out, never returned.
    pub fn grants_on_object(&self, tenant: Sym, object_type: Sym, object_id: Sym) -> Vec<Grant> {
        let key = ObjectKey { tenant, object_type, object_id };
        let now = Utc::now();
        self.by_object
            .read()
            .get(&key)
            .map(|grants| grants.iter().copied().filter(|g| !is_expired(g, now)).collect())
            .unwrap_or_default()
    }

    pub fn grants_from_subject(&self, tenant: Sym, subject_type: Sym, subject_id: Sym) -> Vec<Grant> {
        let key = SubjectKey { tenant, subject_type, subject_id };
        let now = Utc::now();
        self.by_subject
            .read()
            .get(&key)
            .map(|grants| grants.iter().copied().filter(|g| !is_expired(g, now)).collect())
            .unwrap_or_default()
    }

    /// Removes a specific grant from both maps — called on tuple
    /// delete.
    pub fn remove(&self, grant: &Grant) {
        let object_key = ObjectKey { tenant: grant.object_tenant, object_type: grant.object_type, object_id: grant.object_id };
        let subject_key = SubjectKey { tenant: grant.subject_tenant, subject_type: grant.subject_type, subject_id: grant.subject_id };
        if let Some(v) = self.by_object.write().get_mut(&object_key) {
            v.retain(|g| !matches_grant(g, grant));
        }
        if let Some(v) = self.by_subject.write().get_mut(&subject_key) {
            v.retain(|g| !matches_grant(g, grant));
        }
    }
}

fn is_expired(grant: &Grant, now: DateTime<Utc>) -> bool {
    grant.expires_at.map(|exp| exp <= now).unwrap_or(false)
}

fn matches_grant(a: &Grant, b: &Grant) -> bool {
    a.subject_tenant == b.subject_tenant
        && a.subject_type == b.subject_type
        && a.subject_id == b.subject_id
        && a.object_tenant == b.object_tenant
        && a.object_type == b.object_type
        && a.object_id == b.object_id
        && a.relation == b.relation
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_interner::Interner;

    fn grant(interner: &Interner, expires_at: Option<DateTime<Utc>>) -> Grant {
        Grant {
            subject_tenant: interner.intern("t1"),
            subject_type: interner.intern("user"),
            subject_id: interner.intern("alice"),
            object_tenant: interner.intern("t2"),
            object_type: interner.intern("folder"),
            object_id: interner.intern("f1"),
            relation: interner.intern("shared_viewer"),
            expires_at,
        }
    }

    #[test]
    fn insert_then_lookup_by_object_and_subject() {
        let index = CrossTenantGrantIndex::new();
        let interner = Interner::new();
        let g = grant(&interner, None);
        index.insert(g);

        let by_object = index.grants_on_object(g.object_tenant, g.object_type, g.object_id);
        assert_eq!(by_object.len(), 1);

        let by_subject = index.grants_from_subject(g.subject_tenant, g.subject_type, g.subject_id);
        assert_eq!(by_subject.len(), 1);
    }

    #[test]
    fn expired_grants_are_never_returned() {
        let index = CrossTenantGrantIndex::new();
        let interner = Interner::new();
        let g = grant(&interner, Some(Utc::now() - chrono::Duration::seconds(1)));
        index.insert(g);
        assert!(index.grants_on_object(g.object_tenant, g.object_type, g.object_id).is_empty());
    }

    #[test]
    fn remove_drops_from_both_maps() {
        let index = CrossTenantGrantIndex::new();
        let interner = Interner::new();
        let g = grant(&interner, None);
        index.insert(g);
        index.remove(&g);
        assert!(index.grants_on_object(g.object_tenant, g.object_type, g.object_id).is_empty());
        assert!(index.grants_from_subject(g.subject_tenant, g.subject_type, g.subject_id).is_empty());
    }
}
