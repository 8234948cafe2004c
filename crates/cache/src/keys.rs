use nexus_interner::Sym;

/// Key shape shared by the Subproblem and Directory Visibility caches:
/// every hot-path key is built from interned symbols, never raw
/// strings, so hashing and equality are cheap integer comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectRelationObjectKey {
    pub tenant: Sym,
    pub subject_type: Sym,
    pub subject_id: Sym,
    pub relation: Sym,
    pub object_type: Sym,
    pub object_id: Sym,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TigerKey {
    pub tenant: Sym,
    pub subject_type: Sym,
    pub subject_id: Sym,
    pub permission: Sym,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisibilityKey {
    pub tenant: Sym,
    pub subject_type: Sym,
    pub subject_id: Sym,
    pub directory_type: Sym,
    pub directory_id: Sym,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeopardKey {
    pub tenant: Sym,
    pub subject_type: Sym,
    pub subject_id: Sym,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinalKey {
    pub tenant: Sym,
    pub subject_type: Sym,
    pub subject_id: Sym,
    pub permission: Sym,
    pub object_type: Sym,
    pub object_id: Sym,
    pub quantum: i64,
}
