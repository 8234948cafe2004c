//! Symbol interner.
//!
//! Injective, append-only mapping between short strings (tenant ids,
//! subject/object types, relation names, permission names) and 32-bit
//! symbols. Every hot-path key and every bitmap member elsewhere in the
//! core is a `Sym` rather than a `String` — this crate is the only place
//! that ever allocates one.

use parking_lot::RwLock;
use string_interner::{DefaultBackend, StringInterner};

/// A 32-bit interned symbol. Stable for the lifetime of the owning
/// `Interner`; never reused, never mutated once assigned.
pub type Sym = string_interner::DefaultSymbol;

/// Append-only string/symbol interner.
///
/// Growth is guarded by a single `RwLock`; lookups of an already-interned
/// string only need a read lock, so steady-state traffic (the vast
/// majority of calls, since tenants/types/relations/permissions form a
/// small closed vocabulary) never contends on a writer.
#[derive(Default)]
pub struct Interner {
    inner: RwLock<StringInterner<DefaultBackend>>,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StringInterner::new()),
        }
    }

    /// Intern `s`, returning its symbol. Total and idempotent: interning
    /// the same string twice returns the same symbol.
    pub fn intern(&self, s: &str) -> Sym {
        // Fast path: already interned, only needs a read lock.
        if let Some(sym) = self.inner.read().get(s) {
            return sym;
        }
        self.inner.write().get_or_intern(s)
    }

    /// Resolve a symbol back to its string. `None` only for a symbol that
    /// was never produced by this interner (e.g. from a different
    /// process with a different symbol table).
    pub fn resolve(&self, sym: Sym) -> Option<String> {
        self.inner.read().resolve(sym).map(str::to_owned)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every `(symbol, string)` pair currently interned, for
    /// persistence into the optional `interner_symbols` table. Symbols
    /// only need to be persisted if Tiger bitmaps (which are keyed by raw
    /// symbol value) are themselves persisted across restarts; otherwise
    /// bitmaps are simply rebuilt cold.
    pub fn snapshot(&self) -> Vec<(u32, String)> {
        self.inner
            .read()
            .into_iter()
            .map(|(sym, s)| (sym_to_u32(sym), s.to_owned()))
            .collect()
    }

    /// Rebuild an interner from a persisted snapshot, preserving the
    /// exact string -> symbol assignment it was saved with. Panics if the
    /// snapshot isn't dense/ordered starting at 0, since
    /// `string-interner`'s `DefaultBackend` assigns symbols in insertion
    /// order and offers no "insert at index" primitive.
    pub fn from_snapshot(mut rows: Vec<(u32, String)>) -> Self {
        rows.sort_by_key(|(sym, _)| *sym);
        let interner = Self::new();
        for (expected, (sym, s)) in rows.into_iter().enumerate() {
            let got = interner.intern(&s);
            debug_assert_eq!(sym as usize, expected, "snapshot symbol gap for {s:?}");
            debug_assert_eq!(sym_to_u32(got) as usize, expected);
        }
        interner
    }
}

fn sym_to_u32(sym: Sym) -> u32 {
    use string_interner::Symbol;
    sym.to_usize() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let interner = Interner::new();
        let a = interner.intern("tenant-1");
        let b = interner.intern("tenant-1");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_strings_get_distinct_symbols() {
        let interner = Interner::new();
        let a = interner.intern("viewer");
        let b = interner.intern("editor");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_round_trips() {
        let interner = Interner::new();
        let sym = interner.intern("folder");
        assert_eq!(interner.resolve(sym).as_deref(), Some("folder"));
    }

    #[test]
    fn resolve_unknown_symbol_is_none() {
        let a = Interner::new();
        let b = Interner::new();
        let sym = b.intern("only-in-b");
        assert_eq!(a.resolve(sym), None);
    }

    #[test]
    fn snapshot_round_trips_through_from_snapshot() {
        let interner = Interner::new();
        let a = interner.intern("user");
        let b = interner.intern("group");
        let snapshot = interner.snapshot();

        let restored = Interner::from_snapshot(snapshot);
        assert_eq!(restored.resolve(a).as_deref(), Some("user"));
        assert_eq!(restored.resolve(b).as_deref(), Some("group"));
    }
}
