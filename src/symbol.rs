//! Process-wide symbol interning.
//!
//! Field names and keywords are interned once into a small integer
//! [`SymbolId`]; comparisons, hashing and marshaling all operate on the id
//! rather than the string. Interning is append-only and concurrent-safe:
//! many readers, rare writers (spec.md §4.2).

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};

use crate::hash::Hash;

/// A positive, process-wide, monotonically assigned symbol id. `0` is
/// reserved for [`SymbolId::INVALID`] and is never handed out by `intern`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SymbolId(pub u32);

impl SymbolId {
    /// Reserved id meaning "no symbol" / `Value::Invalid`'s tag companion.
    pub const INVALID: SymbolId = SymbolId(0);

    /// Resolve back to the interned string. Panics if the id was never
    /// interned in this process — a violated invariant (spec.md §7: fatal
    /// programmer error), not a recoverable condition.
    pub fn str(self) -> Arc<str> {
        SYMBOLS.with_table(|t| {
            t.names
                .get(self.0 as usize)
                .cloned()
                .unwrap_or_else(|| panic!("SymbolId {} was never interned", self.0))
        })
    }

    /// Fingerprint of a symbol is the fingerprint of its literal name, not
    /// of its (process-local, non-deterministic-across-runs) integer id.
    pub fn hash(self) -> Hash {
        Hash::of_string(&self.str())
    }
}

struct Table {
    /// `names[id]` is the interned string for `SymbolId(id)`. Index 0 is the
    /// unused placeholder for `SymbolId::INVALID`.
    names: Vec<Arc<str>>,
    by_name: FxHashMap<Arc<str>, SymbolId>,
}

impl Table {
    fn new() -> Self {
        Table {
            names: vec![Arc::from("")],
            by_name: FxHashMap::default(),
        }
    }
}

/// The global, process-wide symbol table plus the pre-interned mark.
pub struct SymbolTable {
    inner: RwLock<Table>,
    pre_interned_mark: OnceLock<u32>,
}

impl SymbolTable {
    fn with_table<R>(&self, f: impl FnOnce(&Table) -> R) -> R {
        f(&self.inner.read())
    }

    /// Intern `name`, returning its (possibly newly assigned) id.
    /// `Intern(s) == Intern(s)` always holds (spec.md invariant).
    pub fn intern(&self, name: &str) -> SymbolId {
        if let Some(id) = self.inner.read().by_name.get(name) {
            return *id;
        }
        let mut t = self.inner.write();
        // Re-check: another writer may have interned it while we waited
        // for the write lock.
        if let Some(id) = t.by_name.get(name) {
            return *id;
        }
        let id = SymbolId(t.names.len() as u32);
        let arc: Arc<str> = Arc::from(name);
        t.names.push(arc.clone());
        t.by_name.insert(arc, id);
        id
    }

    /// Mark the current highest id as "pre-interned" (stable across worker
    /// nodes). Intended to be called exactly once, right after built-in
    /// registration (spec.md §4.2). Calling it twice is a programmer error.
    pub fn mark_pre_interned(&self) {
        let next = self.inner.read().names.len() as u32;
        self.pre_interned_mark
            .set(next)
            .expect("mark_pre_interned called more than once");
    }

    /// Is `id` guaranteed to map to the same value on every worker node?
    /// Ids at or above the mark depend on script-defined names and must be
    /// marshaled by embedding the literal name instead of the raw id.
    pub fn is_pre_interned(&self, id: SymbolId) -> bool {
        match self.pre_interned_mark.get() {
            Some(mark) => id.0 < *mark,
            // Before the mark is set (e.g. during builtin registration
            // itself) nothing counts as stable yet.
            None => false,
        }
    }
}

static SYMBOLS: SymbolTableHandle = SymbolTableHandle;

/// Thin accessor so call sites read `SYMBOLS.intern(...)` without needing
/// to know about `OnceLock`-based lazy construction.
struct SymbolTableHandle;

impl SymbolTableHandle {
    fn table(&self) -> &'static SymbolTable {
        static INSTANCE: OnceLock<SymbolTable> = OnceLock::new();
        INSTANCE.get_or_init(|| SymbolTable {
            inner: RwLock::new(Table::new()),
            pre_interned_mark: OnceLock::new(),
        })
    }

    fn with_table<R>(&self, f: impl FnOnce(&Table) -> R) -> R {
        self.table().with_table(f)
    }

    fn intern(&self, name: &str) -> SymbolId {
        self.table().intern(name)
    }

    fn mark_pre_interned(&self) {
        self.table().mark_pre_interned()
    }

    fn is_pre_interned(&self, id: SymbolId) -> bool {
        self.table().is_pre_interned(id)
    }
}

/// Intern `name` in the process-wide symbol table.
pub fn intern(name: &str) -> SymbolId {
    SYMBOLS.intern(name)
}

/// See [`SymbolTable::mark_pre_interned`].
pub fn mark_pre_interned() {
    SYMBOLS.mark_pre_interned()
}

/// See [`SymbolTable::is_pre_interned`].
pub fn is_pre_interned(id: SymbolId) -> bool {
    SYMBOLS.is_pre_interned(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let a = intern("a_test_symbol_intern_is_idempotent");
        let b = intern("a_test_symbol_intern_is_idempotent");
        assert_eq!(a, b);
    }

    #[test]
    fn round_trip() {
        let id = intern("a_test_symbol_round_trip");
        assert_eq!(intern(&id.str()), id);
    }

    #[test]
    fn distinct_names_distinct_ids() {
        let a = intern("a_test_symbol_distinct_x");
        let b = intern("a_test_symbol_distinct_y");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_depends_on_name_not_id() {
        let id = intern("a_test_symbol_hash_name");
        assert_eq!(id.hash(), Hash::of_string("a_test_symbol_hash_name"));
    }
}
