//! Symbol interner.
//!
//! Provides O(1) interning and lookup. Interned text is leaked into
//! `&'static str` storage so resolved names can be handed out without
//! borrowing the table.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::Sym;

struct Inner {
    /// Map from symbol text to index.
    map: FxHashMap<&'static str, u32>,
    /// Storage for symbol text, indexed by `Sym`.
    text: Vec<&'static str>,
}

/// Symbol interner.
///
/// The VM is a single logical thread, but the table still guards itself with
/// an `RwLock` so it can be shared freely with diagnostics and codegen
/// without threading mutable borrows everywhere.
pub struct SymTable {
    inner: RwLock<Inner>,
}

impl SymTable {
    /// Create a new table with the empty symbol pre-interned at index 0.
    pub fn new() -> Self {
        let empty: &'static str = "";
        let mut map = FxHashMap::default();
        map.insert(empty, 0);
        SymTable {
            inner: RwLock::new(Inner {
                map,
                text: vec![empty],
            }),
        }
    }

    /// Intern a string, returning its symbol.
    ///
    /// Interning the same text twice returns the same `Sym`.
    pub fn intern(&self, s: &str) -> Sym {
        {
            let guard = self.inner.read();
            if let Some(&idx) = guard.map.get(s) {
                return Sym::from_raw(idx);
            }
        }

        let mut guard = self.inner.write();

        // Double-check after acquiring the write lock.
        if let Some(&idx) = guard.map.get(s) {
            return Sym::from_raw(idx);
        }

        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let idx = u32::try_from(guard.text.len()).unwrap_or_else(|_| {
            // 4 billion distinct symbols in one session is not a real input.
            panic!("symbol table overflow")
        });
        guard.text.push(leaked);
        guard.map.insert(leaked, idx);
        Sym::from_raw(idx)
    }

    /// Resolve a symbol back to its text.
    ///
    /// Returns the empty string for symbols this table never produced.
    pub fn resolve(&self, sym: Sym) -> &'static str {
        let guard = self.inner.read();
        guard.text.get(sym.raw() as usize).copied().unwrap_or("")
    }

    /// Number of interned symbols, including the pre-interned empty symbol.
    pub fn len(&self) -> usize {
        self.inner.read().text.len()
    }

    /// Check whether only the empty symbol is interned.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for SymTable {
    fn default() -> Self {
        Self::new()
    }
}
