//! Shared string interning table
//!
//! Label names and values repeat heavily across scrapes. The `SymbolTable`
//! deduplicates them into shared `Arc<str>` handles so many concurrent
//! parsers allocate each distinct string once.
//!
//! The table is the one shared-mutable boundary in this crate: interning is
//! safe to call from many threads, and concurrent interns of equal strings
//! always resolve to the same (pointer-identical) handle.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

/// Concurrency-safe intern table for label strings
#[derive(Debug, Default)]
pub struct SymbolTable {
    inner: RwLock<HashSet<Arc<str>>>,
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning the canonical shared handle.
    ///
    /// The fast path takes only a read lock. On miss the write path
    /// re-checks before inserting, so a racing intern of the same string
    /// never produces a duplicate entry.
    pub fn intern(&self, s: &str) -> Arc<str> {
        if let Some(sym) = self.inner.read().get(s) {
            return Arc::clone(sym);
        }

        let mut table = self.inner.write();
        if let Some(sym) = table.get(s) {
            return Arc::clone(sym);
        }
        let sym: Arc<str> = Arc::from(s);
        table.insert(Arc::clone(&sym));
        sym
    }

    /// Number of distinct interned strings
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
