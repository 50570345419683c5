//! Label set and exemplar receivers
//!
//! Parsers populate labels into a caller-supplied `Labels` receiver instead
//! of returning owned collections, so a hot scrape loop reuses one
//! allocation across samples. All strings are interned handles from a
//! shared [`crate::SymbolTable`].

use std::sync::Arc;

/// Reserved label holding the metric name
pub const METRIC_NAME_LABEL: &str = "__name__";

/// An ordered set of (name, value) pairs with unique names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    pairs: Vec<(Arc<str>, Arc<str>)>,
}

impl Labels {
    /// Create an empty label set
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all pairs, keeping the allocation
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Append a pair. Callers must finish with `sort` before exposing the
    /// set; parsers do this for every populated receiver.
    pub(crate) fn push(&mut self, name: Arc<str>, value: Arc<str>) {
        self.pairs.push((name, value));
    }

    /// Sort by name and drop duplicate names, keeping the first occurrence
    pub(crate) fn sort(&mut self) {
        self.pairs.sort_by(|a, b| a.0.cmp(&b.0));
        self.pairs.dedup_by(|a, b| a.0 == b.0);
    }

    /// Look up a label value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v.as_ref())
    }

    /// Iterate over (name, value) pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_ref(), v.as_ref()))
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A labeled sample attached to a series or histogram entry
///
/// Reusable receiver for [`crate::Parser::exemplar`].
#[derive(Debug, Clone, Default)]
pub struct Exemplar {
    pub labels: Labels,
    pub value: f64,
    /// Exemplar timestamp in milliseconds, if present
    pub timestamp: Option<i64>,
}

impl Exemplar {
    /// Create an empty exemplar receiver
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the receiver for reuse
    pub fn reset(&mut self) {
        self.labels.clear();
        self.value = 0.0;
        self.timestamp = None;
    }
}
