//! Distinct values of a column and their occurrence counts.

use indexmap::IndexMap;

use crate::input::is_missing;

/// Distinct non-missing values in first-appearance order.
///
/// The position of a value is its index for the whole pass: row `i` of the
/// similarity matrix and label `i` of the cluster assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueCounts {
    counts: IndexMap<String, usize>,
}

impl ValueCounts {
    /// Count the values of a column, skipping missing cells.
    pub fn from_column(column: &[String]) -> Self {
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for value in column.iter().filter(|v| !is_missing(v)) {
            *counts.entry(value.clone()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Distinct values, in index order.
    pub fn values(&self) -> Vec<String> {
        self.counts.keys().cloned().collect()
    }

    /// Value at `index`.
    pub fn value(&self, index: usize) -> &str {
        self.counts
            .get_index(index)
            .map(|(value, _)| value.as_str())
            .unwrap_or_default()
    }

    /// Occurrences of the value at `index`.
    pub fn count(&self, index: usize) -> usize {
        self.counts.get_index(index).map_or(0, |(_, count)| *count)
    }

    /// `(value, count)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(value, count)| (value.as_str(), *count))
    }
}
