//! Value-to-canonical mapping and its application to a column.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Total map from every distinct value of a pass to its canonical form.
///
/// Every canonical form is itself a member of the cluster it stands for and
/// maps to itself, so applying a mapping twice changes nothing the second
/// time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalMapping {
    entries: IndexMap<String, String>,
}

impl CanonicalMapping {
    /// Build from `(value, canonical)` pairs.
    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Canonical form of `value`, if it was part of the pass.
    pub fn get(&self, value: &str) -> Option<&str> {
        self.entries.get(value).map(String::as_str)
    }

    /// Canonical form of `value`; unknown values (such as missing cells) map
    /// to themselves.
    pub fn canonical<'a>(&'a self, value: &'a str) -> &'a str {
        self.get(value).unwrap_or(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(value, canonical)` pairs in value order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(v, c)| (v.as_str(), c.as_str()))
    }

    /// Pairs whose value is rewritten.
    pub fn changes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(v, c)| v != c)
    }

    /// True if no value is rewritten.
    pub fn is_identity(&self) -> bool {
        self.changes().next().is_none()
    }

    /// Number of distinct canonical forms.
    pub fn canonical_count(&self) -> usize {
        let mut seen: Vec<&str> = self.entries.values().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Rewrite a column. Returns the new column and the number of changed
    /// cells.
    pub fn apply(&self, column: &[String]) -> (Vec<String>, usize) {
        let mut changed = 0;
        let rewritten = column
            .iter()
            .map(|cell| {
                let canonical = self.canonical(cell);
                if canonical != cell.as_str() {
                    changed += 1;
                }
                canonical.to_string()
            })
            .collect();
        (rewritten, changed)
    }
}
