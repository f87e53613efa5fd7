//! In-memory table and the column store seam used by the normalizer.

use indexmap::IndexMap;

use crate::error::{CanonizeError, Result};

/// Check if a cell represents a missing value.
///
/// Missing cells never join a cluster and are written back unchanged.
pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("n/a")
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("nil")
        || trimmed == "."
        || trimmed == "-"
}

/// Read and write access to named columns.
pub trait ColumnStore {
    /// All cells of a column, in row order.
    fn get_column(&self, name: &str) -> Result<Vec<String>>;

    /// Replace all cells of an existing column.
    fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()>;

    /// Replace several columns at once, all or nothing.
    ///
    /// Implementations must leave the store unchanged when any column is
    /// rejected. The default checks every name and length through
    /// [`get_column`](Self::get_column) before the first write, so it is
    /// atomic for stores whose `set_column` only fails on those two checks.
    fn set_columns(&mut self, columns: IndexMap<String, Vec<String>>) -> Result<()> {
        for (name, values) in &columns {
            let current = self.get_column(name)?.len();
            if current != values.len() {
                return Err(length_mismatch(name, current, values.len()));
            }
        }
        for (name, values) in columns {
            self.set_column(&name, values)?;
        }
        Ok(())
    }
}

fn length_mismatch(name: &str, rows: usize, values: usize) -> CanonizeError {
    CanonizeError::Validation(format!(
        "Column '{}' has {} rows, got {} values",
        name, rows, values
    ))
}

/// Parsed tabular data, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Delimiter the table was read with; used again when writing.
    pub delimiter: u8,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>, delimiter: u8) -> Self {
        Self {
            headers,
            rows,
            delimiter,
        }
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column by exact header name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Get a specific cell value.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col).map(|s| s.as_str()))
    }

    fn write_column(&mut self, index: usize, values: Vec<String>) {
        for (row, value) in self.rows.iter_mut().zip(values) {
            if row.len() <= index {
                row.resize(index + 1, String::new());
            }
            row[index] = value;
        }
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            CanonizeError::Validation(format!(
                "Column '{}' not found. Available columns: {}",
                name,
                self.headers.join(", ")
            ))
        })
    }
}

impl ColumnStore for DataTable {
    fn get_column(&self, name: &str) -> Result<Vec<String>> {
        let index = self.require_column(name)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or_default())
            .collect())
    }

    fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        let index = self.require_column(name)?;
        if values.len() != self.rows.len() {
            return Err(length_mismatch(name, self.rows.len(), values.len()));
        }
        self.write_column(index, values);
        Ok(())
    }

    fn set_columns(&mut self, columns: IndexMap<String, Vec<String>>) -> Result<()> {
        let mut resolved = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            let index = self.require_column(&name)?;
            if values.len() != self.rows.len() {
                return Err(length_mismatch(&name, self.rows.len(), values.len()));
            }
            resolved.push((index, values));
        }
        for (index, values) in resolved {
            self.write_column(index, values);
        }
        Ok(())
    }
}

/// Columns held by name, for callers without a table.
impl ColumnStore for IndexMap<String, Vec<String>> {
    fn get_column(&self, name: &str) -> Result<Vec<String>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| CanonizeError::Validation(format!("Column '{}' not found", name)))
    }

    fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        match self.get_mut(name) {
            Some(column) => {
                *column = values;
                Ok(())
            }
            None => Err(CanonizeError::Validation(format!(
                "Column '{}' not found",
                name
            ))),
        }
    }
}
