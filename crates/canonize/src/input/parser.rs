//! CSV/TSV reading with delimiter detection, and writing back.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use log::debug;

use super::source::DataTable;
use crate::error::{CanonizeError, Result};

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

/// Lines sampled for delimiter detection.
const DETECTION_LINES: usize = 10;

/// Reader configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Delimiter to use (None = auto-detect).
    pub delimiter: Option<u8>,
    pub quote: u8,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: b'"',
        }
    }
}

/// Reads delimited files with a header row into a [`DataTable`].
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Read a file, detecting the delimiter unless one is configured.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<DataTable> {
        let path = path.as_ref();
        let contents = fs::read(path).map_err(|e| CanonizeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let delimiter = match self.config.delimiter {
            Some(d) => d,
            None => detect_delimiter(&contents)?,
        };
        let table = self.parse_bytes(&contents, delimiter)?;
        debug!(
            "Read {} ({} rows, {} columns, delimiter {:?})",
            path.display(),
            table.row_count(),
            table.column_count(),
            delimiter as char
        );
        Ok(table)
    }

    /// Parse bytes with a known delimiter.
    ///
    /// Short rows are padded with empty cells. A row with more cells than
    /// the header is a validation error.
    pub fn parse_bytes(&self, bytes: &[u8], delimiter: u8) -> Result<DataTable> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .quote(self.config.quote)
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(CanonizeError::Validation("No columns found".to_string()));
        }

        let width = headers.len();
        let rows = reader
            .records()
            .enumerate()
            .map(|(line, record)| -> Result<Vec<String>> {
                let mut row: Vec<String> = record?.iter().map(str::to_string).collect();
                if row.len() > width {
                    return Err(CanonizeError::Validation(format!(
                        "Row {} has {} fields, expected {}",
                        line + 1,
                        row.len(),
                        width
                    )));
                }
                row.resize(width, String::new());
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DataTable::new(headers, rows, delimiter))
    }
}

/// Write a table with its own delimiter, creating parent directories.
pub fn write_table(table: &DataTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CanonizeError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let file = File::create(path).map_err(|e| CanonizeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(table.delimiter)
        .from_writer(BufWriter::new(file));

    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|e| CanonizeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Pick the delimiter that splits the sampled lines most consistently.
fn detect_delimiter(bytes: &[u8]) -> Result<u8> {
    let lines: Vec<String> = BufReader::new(bytes)
        .lines()
        .map_while(|l| l.ok())
        .filter(|l| !l.trim().is_empty())
        .take(DETECTION_LINES)
        .collect();

    if lines.is_empty() {
        return Err(CanonizeError::Validation("File is empty".to_string()));
    }

    let mut best = (b',', 0usize);
    for &delimiter in DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_unquoted(line, delimiter))
            .collect();
        let first = counts[0];
        if first == 0 {
            continue;
        }

        // Consistent splits dominate; tab wins ties since it rarely appears
        // inside values.
        let score = if counts.iter().all(|&c| c == first) {
            first * 1000 + usize::from(delimiter == b'\t') * 100
        } else {
            first
        };
        if score > best.1 {
            best = (delimiter, score);
        }
    }

    Ok(best.0)
}

/// Count delimiter occurrences outside double quotes.
fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let delimiter = delimiter as char;
    let mut in_quotes = false;
    line.chars()
        .filter(|&c| {
            if c == '"' {
                in_quotes = !in_quotes;
            }
            c == delimiter && !in_quotes
        })
        .count()
}
