//! Tabular input and output.

mod parser;
mod source;

pub use parser::{Parser, ParserConfig, write_table};
pub use source::{ColumnStore, DataTable, is_missing};
