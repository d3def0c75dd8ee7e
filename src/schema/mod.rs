//! Schema inference module
//!
//! Derives SQLite column types from a single sample response and keeps
//! user-supplied identifiers safe to interpolate into SQL.

mod identifiers;
mod inference;

pub use identifiers::{
    quote_identifier, sanitize_column_name, validate_table_name, RESERVED_COLUMNS,
    RESERVED_TABLES,
};
pub use inference::{infer_schema, sample_record};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of an inferred column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    /// The SQLite type name
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }

    pub fn from_sql_name(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Some(ColumnType::Text),
            "INTEGER" => Some(ColumnType::Integer),
            "REAL" => Some(ColumnType::Real),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}
