//! Export formats for the CSV dump.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use starlinx_core::error::StarlinxError;

use crate::file_sink::CsvDump;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// The CSV file byte for byte.
    Csv,
    /// One header-to-value object per data row.
    Json,
}

impl FromStr for ExportFormat {
    type Err = StarlinxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(StarlinxError::invalid(
                "format",
                format!("unknown export format '{}', expected csv or json", other),
            )),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => f.write_str("csv"),
            ExportFormat::Json => f.write_str("json"),
        }
    }
}

/// Serialized export.
#[derive(Clone, Debug, PartialEq)]
pub enum Export {
    Csv(Vec<u8>),
    Json(Vec<Map<String, Value>>),
}

/// Map each data row onto the header names.
///
/// Missing trailing fields become `null`; fields beyond the header are
/// dropped. Blank header names are skipped.
pub fn rows_to_objects(dump: &CsvDump) -> Vec<Map<String, Value>> {
    dump.rows
        .iter()
        .map(|row| {
            dump.headers
                .iter()
                .enumerate()
                .filter(|(_, header)| !header.is_empty())
                .map(|(i, header)| {
                    let value = row
                        .get(i)
                        .map(|v| Value::String(v.clone()))
                        .unwrap_or(Value::Null);
                    (header.clone(), value)
                })
                .collect()
        })
        .collect()
}
