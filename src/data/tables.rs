//! Local tabular datasets.
//!
//! Tables are read from CSV files once at startup into immutable in-memory
//! structures. The process never mutates them afterwards, so they are shared
//! behind an `Arc` and read concurrently without locking. A restart is
//! required to pick up changed source files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{DataError, Record};

/// One loaded table: header-derived field list plus row records.
#[derive(Debug)]
pub struct Table {
    fields: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }
}

/// The process-wide set of local tables.
#[derive(Debug, Default)]
pub struct LocalTables {
    tables: HashMap<String, Table>,
}

impl LocalTables {
    /// Load every configured `(name, path)` CSV into memory.
    ///
    /// Called once at startup; a missing or malformed file aborts startup
    /// rather than leaving a partially usable data layer.
    pub fn load(specs: &[(String, PathBuf)]) -> anyhow::Result<Self> {
        let mut tables = HashMap::new();
        for (name, path) in specs {
            let table = load_table(path)
                .map_err(|e| anyhow::anyhow!("failed to load table '{}' from {}: {}", name, path.display(), e))?;
            tracing::info!(table = %name, rows = table.rows.len(), "loaded local table");
            tables.insert(name.clone(), table);
        }
        Ok(Self { tables })
    }

    /// Table names and their field lists, for prompt assembly.
    pub fn catalog(&self) -> Vec<(&str, &[String])> {
        let mut entries: Vec<_> = self
            .tables
            .iter()
            .map(|(name, table)| (name.as_str(), table.fields()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }

    /// All rows of a table, for the map data endpoints.
    pub fn all_rows(&self, table_name: &str) -> Result<&[Record], DataError> {
        self.tables
            .get(table_name)
            .map(|t| t.rows())
            .ok_or_else(|| DataError::NotFound(format!("unknown table: {}", table_name)))
    }

    /// Substring match against one field of a table.
    ///
    /// An empty `substring` matches every row. Results are capped at
    /// `max_rows`; no match is an empty result, not an error.
    pub fn query(
        &self,
        table_name: &str,
        field: &str,
        substring: &str,
        case_insensitive: bool,
        max_rows: usize,
    ) -> Result<Vec<Record>, DataError> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| DataError::NotFound(format!("unknown table: {}", table_name)))?;

        if !table.fields.iter().any(|f| f == field) {
            return Err(DataError::InvalidFilter(format!(
                "unknown field '{}' in table '{}' (available: {})",
                field,
                table_name,
                table.fields.join(", ")
            )));
        }

        let needle = if case_insensitive {
            substring.to_lowercase()
        } else {
            substring.to_string()
        };

        let rows = table
            .rows
            .iter()
            .filter(|row| {
                let cell = row.get(field).map(value_text).unwrap_or_default();
                if case_insensitive {
                    cell.to_lowercase().contains(&needle)
                } else {
                    cell.contains(&needle)
                }
            })
            .take(max_rows)
            .cloned()
            .collect();

        Ok(rows)
    }
}

fn load_table(path: &Path) -> anyhow::Result<Table> {
    let mut reader = csv::Reader::from_path(path)?;
    let fields: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = Record::new();
        for (field, raw) in fields.iter().zip(record.iter()) {
            row.insert(field.clone(), parse_scalar(raw));
        }
        rows.push(row);
    }

    Ok(Table { fields, rows })
}

/// CSV cells are untyped; keep numbers as numbers so coordinates survive
/// the trip to JSON without quoting.
fn parse_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    Value::from(trimmed)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
