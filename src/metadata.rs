//! Authoritative column metadata used to correct extracted column names.
//!
//! The extraction pipeline consults a [`MetadataProvider`] for the target
//! table's column list. [`StaticMetadata`] is the built-in provider, filled
//! in code or loaded from a JSON, YAML or TOML file mapping table names to
//! column lists.
//!
//! # File Format
//!
//! ```json
//! {
//!   "dm.loan_stat": {"columns": [{"column_name": "dt", "type_name": "string", "comment_name": "day"}]},
//!   "dm.other": [{"name": "id", "type": "bigint", "comment": ""}]
//! }
//! ```
//!
//! Both column-list forms are accepted; see [`parse_column_list`].

use std::{fs, path::Path, sync::LazyLock};

use compact_str::CompactString;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppResult, config_error, file_read_error};

static MISSING_COMMA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}\s*\{").expect("valid regex"));

static COLUMN_FIELDS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)"column_name"\s*:\s*"([^"]*)".*?"type_name"\s*:\s*"([^"]*)".*?"comment_name"\s*:\s*"([^"]*)""#
    )
    .expect("valid regex")
});

/// One column of a table as recorded in the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name:      CompactString,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub comment:   String
}

impl ColumnMeta {
    pub fn new(name: &str, data_type: &str, comment: &str) -> Self {
        Self {
            name:      CompactString::from(name),
            data_type: data_type.to_string(),
            comment:   comment.to_string()
        }
    }
}

/// Source of authoritative column lists, in physical order.
pub trait MetadataProvider: Send + Sync {
    /// Columns of `table`. An unknown table yields an empty list; `Err` is
    /// reserved for provider failures.
    fn list_columns(&self, table: &str) -> AppResult<Vec<ColumnMeta>>;
}

/// In-memory provider keyed by lowercase table name.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    tables: IndexMap<CompactString, Vec<ColumnMeta>>
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, columns: Vec<ColumnMeta>) {
        self.tables
            .insert(CompactString::from(table.to_ascii_lowercase()), columns);
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Load a table-to-columns map; the format follows the file extension.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| file_read_error(&display, e))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let raw: IndexMap<String, Value> = match extension.as_deref() {
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| config_error(format!("Invalid metadata file '{}': {}", display, e)))?,
            Some("toml") => toml::from_str(&content)
                .map_err(|e| config_error(format!("Invalid metadata file '{}': {}", display, e)))?,
            _ => serde_json::from_str(&content)
                .map_err(|e| config_error(format!("Invalid metadata file '{}': {}", display, e)))?
        };

        let mut metadata = Self::new();
        for (table, value) in raw {
            let columns = match value {
                Value::String(text) => parse_column_list(&text),
                other => normalize_columns(&other)
            };
            metadata.insert(&table, columns);
        }
        tracing::debug!(tables = metadata.len(), path = %path.display(), "loaded column metadata");
        Ok(metadata)
    }
}

impl MetadataProvider for StaticMetadata {
    fn list_columns(&self, table: &str) -> AppResult<Vec<ColumnMeta>> {
        Ok(self
            .tables
            .get(table.to_ascii_lowercase().as_str())
            .cloned()
            .unwrap_or_default())
    }
}

/// Decode a stored column-list string.
///
/// Accepts `{"columns": [{"column_name", "type_name", "comment_name"}]}` and
/// `[{"name", "type", "comment"}]`. Objects concatenated without a comma are
/// repaired, and as a last resort the three `*_name` fields are pulled out
/// textually. Undecodable input yields an empty list.
pub fn parse_column_list(raw: &str) -> Vec<ColumnMeta> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return normalize_columns(&value);
    }
    let repaired = MISSING_COMMA_REGEX.replace_all(raw, "},{");
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        return normalize_columns(&value);
    }
    COLUMN_FIELDS_REGEX
        .captures_iter(raw)
        .map(|caps| ColumnMeta::new(&caps[1], &caps[2], &caps[3]))
        .collect()
}

fn normalize_columns(value: &Value) -> Vec<ColumnMeta> {
    let columns = match value {
        Value::Object(map) => match map.get("columns") {
            Some(Value::Array(columns)) => columns,
            _ => return Vec::new()
        },
        Value::Array(columns) => columns,
        _ => return Vec::new()
    };

    columns
        .iter()
        .filter_map(Value::as_object)
        .map(|column| {
            let field = |primary: &str, fallback: &str| {
                column
                    .get(primary)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .or_else(|| column.get(fallback).and_then(Value::as_str))
                    .unwrap_or_default()
            };
            ColumnMeta::new(
                field("column_name", "name"),
                field("type_name", "type"),
                field("comment_name", "comment")
            )
        })
        .collect()
}
