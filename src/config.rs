//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. `.sql-lineage.toml` in current directory
//! 4. `~/.config/sql-lineage/config.toml`
//! 5. Default values
//!
//! A config file replaces the defaults section by section: a file that sets
//! `[inference] value_kinds` replaces the whole default value-kind table.
//!
//! # Configuration File Format
//!
//! ```toml
//! [metadata]
//! excluded_columns = ["dt", "create_time", "update_time"]
//! file = "columns.json"         # optional column lists for alignment
//!
//! [graph]
//! default_depth = 1
//! created_by = "auto"
//!
//! [inference]
//! default_domain = "generic"
//! value_kinds = [{ pattern = "amt|amount", kind = "amount" }]
//! domains = [{ pattern = "loan", domain = "loan" }]
//!
//! [inference.display_names]
//! td = "当日"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `SQL_LINEAGE_DEPTH` | Default traversal depth |
//! | `SQL_LINEAGE_CREATED_BY` | Author recorded on registered edges |

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf}
};

use serde::Deserialize;

use crate::{
    error::{AppResult, config_error},
    indicator::ValueKind
};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub metadata:  MetadataConfig,
    #[serde(default)]
    pub graph:     GraphConfig,
    #[serde(default)]
    pub inference: InferenceConfig
}

/// Metadata alignment configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// System and partition columns dropped before alignment
    pub excluded_columns: Vec<String>,
    /// Column-list file used when no `--metadata` flag is given
    pub file:             Option<PathBuf>
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            excluded_columns: ["dt", "create_time", "update_time"]
                .into_iter()
                .map(String::from)
                .collect(),
            file:             None
        }
    }
}

/// Lineage graph configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Traversal depth when `--depth` is not given
    pub default_depth: usize,
    /// Author recorded on registered edges
    pub created_by:    String
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_depth: 1,
            created_by:    String::from("auto")
        }
    }
}

/// Value-kind naming rule, matched case-insensitively against column names
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ValueKindRule {
    pub pattern: String,
    pub kind:    ValueKind
}

/// Business-domain rule, matched case-insensitively against table names
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DomainRule {
    pub pattern: String,
    pub domain:  String
}

/// Pattern tables for indicator inference
///
/// Rules are evaluated in order and the first match wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub value_kinds:    Vec<ValueKindRule>,
    pub domains:        Vec<DomainRule>,
    pub default_domain: String,
    /// Name token to display-name fragment
    pub display_names:  BTreeMap<String, String>
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let value_kinds = [
            ("amt|amount|money|price|fee", ValueKind::Amount),
            ("cnt|count|num|quantity", ValueKind::Quantity),
            ("rate|ratio|percent|pct", ValueKind::Ratio),
            ("date|time|dt", ValueKind::Time),
            ("avg|mean", ValueKind::Average)
        ]
        .into_iter()
        .map(|(pattern, kind)| ValueKindRule {
            pattern: pattern.to_string(),
            kind
        })
        .collect();

        let domains = [
            ("loan", "loan"),
            ("overdue|repay", "post-loan"),
            ("customer|user", "customer"),
            ("product", "product"),
            ("risk", "risk")
        ]
        .into_iter()
        .map(|(pattern, domain)| DomainRule {
            pattern: pattern.to_string(),
            domain:  domain.to_string()
        })
        .collect();

        let display_names = [
            ("td", "当日"),
            ("loan", "放款"),
            ("amt", "金额"),
            ("cnt", "笔数"),
            ("avg", "平均"),
            ("sum", "总"),
            ("max", "最大"),
            ("min", "最小")
        ]
        .into_iter()
        .map(|(token, name)| (token.to_string(), name.to_string()))
        .collect();

        Self {
            value_kinds,
            domains,
            default_domain: String::from("generic"),
            display_names
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (.sql-lineage.toml)
    /// 3. Config file in home directory (~/.config/sql-lineage/config.toml)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("sql-lineage")
                .join("config.toml");
            if home_config.exists() {
                config = Self::from_file(&home_config)?;
            }
        }

        let local_config = PathBuf::from(".sql-lineage.toml");
        if local_config.exists() {
            config = Self::from_file(&local_config)?;
        }

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Read one TOML config file
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML config text
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    /// Override settings from environment-style lookups
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<()> {
        if let Some(depth) = lookup("SQL_LINEAGE_DEPTH") {
            self.graph.default_depth = depth.trim().parse().map_err(|_| {
                config_error(format!(
                    "SQL_LINEAGE_DEPTH must be a non-negative integer, got '{}'",
                    depth
                ))
            })?;
        }

        if let Some(created_by) = lookup("SQL_LINEAGE_CREATED_BY") {
            self.graph.created_by = created_by;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.graph.default_depth, 1);
        assert_eq!(config.graph.created_by, "auto");
        assert_eq!(
            config.metadata.excluded_columns,
            vec!["dt", "create_time", "update_time"]
        );
        assert_eq!(config.inference.value_kinds.len(), 5);
        assert_eq!(config.inference.value_kinds[0].kind, ValueKind::Amount);
        assert_eq!(config.inference.default_domain, "generic");
        assert_eq!(
            config.inference.display_names.get("td").map(String::as_str),
            Some("当日")
        );
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml_str("[graph]\ndefault_depth = 3\n").unwrap();
        assert_eq!(config.graph.default_depth, 3);
        assert_eq!(config.graph.created_by, "auto");
        assert_eq!(config.metadata.excluded_columns.len(), 3);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(|key| match key {
                "SQL_LINEAGE_DEPTH" => Some("4".to_string()),
                "SQL_LINEAGE_CREATED_BY" => Some("etl-bot".to_string()),
                _ => None
            })
            .unwrap();
        assert_eq!(config.graph.default_depth, 4);
        assert_eq!(config.graph.created_by, "etl-bot");
    }

    #[test]
    fn test_env_invalid_depth() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "SQL_LINEAGE_DEPTH").then(|| "deep".to_string()));
        assert!(result.is_err());
    }
}
