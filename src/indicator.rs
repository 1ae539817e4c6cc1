//! Candidate business-metric records derived from column lineage.
//!
//! Every non-`DIRECT` column edge becomes an [`Indicator`] whose kind,
//! category, domain and physical type are inferred from naming patterns.
//! The patterns live in [`InferenceTables`], compiled once from
//! configuration and handed to the [`IndicatorDeriver`] at construction.
//!
//! Display names are a token-by-token dictionary transliteration and are
//! always marked unconfirmed.

use std::collections::BTreeMap;

use compact_str::CompactString;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    config::InferenceConfig,
    error::{AppResult, config_error},
    lineage::{ColumnLineage, TransformKind}
};

/// What an indicator measures, inferred from the column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Amount,
    Quantity,
    Ratio,
    Time,
    Average
}

impl ValueKind {
    /// Storage type suggested for the indicator column.
    pub fn physical_type(&self) -> &'static str {
        match self {
            Self::Amount | Self::Average => "DECIMAL(20,2)",
            Self::Quantity | Self::Ratio => "BIGINT",
            Self::Time => "VARCHAR(255)"
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::Quantity => "quantity",
            Self::Ratio => "ratio",
            Self::Time => "time",
            Self::Average => "average"
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorCategory {
    /// A single aggregate over a source column
    Atomic,
    /// Computed by `CASE` or arbitrary expressions
    Derived,
    /// Reserved for transform kinds that combine other indicators
    Composite
}

impl IndicatorCategory {
    pub fn from_transform(kind: TransformKind) -> Self {
        match kind {
            k if k.is_aggregate() => Self::Atomic,
            TransformKind::Case | TransformKind::Custom => Self::Derived,
            _ => Self::Composite
        }
    }
}

impl std::fmt::Display for IndicatorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Atomic => write!(f, "atomic"),
            Self::Derived => write!(f, "derived"),
            Self::Composite => write!(f, "composite")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateFrequency {
    Hourly,
    Daily,
    Monthly
}

impl UpdateFrequency {
    /// Infer the refresh cadence from the target's partition columns.
    pub fn from_partition_columns(columns: &[CompactString]) -> Self {
        let has = |needle: &str| {
            columns
                .iter()
                .any(|c| c.to_ascii_lowercase().contains(needle))
        };
        if has("hour") {
            Self::Hourly
        } else if has("month") {
            Self::Monthly
        } else {
            Self::Daily
        }
    }
}

impl std::fmt::Display for UpdateFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
            Self::Monthly => write!(f, "monthly")
        }
    }
}

/// Candidate business metric for one aggregated or derived column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    pub english_name:           CompactString,
    pub display_name:           String,
    /// Always false at extraction time; a person confirms display names
    pub display_name_confirmed: bool,
    pub calculation_expression: String,
    pub value_kind:             ValueKind,
    pub category:               IndicatorCategory,
    pub business_domain:        CompactString,
    pub physical_type:          &'static str,
    pub update_frequency:       UpdateFrequency
}

/// Compiled, immutable pattern tables.
#[derive(Debug, Clone)]
pub struct InferenceTables {
    value_kinds:    Vec<(Regex, ValueKind)>,
    domains:        Vec<(Regex, CompactString)>,
    default_domain: CompactString,
    display_names:  BTreeMap<String, String>
}

impl Default for InferenceTables {
    fn default() -> Self {
        Self::from_config(&InferenceConfig::default()).expect("default inference patterns are valid")
    }
}

impl InferenceTables {
    /// Compile configured patterns; an invalid pattern is a config error.
    pub fn from_config(config: &InferenceConfig) -> AppResult<Self> {
        let value_kinds = config
            .value_kinds
            .iter()
            .map(|rule| Ok((compile(&rule.pattern)?, rule.kind)))
            .collect::<AppResult<Vec<_>>>()?;
        let domains = config
            .domains
            .iter()
            .map(|rule| Ok((compile(&rule.pattern)?, CompactString::from(rule.domain.as_str()))))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self {
            value_kinds,
            domains,
            default_domain: CompactString::from(config.default_domain.as_str()),
            display_names: config
                .display_names
                .iter()
                .map(|(token, name)| (token.to_ascii_lowercase(), name.clone()))
                .collect()
        })
    }

    /// First matching value-kind rule for a column name, default quantity.
    pub fn value_kind(&self, column: &str) -> ValueKind {
        self.value_kinds
            .iter()
            .find(|(regex, _)| regex.is_match(column))
            .map_or(ValueKind::Quantity, |(_, kind)| *kind)
    }

    /// First matching domain rule for a table name.
    pub fn business_domain(&self, table: &str) -> CompactString {
        self.domains
            .iter()
            .find(|(regex, _)| regex.is_match(table))
            .map_or_else(|| self.default_domain.clone(), |(_, domain)| domain.clone())
    }

    /// Token-by-token transliteration; unknown tokens become `[token]`.
    pub fn display_name(&self, column: &str) -> String {
        column
            .to_ascii_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(|token| match self.display_names.get(token) {
                Some(name) => name.clone(),
                None => format!("[{}]", token)
            })
            .collect()
    }
}

fn compile(pattern: &str) -> AppResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| config_error(format!("Invalid inference pattern '{}': {}", pattern, e)))
}

/// Turns column lineage into indicator candidates.
#[derive(Debug, Clone, Default)]
pub struct IndicatorDeriver {
    tables: InferenceTables
}

impl IndicatorDeriver {
    pub fn new(tables: InferenceTables) -> Self {
        Self {
            tables
        }
    }

    /// One indicator per non-`DIRECT` edge, in edge order.
    pub fn derive(
        &self,
        target_table: &str,
        partition_columns: &[CompactString],
        columns: &[ColumnLineage]
    ) -> Vec<Indicator> {
        let business_domain = self.tables.business_domain(target_table);
        let update_frequency = UpdateFrequency::from_partition_columns(partition_columns);

        columns
            .iter()
            .filter(|c| c.transform_kind != TransformKind::Direct)
            .map(|column| {
                let value_kind = self.tables.value_kind(&column.target_column);
                Indicator {
                    english_name: column.target_column.clone(),
                    display_name: self.tables.display_name(&column.target_column),
                    display_name_confirmed: false,
                    calculation_expression: column
                        .transform_expression
                        .clone()
                        .unwrap_or_else(|| column.target_column.to_string()),
                    value_kind,
                    category: IndicatorCategory::from_transform(column.transform_kind),
                    business_domain: business_domain.clone(),
                    physical_type: value_kind.physical_type(),
                    update_frequency
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DomainRule, ValueKindRule};

    fn column(name: &str, kind: TransformKind, expr: Option<&str>) -> ColumnLineage {
        ColumnLineage {
            target_column:        name.into(),
            source_table:         Some("dwd.d".into()),
            source_column:        Some("amt".into()),
            transform_kind:       kind,
            transform_expression: expr.map(String::from)
        }
    }

    #[test]
    fn test_value_kind_first_match_wins() {
        let tables = InferenceTables::default();
        assert_eq!(tables.value_kind("td_loan_amt"), ValueKind::Amount);
        assert_eq!(tables.value_kind("order_cnt"), ValueKind::Quantity);
        assert_eq!(tables.value_kind("overdue_RATE"), ValueKind::Ratio);
        assert_eq!(tables.value_kind("last_repay_date"), ValueKind::Time);
        assert_eq!(tables.value_kind("mean_score"), ValueKind::Average);
        assert_eq!(tables.value_kind("avg_amt"), ValueKind::Amount);
        assert_eq!(tables.value_kind("flag"), ValueKind::Quantity);
    }

    #[test]
    fn test_physical_type() {
        assert_eq!(ValueKind::Amount.physical_type(), "DECIMAL(20,2)");
        assert_eq!(ValueKind::Average.physical_type(), "DECIMAL(20,2)");
        assert_eq!(ValueKind::Ratio.physical_type(), "BIGINT");
        assert_eq!(ValueKind::Time.physical_type(), "VARCHAR(255)");
    }

    #[test]
    fn test_business_domain() {
        let tables = InferenceTables::default();
        assert_eq!(tables.business_domain("dm.loan_daily"), "loan");
        assert_eq!(tables.business_domain("dm.overdue_stat"), "post-loan");
        assert_eq!(tables.business_domain("dm.USER_profile"), "customer");
        assert_eq!(tables.business_domain("dm.t"), "generic");
    }

    #[test]
    fn test_display_name_transliteration() {
        let tables = InferenceTables::default();
        assert_eq!(tables.display_name("td_loan_amt"), "当日放款金额");
        assert_eq!(tables.display_name("td_xyz"), "当日[xyz]");
    }

    #[test]
    fn test_display_name_keeps_digits_in_tokens() {
        let tables = InferenceTables::default();
        assert_eq!(tables.display_name("m1_overdue_amt"), "[m1][overdue]金额");
        assert_eq!(tables.display_name("amt_30d"), "金额[30d]");
        assert_eq!(tables.display_name("TD__Amt"), "当日金额");
    }

    #[test]
    fn test_category() {
        assert_eq!(
            IndicatorCategory::from_transform(TransformKind::Sum),
            IndicatorCategory::Atomic
        );
        assert_eq!(
            IndicatorCategory::from_transform(TransformKind::Case),
            IndicatorCategory::Derived
        );
        assert_eq!(
            IndicatorCategory::from_transform(TransformKind::Direct),
            IndicatorCategory::Composite
        );
    }

    #[test]
    fn test_update_frequency() {
        assert_eq!(
            UpdateFrequency::from_partition_columns(&["dt".into(), "hour".into()]),
            UpdateFrequency::Hourly
        );
        assert_eq!(
            UpdateFrequency::from_partition_columns(&["stat_month".into()]),
            UpdateFrequency::Monthly
        );
        assert_eq!(
            UpdateFrequency::from_partition_columns(&[]),
            UpdateFrequency::Daily
        );
    }

    #[test]
    fn test_derive_skips_direct() {
        let deriver = IndicatorDeriver::default();
        let columns = vec![
            column("dt", TransformKind::Direct, None),
            column("td_amt", TransformKind::Sum, Some("SUM(a.amt)")),
            column("flag", TransformKind::Case, Some("CASE WHEN x THEN 1 END")),
        ];
        let indicators = deriver.derive("dm.loan_stat", &["dt".into()], &columns);
        assert_eq!(indicators.len(), 2);

        let first = &indicators[0];
        assert_eq!(first.english_name, "td_amt");
        assert_eq!(first.calculation_expression, "SUM(a.amt)");
        assert_eq!(first.value_kind, ValueKind::Amount);
        assert_eq!(first.category, IndicatorCategory::Atomic);
        assert_eq!(first.business_domain, "loan");
        assert_eq!(first.update_frequency, UpdateFrequency::Daily);
        assert!(!first.display_name_confirmed);

        assert_eq!(indicators[1].category, IndicatorCategory::Derived);
    }

    #[test]
    fn test_expression_falls_back_to_column_name() {
        let deriver = IndicatorDeriver::default();
        let indicators = deriver.derive(
            "t",
            &[],
            &[column("x_cnt", TransformKind::Count, None)]
        );
        assert_eq!(indicators[0].calculation_expression, "x_cnt");
    }

    #[test]
    fn test_custom_tables() {
        let config = InferenceConfig {
            value_kinds:    vec![ValueKindRule {
                pattern: "^bal".to_string(),
                kind:    ValueKind::Amount
            }],
            domains:        vec![DomainRule {
                pattern: "card".to_string(),
                domain:  "cards".to_string()
            }],
            default_domain: "other".to_string(),
            display_names:  BTreeMap::new()
        };
        let tables = InferenceTables::from_config(&config).unwrap();
        assert_eq!(tables.value_kind("BALANCE"), ValueKind::Amount);
        assert_eq!(tables.value_kind("amt"), ValueKind::Quantity);
        assert_eq!(tables.business_domain("dm.card_txn"), "cards");
        assert_eq!(tables.business_domain("dm.loan"), "other");
        assert_eq!(tables.display_name("td"), "[td]");
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = InferenceConfig {
            value_kinds: vec![ValueKindRule {
                pattern: "(".to_string(),
                kind:    ValueKind::Amount
            }],
            ..InferenceConfig::default()
        };
        assert!(InferenceTables::from_config(&config).is_err());
    }
}
