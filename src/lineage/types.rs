use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::{diagnostics::Diagnostic, indicator::Indicator};

/// How a source table participates in the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    #[serde(rename = "FROM")]
    From,
    #[serde(rename = "INNER JOIN")]
    Inner,
    #[serde(rename = "LEFT JOIN")]
    Left,
    #[serde(rename = "RIGHT JOIN")]
    Right,
    #[serde(rename = "FULL JOIN")]
    Full
}

impl JoinKind {
    /// Map a join qualifier keyword to a join kind.
    ///
    /// A missing or unknown qualifier is a plain `JOIN`, which is an inner
    /// join.
    pub fn from_qualifier(qualifier: Option<&str>) -> Self {
        match qualifier.map(|q| q.to_ascii_uppercase()).as_deref() {
            Some("LEFT") => Self::Left,
            Some("RIGHT") => Self::Right,
            Some("FULL") => Self::Full,
            _ => Self::Inner
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::From => "FROM",
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN"
        }
    }
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Origin of a table lineage relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationKind {
    #[default]
    Etl,
    View,
    Manual
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Etl => write!(f, "ETL"),
            Self::View => write!(f, "VIEW"),
            Self::Manual => write!(f, "MANUAL")
        }
    }
}

/// How an output column is computed from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransformKind {
    Direct,
    Sum,
    Count,
    Avg,
    Max,
    Min,
    Case,
    Custom
}

impl TransformKind {
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Self::Sum | Self::Count | Self::Avg | Self::Max | Self::Min
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "DIRECT",
            Self::Sum => "SUM",
            Self::Count => "COUNT",
            Self::Avg => "AVG",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::Case => "CASE",
            Self::Custom => "CUSTOM"
        }
    }
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source table found in a statement (transient edge proposal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLineage {
    pub source_table:   CompactString,
    /// Alias the statement uses for this table, if any
    pub alias:          Option<CompactString>,
    pub join_kind:      JoinKind,
    pub join_condition: Option<String>
}

/// Lineage of one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLineage {
    pub target_column:        CompactString,
    /// Source table with aliases resolved; `None` for unqualified columns
    pub source_table:         Option<CompactString>,
    pub source_column:        Option<CompactString>,
    pub transform_kind:       TransformKind,
    /// Raw expression, kept for every non-direct transform
    pub transform_expression: Option<String>
}

impl ColumnLineage {
    /// Whether source extraction was attempted and found no column.
    ///
    /// `CASE` and `CUSTOM` edges never carry a source, so they are not
    /// counted here.
    pub fn is_unresolved(&self) -> bool {
        self.source_column.is_none()
            && (self.transform_kind == TransformKind::Direct || self.transform_kind.is_aggregate())
    }
}

/// Everything one parse pass learned about a script.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisResult {
    /// Empty when no INSERT target was recognized
    pub target_table:      CompactString,
    pub partition_columns: Vec<CompactString>,
    pub sql_file:          Option<String>,
    pub table_lineage:     Vec<TableLineage>,
    pub column_lineage:    Vec<ColumnLineage>,
    pub indicators:        Vec<Indicator>,
    pub summary:           String,
    pub diagnostics:       Vec<Diagnostic>
}

impl AnalysisResult {
    pub fn has_target(&self) -> bool {
        !self.target_table.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == crate::diagnostics::Severity::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_kind_from_qualifier() {
        assert_eq!(JoinKind::from_qualifier(None), JoinKind::Inner);
        assert_eq!(JoinKind::from_qualifier(Some("left")), JoinKind::Left);
        assert_eq!(JoinKind::from_qualifier(Some("RIGHT")), JoinKind::Right);
        assert_eq!(JoinKind::from_qualifier(Some("Full")), JoinKind::Full);
        assert_eq!(JoinKind::from_qualifier(Some("INNER")), JoinKind::Inner);
        assert_eq!(JoinKind::from_qualifier(Some("CROSS")), JoinKind::Inner);
    }

    #[test]
    fn test_join_kind_serializes_as_sql_text() {
        let json = serde_json::to_string(&JoinKind::Left).unwrap();
        assert_eq!(json, "\"LEFT JOIN\"");
        let parsed: JoinKind = serde_json::from_str("\"FROM\"").unwrap();
        assert_eq!(parsed, JoinKind::From);
    }

    #[test]
    fn test_transform_kind_aggregates() {
        for kind in [
            TransformKind::Sum,
            TransformKind::Count,
            TransformKind::Avg,
            TransformKind::Max,
            TransformKind::Min
        ] {
            assert!(kind.is_aggregate());
        }
        for kind in [
            TransformKind::Direct,
            TransformKind::Case,
            TransformKind::Custom
        ] {
            assert!(!kind.is_aggregate());
        }
        assert_eq!(
            serde_json::to_string(&TransformKind::Custom).unwrap(),
            "\"CUSTOM\""
        );
    }

    #[test]
    fn test_relation_kind_default_is_etl() {
        assert_eq!(RelationKind::default(), RelationKind::Etl);
        assert_eq!(RelationKind::View.to_string(), "VIEW");
    }
}
