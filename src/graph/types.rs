use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::lineage::{AnalysisResult, JoinKind, RelationKind, TransformKind};

/// Store-assigned edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A persisted table-level dependency: `target_table` is loaded from
/// `source_table`.
///
/// At most one active edge exists per `(target_table, source_table)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLineageEdge {
    pub id:             EdgeId,
    pub target_table:   CompactString,
    pub source_table:   CompactString,
    pub join_kind:      JoinKind,
    pub join_condition: Option<String>,
    pub relation_kind:  RelationKind,
    /// Inactive edges are soft-deleted and never traversed
    pub active:         bool,
    pub created_by:     String,
    pub script_path:    Option<String>,
    pub logic_summary:  Option<String>,
    pub created_at:     DateTime<Utc>,
    pub updated_at:     DateTime<Utc>
}

/// A persisted column-level dependency, unique per
/// `(target_table, target_column, source_table, source_column)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLineageEdge {
    pub id:                   EdgeId,
    pub target_table:         CompactString,
    pub target_column:        CompactString,
    pub source_table:         CompactString,
    pub source_column:        CompactString,
    pub transform_kind:       TransformKind,
    pub transform_expression: Option<String>,
    /// Active table edge for the same table pair at registration time
    pub parent_table_edge_id: Option<EdgeId>,
    pub created_at:           DateTime<Utc>,
    pub updated_at:           DateTime<Utc>
}

/// Fields written by a table edge upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEdgeProposal {
    pub target_table:   CompactString,
    pub source_table:   CompactString,
    pub join_kind:      JoinKind,
    pub join_condition: Option<String>,
    pub relation_kind:  RelationKind,
    pub created_by:     String,
    /// `None` keeps the stored value on update
    pub script_path:    Option<String>,
    /// `None` keeps the stored value on update
    pub logic_summary:  Option<String>
}

/// Fields written by a column edge upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEdgeProposal {
    pub target_table:         CompactString,
    pub target_column:        CompactString,
    pub source_table:         CompactString,
    pub source_column:        CompactString,
    pub transform_kind:       TransformKind,
    pub transform_expression: Option<String>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Inserted,
    Updated
}

impl std::fmt::Display for UpsertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::Updated => write!(f, "updated")
        }
    }
}

/// Outcome of one upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Upserted {
    pub action: UpsertAction,
    pub id:     EdgeId
}

/// One source of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRegistration {
    pub source_table:   CompactString,
    pub join_kind:      JoinKind,
    #[serde(default)]
    pub join_condition: Option<String>,
    #[serde(default)]
    pub relation_kind:  RelationKind
}

/// One column dependency of a registration.
///
/// Entries missing a target column, source table or source column are
/// skipped at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRegistration {
    pub target_column:        CompactString,
    pub source_table:         Option<CompactString>,
    pub source_column:        Option<CompactString>,
    pub transform_kind:       TransformKind,
    #[serde(default)]
    pub transform_expression: Option<String>
}

/// Everything registered for one target table in one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub target_table:  CompactString,
    pub sources:       Vec<SourceRegistration>,
    #[serde(default)]
    pub columns:       Vec<ColumnRegistration>,
    pub created_by:    String,
    #[serde(default)]
    pub script_path:   Option<String>,
    #[serde(default)]
    pub logic_summary: Option<String>
}

impl RegistrationRequest {
    pub fn new(target_table: &str, created_by: &str) -> Self {
        Self {
            target_table:  CompactString::from(target_table),
            sources:       Vec::new(),
            columns:       Vec::new(),
            created_by:    created_by.to_string(),
            script_path:   None,
            logic_summary: None
        }
    }

    pub fn source(mut self, table: &str, join_kind: JoinKind) -> Self {
        self.sources.push(SourceRegistration {
            source_table: CompactString::from(table),
            join_kind,
            join_condition: None,
            relation_kind: RelationKind::default()
        });
        self
    }

    pub fn column(
        mut self,
        target_column: &str,
        source_table: &str,
        source_column: &str,
        transform_kind: TransformKind
    ) -> Self {
        self.columns.push(ColumnRegistration {
            target_column: CompactString::from(target_column),
            source_table: Some(CompactString::from(source_table)),
            source_column: Some(CompactString::from(source_column)),
            transform_kind,
            transform_expression: None
        });
        self
    }

    /// Registration of everything one parse pass found, as an ETL relation.
    pub fn from_analysis(result: &AnalysisResult, created_by: &str) -> Self {
        Self {
            target_table:  result.target_table.clone(),
            sources:       result
                .table_lineage
                .iter()
                .map(|t| SourceRegistration {
                    source_table:   t.source_table.clone(),
                    join_kind:      t.join_kind,
                    join_condition: t.join_condition.clone(),
                    relation_kind:  RelationKind::Etl
                })
                .collect(),
            columns:       result
                .column_lineage
                .iter()
                .map(|c| ColumnRegistration {
                    target_column:        c.target_column.clone(),
                    source_table:         c.source_table.clone(),
                    source_column:        c.source_column.clone(),
                    transform_kind:       c.transform_kind,
                    transform_expression: c.transform_expression.clone()
                })
                .collect(),
            created_by:    created_by.to_string(),
            script_path:   result.sql_file.clone(),
            logic_summary: (!result.summary.is_empty()).then(|| result.summary.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredTableEdge {
    pub source_table: CompactString,
    pub join_kind:    JoinKind,
    pub action:       UpsertAction,
    pub id:           EdgeId
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredColumnEdge {
    pub target_column:        CompactString,
    pub source_table:         CompactString,
    pub source_column:        CompactString,
    pub action:               UpsertAction,
    pub id:                   EdgeId,
    pub parent_table_edge_id: Option<EdgeId>
}

/// Audit trail of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub target_table:    CompactString,
    pub table_edges:     Vec<RegisteredTableEdge>,
    pub column_edges:    Vec<RegisteredColumnEdge>,
    /// Column entries dropped for lacking a resolved source
    pub skipped_columns: usize
}

impl RegistrationReport {
    pub fn count(&self, action: UpsertAction) -> usize {
        self.table_edges.iter().filter(|e| e.action == action).count()
            + self.column_edges.iter().filter(|e| e.action == action).count()
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow target to source: what a table is built from
    Upstream,
    /// Follow source to target: what is built from a table
    Downstream
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream => write!(f, "upstream"),
            Self::Downstream => write!(f, "downstream")
        }
    }
}

/// A table edge reached by traversal, with the hop it was found at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversedEdge {
    /// 1 for edges touching the queried table
    pub depth: usize,
    #[serde(flatten)]
    pub edge:  TableLineageEdge
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalResult {
    pub table:        CompactString,
    pub direction:    Direction,
    pub depth:        usize,
    pub edges:        Vec<TraversedEdge>,
    /// Present only when column lineage was requested
    pub column_edges: Option<Vec<ColumnLineageEdge>>
}

impl TraversalResult {
    /// Distinct tables reached, in discovery order.
    pub fn tables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for traversed in &self.edges {
            let table = match self.direction {
                Direction::Upstream => traversed.edge.source_table.as_str(),
                Direction::Downstream => traversed.edge.target_table.as_str()
            };
            if !seen.contains(&table) {
                seen.push(table);
            }
        }
        seen
    }
}
