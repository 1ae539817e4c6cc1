//! Lineage graph: registration and impact-analysis traversal.
//!
//! # Architecture
//!
//! ```text
//! RegistrationRequest ──▶ LineageGraph::register ──▶ GraphPersistence (write lock, atomic)
//!                                                          │
//! upstream / downstream ◀── BFS over active edges ◀────────┘ (read lock)
//! ```
//!
//! Storage is abstracted by [`GraphPersistence`]; [`MemoryStore`] is the
//! built-in arena implementation and can be snapshotted to JSON.
//!
//! Cycles are allowed in storage. Traversal keeps a visited set keyed by
//! table name, so every table is expanded at most once, at the shallowest
//! depth it was reached.
//!
//! # Example
//!
//! ```
//! use sql_lineage_analyzer::{
//!     graph::{LineageGraph, RegistrationRequest},
//!     lineage::JoinKind
//! };
//!
//! let graph = LineageGraph::new();
//! graph
//!     .register(&RegistrationRequest::new("dm.t", "auto").source("dwd.d", JoinKind::From))
//!     .unwrap();
//! graph
//!     .register(&RegistrationRequest::new("dwd.d", "auto").source("ods.d", JoinKind::From))
//!     .unwrap();
//!
//! let upstream = graph.upstream("dm.t", 2, false).unwrap();
//! assert_eq!(upstream.tables(), vec!["dwd.d", "ods.d"]);
//! ```

mod store;
mod types;

use std::{
    collections::{HashSet, VecDeque},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard}
};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
pub use store::{MemoryStore, StoreSnapshot};
use tracing::{debug, info};
pub use types::{
    ColumnEdgeProposal, ColumnLineageEdge, ColumnRegistration, Direction, EdgeId,
    RegisteredColumnEdge, RegisteredTableEdge, RegistrationReport, RegistrationRequest,
    SourceRegistration, TableEdgeProposal, TableLineageEdge, TraversalResult, TraversedEdge,
    UpsertAction, Upserted
};

use crate::error::{AppResult, invalid_edge_error, storage_error};

/// Storage primitives registration and traversal are built from.
///
/// Lookups only see active table edges. Implementations must reject empty
/// table or column names.
pub trait GraphPersistence: Send + Sync {
    /// Update the active edge for the table pair, or insert a new one.
    fn upsert_table_edge(
        &mut self,
        proposal: &TableEdgeProposal,
        now: DateTime<Utc>
    ) -> AppResult<Upserted>;

    /// Update the column edge with the same four-part key, or insert one.
    fn upsert_column_edge(
        &mut self,
        proposal: &ColumnEdgeProposal,
        parent: Option<EdgeId>,
        now: DateTime<Utc>
    ) -> AppResult<Upserted>;

    fn find_active_edges_by_target(&self, table: &str) -> AppResult<Vec<TableLineageEdge>>;

    fn find_active_edges_by_source(&self, table: &str) -> AppResult<Vec<TableLineageEdge>>;

    fn find_active_edge(&self, target: &str, source: &str) -> AppResult<Option<TableLineageEdge>>;

    /// Column edges for one table pair, active or not.
    fn find_column_edges(&self, target: &str, source: &str) -> AppResult<Vec<ColumnLineageEdge>>;

    /// Soft-delete the active edge for the pair, returning its id.
    fn deactivate_table_edge(
        &mut self,
        target: &str,
        source: &str,
        now: DateTime<Utc>
    ) -> AppResult<Option<EdgeId>>;

    /// Run `f` as one unit: when it fails, the store is left unchanged.
    fn atomically<T, F>(&mut self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Self) -> AppResult<T>,
        Self: Sized;
}

/// Thread-safe lineage graph over a persistence backend.
///
/// Registrations serialize on a write lock; traversals share a read lock.
#[derive(Debug, Default)]
pub struct LineageGraph<S = MemoryStore> {
    store: RwLock<S>
}

impl LineageGraph<MemoryStore> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> AppResult<Self> {
        Ok(Self::with_store(MemoryStore::from_snapshot(snapshot)?))
    }

    pub fn snapshot(&self) -> AppResult<StoreSnapshot> {
        Ok(self.read()?.snapshot())
    }
}

impl<S: GraphPersistence> LineageGraph<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store: RwLock::new(store)
        }
    }

    pub fn into_store(self) -> AppResult<S> {
        self.store
            .into_inner()
            .map_err(|_| storage_error("lineage store lock poisoned"))
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, S>> {
        self.store
            .read()
            .map_err(|_| storage_error("lineage store lock poisoned"))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, S>> {
        self.store
            .write()
            .map_err(|_| storage_error("lineage store lock poisoned"))
    }

    /// Upsert every table and column edge of `request` in one commit.
    ///
    /// Sources with an empty name are ignored. Column entries without a
    /// target column, source table and source column are skipped and
    /// counted. Each column edge is linked to the active table edge for its
    /// table pair when one exists. If any upsert fails nothing is written.
    pub fn register(&self, request: &RegistrationRequest) -> AppResult<RegistrationReport> {
        let target_table = CompactString::from(request.target_table.trim());
        if target_table.is_empty() {
            return Err(invalid_edge_error("target table must not be empty"));
        }
        let now = Utc::now();
        let mut store = self.write()?;

        let report = store.atomically(|store| {
            let mut report = RegistrationReport {
                target_table:    target_table.clone(),
                table_edges:     Vec::new(),
                column_edges:    Vec::new(),
                skipped_columns: 0
            };

            for source in &request.sources {
                let source_table = source.source_table.trim();
                if source_table.is_empty() {
                    continue;
                }
                let proposal = TableEdgeProposal {
                    target_table:   target_table.clone(),
                    source_table:   CompactString::from(source_table),
                    join_kind:      source.join_kind,
                    join_condition: source.join_condition.clone(),
                    relation_kind:  source.relation_kind,
                    created_by:     request.created_by.clone(),
                    script_path:    request.script_path.clone(),
                    logic_summary:  request.logic_summary.clone()
                };
                let upserted = store.upsert_table_edge(&proposal, now)?;
                report.table_edges.push(RegisteredTableEdge {
                    source_table: proposal.source_table,
                    join_kind:    proposal.join_kind,
                    action:       upserted.action,
                    id:           upserted.id
                });
            }

            for column in &request.columns {
                let Some(proposal) = column_proposal(&target_table, column) else {
                    report.skipped_columns += 1;
                    continue;
                };
                let parent = store
                    .find_active_edge(&target_table, &proposal.source_table)?
                    .map(|edge| edge.id);
                let upserted = store.upsert_column_edge(&proposal, parent, now)?;
                report.column_edges.push(RegisteredColumnEdge {
                    target_column:        proposal.target_column,
                    source_table:         proposal.source_table,
                    source_column:        proposal.source_column,
                    action:               upserted.action,
                    id:                   upserted.id,
                    parent_table_edge_id: parent
                });
            }

            Ok(report)
        })?;

        info!(
            target_table = %report.target_table,
            inserted = report.count(UpsertAction::Inserted),
            updated = report.count(UpsertAction::Updated),
            skipped = report.skipped_columns,
            "registered lineage"
        );
        Ok(report)
    }

    /// Soft-delete the active edge `target <- source`.
    ///
    /// Returns whether an active edge existed.
    pub fn deactivate(&self, target: &str, source: &str) -> AppResult<bool> {
        let deactivated = self
            .write()?
            .deactivate_table_edge(target, source, Utc::now())?;
        if let Some(id) = deactivated {
            info!(%id, target_table = target, source_table = source, "deactivated lineage edge");
        }
        Ok(deactivated.is_some())
    }

    /// Tables `table` is built from, up to `depth` hops.
    pub fn upstream(&self, table: &str, depth: usize, with_columns: bool) -> AppResult<TraversalResult> {
        self.traverse(table, depth, with_columns, Direction::Upstream)
    }

    /// Tables built from `table`, up to `depth` hops.
    pub fn downstream(
        &self,
        table: &str,
        depth: usize,
        with_columns: bool
    ) -> AppResult<TraversalResult> {
        self.traverse(table, depth, with_columns, Direction::Downstream)
    }

    fn traverse(
        &self,
        table: &str,
        depth: usize,
        with_columns: bool,
        direction: Direction
    ) -> AppResult<TraversalResult> {
        let store = self.read()?;
        let mut edges = Vec::new();
        let mut visited: HashSet<CompactString> = HashSet::new();
        let mut queue = VecDeque::from([(CompactString::from(table), 0usize)]);

        while let Some((current, level)) = queue.pop_front() {
            if level >= depth || !visited.insert(current.clone()) {
                continue;
            }
            let neighbours = match direction {
                Direction::Upstream => store.find_active_edges_by_target(&current)?,
                Direction::Downstream => store.find_active_edges_by_source(&current)?
            };
            for edge in neighbours {
                if level + 1 < depth {
                    let next = match direction {
                        Direction::Upstream => edge.source_table.clone(),
                        Direction::Downstream => edge.target_table.clone()
                    };
                    queue.push_back((next, level + 1));
                }
                edges.push(TraversedEdge {
                    depth: level + 1,
                    edge
                });
            }
        }

        let column_edges = if with_columns {
            let mut columns = Vec::new();
            for traversed in edges.iter().filter(|e| e.depth == 1) {
                columns.extend(
                    store.find_column_edges(&traversed.edge.target_table, &traversed.edge.source_table)?
                );
            }
            Some(columns)
        } else {
            None
        };

        debug!(table, %direction, depth, edges = edges.len(), "traversed lineage");
        Ok(TraversalResult {
            table: CompactString::from(table),
            direction,
            depth,
            edges,
            column_edges
        })
    }
}

fn column_proposal(target_table: &CompactString, column: &ColumnRegistration) -> Option<ColumnEdgeProposal> {
    let present = |value: Option<&CompactString>| {
        value
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(CompactString::from)
    };
    Some(ColumnEdgeProposal {
        target_table:         target_table.clone(),
        target_column:        present(Some(&column.target_column))?,
        source_table:         present(column.source_table.as_ref())?,
        source_column:        present(column.source_column.as_ref())?,
        transform_kind:       column.transform_kind,
        transform_expression: column
            .transform_expression
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(String::from)
    })
}
