//! In-memory arena store.
//!
//! Table names are interned into an [`IndexSet`] and referred to by index.
//! Edges live in append-only vectors (nothing is ever hard-deleted, so an
//! edge's id is its position plus one) and are reached through adjacency
//! lists keyed by table index.
//!
//! ```text
//! tables:     ["dm.t", "dwd.d", "dim.p"]          name  <-> TableIdx
//! edges:      [e0: dm.t<-dwd.d, e1: dm.t<-dim.p]
//! by_target:  [ [0, 1], [], [] ]                  TableIdx -> edge indices
//! by_source:  [ [], [0], [1] ]
//! active:     {(0, 1): 0, (0, 2): 1}              (target, source) -> edge
//! ```
//!
//! [`GraphPersistence::atomically`] keeps an undo journal while it runs: the
//! lengths of the append-only parts plus the prior state of every edge it
//! mutates. Rolling back undoes only what the failed unit touched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{
    GraphPersistence,
    types::{
        ColumnEdgeProposal, ColumnLineageEdge, EdgeId, TableEdgeProposal, TableLineageEdge,
        UpsertAction, Upserted
    }
};
use crate::error::{AppResult, invalid_edge_error, storage_error};

type TableIdx = usize;
type EdgeList = SmallVec<[usize; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ColumnKey {
    target:        TableIdx,
    target_column: CompactString,
    source:        TableIdx,
    source_column: CompactString
}

/// Serializable content of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub table_edges:  Vec<TableLineageEdge>,
    pub column_edges: Vec<ColumnLineageEdge>
}

/// Undo log of the unit of work in progress.
#[derive(Debug, Clone, Default)]
struct Journal {
    tables:        usize,
    table_edges:   usize,
    column_edges:  usize,
    /// Prior values of pre-existing edges, in mutation order
    table_before:  Vec<(usize, TableLineageEdge)>,
    column_before: Vec<(usize, ColumnLineageEdge)>,
    deactivated:   Vec<((TableIdx, TableIdx), usize)>
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables:       IndexSet<CompactString>,
    table_edges:  Vec<TableLineageEdge>,
    column_edges: Vec<ColumnLineageEdge>,
    by_target:    Vec<EdgeList>,
    by_source:    Vec<EdgeList>,
    active:       HashMap<(TableIdx, TableIdx), usize>,
    column_index: HashMap<ColumnKey, usize>,
    column_pairs: HashMap<(TableIdx, TableIdx), EdgeList>,
    journal:      Option<Journal>
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_edge_count(&self) -> usize {
        self.table_edges.len()
    }

    pub fn column_edge_count(&self) -> usize {
        self.column_edges.len()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            table_edges:  self.table_edges.clone(),
            column_edges: self.column_edges.clone()
        }
    }

    /// Rebuild a store and its indexes from a snapshot.
    ///
    /// Fails when ids are not sequential or two active edges share a key.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> AppResult<Self> {
        let mut store = Self::new();
        for edge in snapshot.table_edges {
            let expected = EdgeId(store.table_edges.len() as u64 + 1);
            if edge.id != expected {
                return Err(storage_error(format!(
                    "table edge {} out of sequence, expected {}",
                    edge.id, expected
                )));
            }
            let target = store.intern(&edge.target_table);
            let source = store.intern(&edge.source_table);
            let idx = store.table_edges.len();
            if edge.active && store.active.insert((target, source), idx).is_some() {
                return Err(storage_error(format!(
                    "duplicate active edge {} <- {}",
                    edge.target_table, edge.source_table
                )));
            }
            store.by_target[target].push(idx);
            store.by_source[source].push(idx);
            store.table_edges.push(edge);
        }
        for edge in snapshot.column_edges {
            let expected = EdgeId(store.column_edges.len() as u64 + 1);
            if edge.id != expected {
                return Err(storage_error(format!(
                    "column edge {} out of sequence, expected {}",
                    edge.id, expected
                )));
            }
            let key = store.column_key(
                &edge.target_table,
                &edge.target_column,
                &edge.source_table,
                &edge.source_column
            );
            let idx = store.column_edges.len();
            if store.column_index.insert(key.clone(), idx).is_some() {
                return Err(storage_error(format!(
                    "duplicate column edge {}.{} <- {}.{}",
                    edge.target_table, edge.target_column, edge.source_table, edge.source_column
                )));
            }
            store
                .column_pairs
                .entry((key.target, key.source))
                .or_default()
                .push(idx);
            store.column_edges.push(edge);
        }
        Ok(store)
    }

    fn intern(&mut self, table: &str) -> TableIdx {
        let (idx, inserted) = self.tables.insert_full(CompactString::from(table));
        if inserted {
            self.by_target.push(EdgeList::new());
            self.by_source.push(EdgeList::new());
        }
        idx
    }

    fn lookup(&self, table: &str) -> Option<TableIdx> {
        self.tables.get_index_of(table)
    }

    fn column_key(
        &mut self,
        target: &str,
        target_column: &str,
        source: &str,
        source_column: &str
    ) -> ColumnKey {
        ColumnKey {
            target:        self.intern(target),
            target_column: CompactString::from(target_column),
            source:        self.intern(source),
            source_column: CompactString::from(source_column)
        }
    }

    fn record_table_edge(&mut self, idx: usize) {
        if let Some(journal) = &mut self.journal
            && idx < journal.table_edges
        {
            journal.table_before.push((idx, self.table_edges[idx].clone()));
        }
    }

    fn record_column_edge(&mut self, idx: usize) {
        if let Some(journal) = &mut self.journal
            && idx < journal.column_edges
        {
            journal.column_before.push((idx, self.column_edges[idx].clone()));
        }
    }

    /// Undo everything recorded in `journal`.
    ///
    /// Appended edges are unlinked from the indexes before the tables they
    /// introduced are dropped, so lookups by name still resolve while
    /// unlinking.
    fn rollback(&mut self, journal: Journal) {
        let table_base = journal.table_edges;
        for idx in (table_base..self.table_edges.len()).rev() {
            let edge = &self.table_edges[idx];
            let (Some(target), Some(source)) =
                (self.lookup(&edge.target_table), self.lookup(&edge.source_table))
            else {
                continue;
            };
            self.by_target[target].retain(|i| *i < table_base);
            self.by_source[source].retain(|i| *i < table_base);
            if self.active.get(&(target, source)) == Some(&idx) {
                self.active.remove(&(target, source));
            }
        }
        self.table_edges.truncate(table_base);
        for (key, idx) in journal.deactivated {
            if idx < table_base {
                self.active.insert(key, idx);
            }
        }

        let column_base = journal.column_edges;
        for idx in (column_base..self.column_edges.len()).rev() {
            let edge = &self.column_edges[idx];
            let (Some(target), Some(source)) =
                (self.lookup(&edge.target_table), self.lookup(&edge.source_table))
            else {
                continue;
            };
            let key = ColumnKey {
                target,
                target_column: edge.target_column.clone(),
                source,
                source_column: edge.source_column.clone()
            };
            self.column_index.remove(&key);
            if let Some(pairs) = self.column_pairs.get_mut(&(target, source)) {
                pairs.retain(|i| *i < column_base);
                if pairs.is_empty() {
                    self.column_pairs.remove(&(target, source));
                }
            }
        }
        self.column_edges.truncate(column_base);

        for (idx, edge) in journal.table_before.into_iter().rev() {
            self.table_edges[idx] = edge;
        }
        for (idx, edge) in journal.column_before.into_iter().rev() {
            self.column_edges[idx] = edge;
        }

        self.tables.truncate(journal.tables);
        self.by_target.truncate(journal.tables);
        self.by_source.truncate(journal.tables);
    }

    fn active_edges(&self, edges: &[usize]) -> Vec<TableLineageEdge> {
        edges
            .iter()
            .map(|&idx| &self.table_edges[idx])
            .filter(|edge| edge.active)
            .cloned()
            .collect()
    }
}

fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(invalid_edge_error(format!("{} must not be empty", field)));
    }
    Ok(())
}

impl GraphPersistence for MemoryStore {
    fn upsert_table_edge(
        &mut self,
        proposal: &TableEdgeProposal,
        now: DateTime<Utc>
    ) -> AppResult<Upserted> {
        require("target table", &proposal.target_table)?;
        require("source table", &proposal.source_table)?;

        let target = self.intern(&proposal.target_table);
        let source = self.intern(&proposal.source_table);

        if let Some(&idx) = self.active.get(&(target, source)) {
            self.record_table_edge(idx);
            let edge = &mut self.table_edges[idx];
            edge.join_kind = proposal.join_kind;
            edge.join_condition = proposal.join_condition.clone();
            edge.relation_kind = proposal.relation_kind;
            if let Some(path) = &proposal.script_path {
                edge.script_path = Some(path.clone());
            }
            if let Some(summary) = &proposal.logic_summary {
                edge.logic_summary = Some(summary.clone());
            }
            edge.updated_at = now;
            return Ok(Upserted {
                action: UpsertAction::Updated,
                id:     edge.id
            });
        }

        let idx = self.table_edges.len();
        let id = EdgeId(idx as u64 + 1);
        self.table_edges.push(TableLineageEdge {
            id,
            target_table: proposal.target_table.clone(),
            source_table: proposal.source_table.clone(),
            join_kind: proposal.join_kind,
            join_condition: proposal.join_condition.clone(),
            relation_kind: proposal.relation_kind,
            active: true,
            created_by: proposal.created_by.clone(),
            script_path: proposal.script_path.clone(),
            logic_summary: proposal.logic_summary.clone(),
            created_at: now,
            updated_at: now
        });
        self.by_target[target].push(idx);
        self.by_source[source].push(idx);
        self.active.insert((target, source), idx);
        Ok(Upserted {
            action: UpsertAction::Inserted,
            id
        })
    }

    fn upsert_column_edge(
        &mut self,
        proposal: &ColumnEdgeProposal,
        parent: Option<EdgeId>,
        now: DateTime<Utc>
    ) -> AppResult<Upserted> {
        require("target table", &proposal.target_table)?;
        require("target column", &proposal.target_column)?;
        require("source table", &proposal.source_table)?;
        require("source column", &proposal.source_column)?;

        let key = self.column_key(
            &proposal.target_table,
            &proposal.target_column,
            &proposal.source_table,
            &proposal.source_column
        );

        if let Some(&idx) = self.column_index.get(&key) {
            self.record_column_edge(idx);
            let edge = &mut self.column_edges[idx];
            edge.transform_kind = proposal.transform_kind;
            edge.transform_expression = proposal.transform_expression.clone();
            edge.parent_table_edge_id = parent;
            edge.updated_at = now;
            return Ok(Upserted {
                action: UpsertAction::Updated,
                id:     edge.id
            });
        }

        let idx = self.column_edges.len();
        let id = EdgeId(idx as u64 + 1);
        self.column_edges.push(ColumnLineageEdge {
            id,
            target_table: proposal.target_table.clone(),
            target_column: proposal.target_column.clone(),
            source_table: proposal.source_table.clone(),
            source_column: proposal.source_column.clone(),
            transform_kind: proposal.transform_kind,
            transform_expression: proposal.transform_expression.clone(),
            parent_table_edge_id: parent,
            created_at: now,
            updated_at: now
        });
        self.column_pairs
            .entry((key.target, key.source))
            .or_default()
            .push(idx);
        self.column_index.insert(key, idx);
        Ok(Upserted {
            action: UpsertAction::Inserted,
            id
        })
    }

    fn find_active_edges_by_target(&self, table: &str) -> AppResult<Vec<TableLineageEdge>> {
        Ok(self
            .lookup(table)
            .map(|idx| self.active_edges(&self.by_target[idx]))
            .unwrap_or_default())
    }

    fn find_active_edges_by_source(&self, table: &str) -> AppResult<Vec<TableLineageEdge>> {
        Ok(self
            .lookup(table)
            .map(|idx| self.active_edges(&self.by_source[idx]))
            .unwrap_or_default())
    }

    fn find_active_edge(&self, target: &str, source: &str) -> AppResult<Option<TableLineageEdge>> {
        let (Some(target), Some(source)) = (self.lookup(target), self.lookup(source)) else {
            return Ok(None);
        };
        Ok(self
            .active
            .get(&(target, source))
            .map(|&idx| self.table_edges[idx].clone()))
    }

    fn find_column_edges(&self, target: &str, source: &str) -> AppResult<Vec<ColumnLineageEdge>> {
        let (Some(target), Some(source)) = (self.lookup(target), self.lookup(source)) else {
            return Ok(Vec::new());
        };
        Ok(self
            .column_pairs
            .get(&(target, source))
            .map(|edges| {
                edges
                    .iter()
                    .map(|&idx| self.column_edges[idx].clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn deactivate_table_edge(
        &mut self,
        target: &str,
        source: &str,
        now: DateTime<Utc>
    ) -> AppResult<Option<EdgeId>> {
        let (Some(target), Some(source)) = (self.lookup(target), self.lookup(source)) else {
            return Ok(None);
        };
        let Some(idx) = self.active.remove(&(target, source)) else {
            return Ok(None);
        };
        self.record_table_edge(idx);
        if let Some(journal) = &mut self.journal {
            journal.deactivated.push(((target, source), idx));
        }
        let edge = &mut self.table_edges[idx];
        edge.active = false;
        edge.updated_at = now;
        Ok(Some(edge.id))
    }

    fn atomically<T, F>(&mut self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Self) -> AppResult<T>
    {
        if self.journal.is_some() {
            return f(self);
        }
        self.journal = Some(Journal {
            tables: self.tables.len(),
            table_edges: self.table_edges.len(),
            column_edges: self.column_edges.len(),
            ..Journal::default()
        });
        let outcome = f(self);
        let journal = self.journal.take().unwrap_or_default();
        if outcome.is_err() {
            self.rollback(journal);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::{JoinKind, RelationKind, TransformKind};

    fn table(target: &str, source: &str) -> TableEdgeProposal {
        TableEdgeProposal {
            target_table:   target.into(),
            source_table:   source.into(),
            join_kind:      JoinKind::From,
            join_condition: None,
            relation_kind:  RelationKind::Etl,
            created_by:     "test".to_string(),
            script_path:    None,
            logic_summary:  None
        }
    }

    fn column(target_column: &str, source_column: &str) -> ColumnEdgeProposal {
        ColumnEdgeProposal {
            target_table:         "dm.t".into(),
            target_column:        target_column.into(),
            source_table:         "dwd.d".into(),
            source_column:        source_column.into(),
            transform_kind:       TransformKind::Direct,
            transform_expression: None
        }
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let first = store.upsert_table_edge(&table("dm.t", "dwd.d"), now).unwrap();
        let mut changed = table("dm.t", "dwd.d");
        changed.join_kind = JoinKind::Left;
        let second = store.upsert_table_edge(&changed, now).unwrap();

        assert_eq!(first.action, UpsertAction::Inserted);
        assert_eq!(second.action, UpsertAction::Updated);
        assert_eq!(first.id, second.id);
        assert_eq!(store.table_edge_count(), 1);
        let edge = store.find_active_edge("dm.t", "dwd.d").unwrap().unwrap();
        assert_eq!(edge.join_kind, JoinKind::Left);
    }

    #[test]
    fn test_optional_fields_coalesce() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let mut first = table("dm.t", "dwd.d");
        first.script_path = Some("etl/t.sql".to_string());
        first.logic_summary = Some("v1".to_string());
        store.upsert_table_edge(&first, now).unwrap();

        let mut second = table("dm.t", "dwd.d");
        second.logic_summary = Some("v2".to_string());
        store.upsert_table_edge(&second, now).unwrap();

        let edge = store.find_active_edge("dm.t", "dwd.d").unwrap().unwrap();
        assert_eq!(edge.script_path.as_deref(), Some("etl/t.sql"));
        assert_eq!(edge.logic_summary.as_deref(), Some("v2"));
    }

    #[test]
    fn test_deactivated_edge_is_hidden_and_reinserted() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let first = store.upsert_table_edge(&table("dm.t", "dwd.d"), now).unwrap();
        assert_eq!(
            store.deactivate_table_edge("dm.t", "dwd.d", now).unwrap(),
            Some(first.id)
        );
        assert!(store.find_active_edges_by_target("dm.t").unwrap().is_empty());
        assert!(store.find_active_edges_by_source("dwd.d").unwrap().is_empty());
        assert_eq!(store.deactivate_table_edge("dm.t", "dwd.d", now).unwrap(), None);

        let again = store.upsert_table_edge(&table("dm.t", "dwd.d"), now).unwrap();
        assert_eq!(again.action, UpsertAction::Inserted);
        assert_ne!(again.id, first.id);
        assert_eq!(store.table_edge_count(), 2);
    }

    #[test]
    fn test_column_edge_key() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let a = store.upsert_column_edge(&column("x", "a"), None, now).unwrap();
        let b = store.upsert_column_edge(&column("x", "b"), None, now).unwrap();
        let a2 = store
            .upsert_column_edge(&column("x", "a"), Some(EdgeId(1)), now)
            .unwrap();
        assert_eq!(a.action, UpsertAction::Inserted);
        assert_eq!(b.action, UpsertAction::Inserted);
        assert_eq!(a2.action, UpsertAction::Updated);
        assert_eq!(a2.id, a.id);
        assert_eq!(store.column_edge_count(), 2);

        let edges = store.find_column_edges("dm.t", "dwd.d").unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].parent_table_edge_id, Some(EdgeId(1)));
    }

    #[test]
    fn test_empty_names_rejected() {
        let mut store = MemoryStore::new();
        assert!(store.upsert_table_edge(&table(" ", "s"), Utc::now()).is_err());
        assert!(
            store
                .upsert_column_edge(&column("", "a"), None, Utc::now())
                .is_err()
        );
        assert_eq!(store.table_edge_count(), 0);
    }

    #[test]
    fn test_atomically_rolls_back() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let result: AppResult<()> = store.atomically(|s| {
            s.upsert_table_edge(&table("dm.t", "dwd.d"), now)?;
            s.upsert_table_edge(&table("dm.t", ""), now)?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(store.table_edge_count(), 0);
        assert!(store.find_active_edge("dm.t", "dwd.d").unwrap().is_none());
    }

    #[test]
    fn test_atomically_restores_updates_and_deactivations() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        store.upsert_table_edge(&table("dm.t", "dwd.d"), now).unwrap();
        store.upsert_table_edge(&table("dm.t", "dim.p"), now).unwrap();
        store.upsert_column_edge(&column("x", "a"), None, now).unwrap();
        let before = store.snapshot();

        let later = now + chrono::Duration::seconds(60);
        let result: AppResult<()> = store.atomically(|s| {
            let mut changed = table("dm.t", "dwd.d");
            changed.join_kind = JoinKind::Left;
            s.upsert_table_edge(&changed, later)?;
            s.deactivate_table_edge("dm.t", "dim.p", later)?;
            s.upsert_table_edge(&table("dm.t", "dim.p"), later)?;
            s.upsert_table_edge(&table("ads.new", "dm.t"), later)?;
            let mut retyped = column("x", "a");
            retyped.transform_kind = TransformKind::Sum;
            s.upsert_column_edge(&retyped, None, later)?;
            s.upsert_column_edge(&column("y", "b"), None, later)?;
            s.upsert_column_edge(&column("", "c"), None, later)?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.find_active_edges_by_target("dm.t").unwrap().len(), 2);
        assert!(store.find_active_edges_by_target("ads.new").unwrap().is_empty());
        assert!(store.find_active_edges_by_source("dm.t").unwrap().is_empty());
        assert_eq!(store.find_column_edges("dm.t", "dwd.d").unwrap().len(), 1);

        let next = store.upsert_table_edge(&table("ads.new", "dm.t"), later).unwrap();
        assert_eq!(next.id, EdgeId(3));
        assert_eq!(store.find_active_edges_by_source("dm.t").unwrap().len(), 1);
    }

    #[test]
    fn test_atomically_commits_on_success() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let id = store
            .atomically(|s| {
                s.upsert_table_edge(&table("dm.t", "dwd.d"), now)?;
                s.atomically(|inner| inner.upsert_table_edge(&table("dm.t", "dim.p"), now))
            })
            .unwrap()
            .id;
        assert_eq!(id, EdgeId(2));
        assert_eq!(store.table_edge_count(), 2);
        assert!(store.journal.is_none());
    }

    #[test]
    fn test_snapshot_round_trip_keeps_indexes() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        store.upsert_table_edge(&table("dm.t", "dwd.d"), now).unwrap();
        store.upsert_table_edge(&table("dm.t", "dim.p"), now).unwrap();
        store.deactivate_table_edge("dm.t", "dim.p", now).unwrap();
        store.upsert_column_edge(&column("x", "a"), None, now).unwrap();

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let snapshot: StoreSnapshot = serde_json::from_str(&json).unwrap();
        let restored = MemoryStore::from_snapshot(snapshot).unwrap();

        assert_eq!(restored.table_edge_count(), 2);
        assert_eq!(restored.find_active_edges_by_target("dm.t").unwrap().len(), 1);
        assert_eq!(restored.find_column_edges("dm.t", "dwd.d").unwrap().len(), 1);
        assert_eq!(restored.snapshot(), store.snapshot());
    }

    #[test]
    fn test_snapshot_rejects_duplicate_active_edges() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        store.upsert_table_edge(&table("dm.t", "dwd.d"), now).unwrap();
        let mut snapshot = store.snapshot();
        let mut duplicate = snapshot.table_edges[0].clone();
        duplicate.id = EdgeId(2);
        snapshot.table_edges.push(duplicate);
        assert!(MemoryStore::from_snapshot(snapshot).is_err());
    }
}
