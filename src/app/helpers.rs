//! Helper functions for CLI operations.
//!
//! Exit code calculation and the graph snapshot and metadata file plumbing
//! shared by the commands.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc
};

use tracing::debug;

use crate::{
    config::Config,
    error::{AppResult, file_read_error, file_write_error, output_error, storage_error},
    graph::{LineageGraph, StoreSnapshot},
    lineage::FileOutcome,
    metadata::{MetadataProvider, StaticMetadata}
};

/// Calculates the process exit code for a batch of parsed files.
///
/// - `0` - Every file parsed without warnings
/// - `1` - At least one warning diagnostic
/// - `2` - At least one file could not be read
///
/// # Example
///
/// ```
/// use sql_lineage_analyzer::app::calculate_exit_code;
///
/// assert_eq!(calculate_exit_code(&[]), 0);
/// ```
pub fn calculate_exit_code(outcomes: &[FileOutcome]) -> i32 {
    if outcomes.iter().any(|o| o.result.is_err()) {
        2
    } else if outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .any(|r| r.has_warnings())
    {
        1
    } else {
        0
    }
}

/// Loads a graph snapshot; a missing file is an empty graph.
pub fn load_graph(path: &Path) -> AppResult<LineageGraph> {
    if !path.exists() {
        debug!(path = %path.display(), "graph snapshot not found, starting empty");
        return Ok(LineageGraph::new());
    }
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| file_read_error(&display, e))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&content)
        .map_err(|e| storage_error(format!("invalid graph snapshot '{}': {}", display, e)))?;
    LineageGraph::from_snapshot(snapshot)
}

/// Writes the graph back as a pretty-printed JSON snapshot.
pub fn save_graph(graph: &LineageGraph, path: &Path) -> AppResult<()> {
    let snapshot = graph.snapshot()?;
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| output_error(e.to_string()))?;
    fs::write(path, json).map_err(|e| file_write_error(&path.display().to_string(), e))?;
    debug!(
        path = %path.display(),
        table_edges = snapshot.table_edges.len(),
        column_edges = snapshot.column_edges.len(),
        "saved graph snapshot"
    );
    Ok(())
}

/// Resolves the metadata provider: the flag wins over the config file.
pub fn load_metadata(
    flag: Option<&PathBuf>,
    config: &Config
) -> AppResult<Option<Arc<dyn MetadataProvider>>> {
    match flag.or(config.metadata.file.as_ref()) {
        Some(path) => {
            let metadata = StaticMetadata::from_path(path)?;
            Ok(Some(Arc::new(metadata)))
        }
        None => Ok(None)
    }
}
