//! Graph commands: upstream and downstream traversal, edge deactivation.

use std::path::Path;

use super::{
    convert::create_output_options,
    helpers::{load_graph, save_graph},
    types::{CommandOutput, TraverseParams}
};
use crate::{
    config::Config,
    error::{AppResult, file_read_error},
    graph::Direction,
    output::format_traversal
};

/// Run an upstream or downstream traversal against a graph snapshot.
///
/// Unlike `parse --register`, a missing snapshot is an error here.
pub fn run_traverse(params: TraverseParams, config: Config) -> AppResult<CommandOutput> {
    if !params.graph.exists() {
        return Err(file_read_error(
            &params.graph.display().to_string(),
            std::io::Error::from(std::io::ErrorKind::NotFound)
        ));
    }
    let graph = load_graph(&params.graph)?;
    let depth = params.depth.unwrap_or(config.graph.default_depth);
    let result = match params.direction {
        Direction::Upstream => graph.upstream(&params.table, depth, params.columns)?,
        Direction::Downstream => graph.downstream(&params.table, depth, params.columns)?
    };

    let output_opts = create_output_options(params.output_format, params.no_color);
    Ok(CommandOutput {
        exit_code: 0,
        stdout:    vec![format_traversal(&result, &output_opts)?],
        stderr:    Vec::new()
    })
}

/// Soft-delete one edge and write the snapshot back.
///
/// Exits with 1 when no active edge matched.
pub fn run_deactivate(target: &str, source: &str, graph_path: &Path) -> AppResult<CommandOutput> {
    let graph = load_graph(graph_path)?;
    if graph.deactivate(target, source)? {
        save_graph(&graph, graph_path)?;
        Ok(CommandOutput {
            exit_code: 0,
            stdout:    vec![format!("Deactivated {} <- {}", target, source)],
            stderr:    Vec::new()
        })
    } else {
        Ok(CommandOutput {
            exit_code: 1,
            stdout:    Vec::new(),
            stderr:    vec![format!("No active edge {} <- {}", target, source)]
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        cli::Format,
        graph::{LineageGraph, RegistrationRequest},
        lineage::JoinKind
    };

    fn chain(path: &Path) {
        let graph = LineageGraph::new();
        for (target, source) in [("dm.t", "dwd.d"), ("dwd.d", "ods.d")] {
            graph
                .register(&RegistrationRequest::new(target, "auto").source(source, JoinKind::From))
                .unwrap();
        }
        save_graph(&graph, path).unwrap();
    }

    fn params(graph: PathBuf, direction: Direction, depth: Option<usize>) -> TraverseParams {
        let table = match direction {
            Direction::Upstream => "dm.t",
            Direction::Downstream => "ods.d"
        };
        TraverseParams {
            table: table.to_string(),
            direction,
            graph,
            depth,
            columns: false,
            output_format: Format::Text,
            no_color: true
        }
    }

    #[test]
    fn test_depth_falls_back_to_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        chain(&path);

        let output = run_traverse(
            params(path.clone(), Direction::Upstream, None),
            Config::default()
        )
        .unwrap();
        assert!(output.stdout[0].contains("1 edges"));

        let output =
            run_traverse(params(path, Direction::Upstream, Some(2)), Config::default()).unwrap();
        assert!(output.stdout[0].contains("2 edges"));
        assert!(output.stdout[0].contains("dwd.d <- ods.d"));
    }

    #[test]
    fn test_downstream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        chain(&path);

        let output =
            run_traverse(params(path, Direction::Downstream, Some(5)), Config::default()).unwrap();
        assert!(output.stdout[0].starts_with("Downstream of ods.d"));
        assert!(output.stdout[0].contains("dm.t <- dwd.d"));
    }

    #[test]
    fn test_missing_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert!(run_traverse(params(path, Direction::Upstream, None), Config::default()).is_err());
    }

    #[test]
    fn test_deactivate_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        chain(&path);

        assert_eq!(run_deactivate("dm.t", "dwd.d", &path).unwrap().exit_code, 0);
        assert_eq!(run_deactivate("dm.t", "dwd.d", &path).unwrap().exit_code, 1);

        let graph = load_graph(&path).unwrap();
        assert!(graph.upstream("dm.t", 3, false).unwrap().edges.is_empty());
    }
}
