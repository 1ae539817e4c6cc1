//! The parse command: extract lineage from scripts, optionally register it.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::{
    convert::create_output_options,
    helpers::{calculate_exit_code, load_graph, load_metadata, save_graph},
    types::{CommandOutput, ParseParams}
};
use crate::{
    config::Config,
    diagnostics::{Diagnostic, DiagnosticKind},
    error::{AppResult, config_error},
    graph::RegistrationRequest,
    lineage::{AnalysisResult, LineageExtractor, batch_parse_files_with},
    output::{format_analysis, format_parse_run}
};

fn progress_bar(len: usize) -> ProgressBar {
    if len < 2 {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:30.green} {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    pb.set_message("parsing scripts");
    pb
}

/// Run the parse command.
///
/// Files that cannot be read are reported on stderr and do not stop the
/// batch. A metadata file that fails to load is reported the same way; the
/// scripts are still parsed, unaligned, and each result carries LIN003. With `register`, every result that names a target table is
/// upserted into the graph snapshot, which is written back afterwards.
pub fn run_parse(params: ParseParams, config: Config) -> AppResult<CommandOutput> {
    if params.register && params.graph.is_none() {
        return Err(config_error("--register requires --graph <FILE>"));
    }

    let mut extractor = LineageExtractor::from_config(&config)?;
    let mut stderr = Vec::new();
    let metadata_failure = match load_metadata(params.metadata.as_ref(), &config) {
        Ok(Some(provider)) => {
            extractor = extractor.with_metadata(provider);
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "metadata unavailable, column names are not aligned");
            stderr.push(format!("Warning: {}", e));
            Some(e.to_string())
        }
    };

    let pb = progress_bar(params.files.len());
    let outcomes = batch_parse_files_with(&extractor, &params.files, |_| pb.inc(1));
    pb.finish_and_clear();

    let exit_code = calculate_exit_code(&outcomes);
    let mut results: Vec<AnalysisResult> = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome.result {
            Ok(mut result) => {
                if let Some(reason) = &metadata_failure {
                    result.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MetadataUnavailable,
                        format!("metadata could not be loaded, alignment skipped: {}", reason)
                    ));
                }
                results.push(result);
            }
            Err(e) => stderr.push(format!("Error: {}: {}", outcome.path.display(), e))
        }
    }

    let output_opts = create_output_options(params.output_format, params.no_color);
    let rendered = match params.graph.as_deref().filter(|_| params.register) {
        Some(path) => {
            let graph = load_graph(path)?;
            let created_by = params
                .created_by
                .as_deref()
                .unwrap_or(&config.graph.created_by);
            let mut reports = Vec::new();
            for result in &results {
                if !result.has_target() {
                    warn!(
                        file = result.sql_file.as_deref().unwrap_or("-"),
                        "no target table, skipping registration"
                    );
                    continue;
                }
                reports.push(graph.register(&RegistrationRequest::from_analysis(result, created_by))?);
            }
            save_graph(&graph, path)?;
            info!(registered = reports.len(), path = %path.display(), "graph updated");
            format_parse_run(&results, &reports, &output_opts)?
        }
        None => format_analysis(&results, &output_opts)?
    };

    Ok(CommandOutput {
        exit_code,
        stdout: vec![rendered],
        stderr
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use tempfile::TempDir;

    use super::*;
    use crate::cli::Format;

    fn params(files: Vec<PathBuf>) -> ParseParams {
        ParseParams {
            files,
            metadata:      None,
            output_format: Format::Json,
            no_color:      true,
            register:      false,
            graph:         None,
            created_by:    None
        }
    }

    #[test]
    fn test_register_without_graph_rejected() {
        let mut p = params(vec![PathBuf::from("a.sql")]);
        p.register = true;
        assert!(run_parse(p, Config::default()).is_err());
    }

    #[test]
    fn test_missing_file_reported_and_batch_continues() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.sql");
        fs::write(&good, "INSERT INTO t SELECT a FROM s").unwrap();
        let missing = dir.path().join("missing.sql");

        let output = run_parse(params(vec![good, missing]), Config::default()).unwrap();
        assert_eq!(output.exit_code, 2);
        assert_eq!(output.stderr.len(), 1);
        assert!(output.stderr[0].contains("missing.sql"));
        assert!(output.stdout[0].contains("\"target_table\": \"t\""));
    }

    #[test]
    fn test_unreadable_metadata_degrades_to_unaligned_run() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("load.sql");
        fs::write(&script, "INSERT INTO dm.t SELECT a.x FROM dwd.d a").unwrap();
        let metadata = dir.path().join("columns.json");
        fs::write(&metadata, "{not json").unwrap();

        let mut p = params(vec![script]);
        p.metadata = Some(metadata);
        let output = run_parse(p, Config::default()).unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stderr.len(), 1);
        assert!(output.stderr[0].starts_with("Warning:"));
        assert!(output.stdout[0].contains("\"target_table\": \"dm.t\""));
        assert!(output.stdout[0].contains("LIN003"));
    }

    #[test]
    fn test_register_writes_snapshot() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("load.sql");
        fs::write(
            &script,
            "INSERT INTO dm.t SELECT a.x, SUM(a.amt) AS amt FROM dwd.d a"
        )
        .unwrap();
        let graph_path = dir.path().join("graph.json");

        let mut p = params(vec![script]);
        p.register = true;
        p.graph = Some(graph_path.clone());
        p.created_by = Some("etl-bot".to_string());
        let output = run_parse(p, Config::default()).unwrap();
        assert_eq!(output.exit_code, 0);

        let graph = load_graph(&graph_path).unwrap();
        let upstream = graph.upstream("dm.t", 1, true).unwrap();
        assert_eq!(upstream.tables(), vec!["dwd.d"]);
        assert_eq!(upstream.edges[0].edge.created_by, "etl-bot");
        assert_eq!(upstream.column_edges.map(|c| c.len()), Some(2));
    }
}
