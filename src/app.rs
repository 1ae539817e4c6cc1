//! Application logic for the SQL Lineage Analyzer CLI.
//!
//! This module contains the command implementations separated from the main
//! entry point to enable testing. Commands return a [`CommandOutput`] instead
//! of printing, and the binary decides what goes to stdout and stderr.

mod convert;
mod helpers;
mod parse;
mod traverse;
mod types;

pub use convert::{convert_format, create_output_options};
pub use helpers::{calculate_exit_code, load_graph, load_metadata, save_graph};
pub use parse::run_parse;
pub use traverse::{run_deactivate, run_traverse};
pub use types::{CommandOutput, ParseParams, TraverseParams};

use crate::{
    cli::{Commands, TraverseArgs},
    config::Config,
    error::AppResult,
    graph::Direction
};

fn traverse_params(args: TraverseArgs, direction: Direction) -> TraverseParams {
    TraverseParams {
        table: args.table,
        direction,
        graph: args.graph,
        depth: args.depth,
        columns: args.columns,
        output_format: args.output_format,
        no_color: args.no_color
    }
}

/// Dispatch a parsed command line.
pub fn run_command(command: Commands, config: Config) -> AppResult<CommandOutput> {
    match command {
        Commands::Parse {
            files,
            metadata,
            output_format,
            no_color,
            register,
            graph,
            created_by
        } => run_parse(
            ParseParams {
                files,
                metadata,
                output_format,
                no_color,
                register,
                graph,
                created_by
            },
            config
        ),
        Commands::Upstream(args) => run_traverse(traverse_params(args, Direction::Upstream), config),
        Commands::Downstream(args) => {
            run_traverse(traverse_params(args, Direction::Downstream), config)
        }
        Commands::Deactivate {
            target,
            source,
            graph
        } => run_deactivate(&target, &source, &graph)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use clap::Parser;
    use tempfile::TempDir;

    use super::*;
    use crate::cli::Cli;

    #[test]
    fn test_dispatch_parse() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("load.sql");
        fs::write(&script, "INSERT INTO t SELECT a FROM s").unwrap();

        let cli = Cli::parse_from([
            "sql-lineage-analyzer",
            "parse",
            script.to_str().unwrap(),
            "-f",
            "json"
        ]);
        let output = run_command(cli.command, Config::default()).unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout[0].contains("\"source_table\": \"s\""));
    }

    #[test]
    fn test_dispatch_downstream_direction() {
        let cli = Cli::parse_from([
            "sql-lineage-analyzer",
            "downstream",
            "ods.d",
            "--graph",
            "g.json",
            "--depth",
            "4"
        ]);
        let Commands::Downstream(args) = cli.command else {
            panic!("expected downstream");
        };
        let params = traverse_params(args, Direction::Downstream);
        assert_eq!(params.direction, Direction::Downstream);
        assert_eq!(params.depth, Some(4));
        assert_eq!(params.graph, PathBuf::from("g.json"));
    }
}
