use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// SQL Lineage Analyzer - Extract table and column lineage from ETL scripts
#[derive(Parser, Debug)]
#[command(name = "sql-lineage-analyzer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract lineage from SQL scripts
    Parse {
        /// SQL files to parse
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Column lists used to align output column names (json, yaml or toml)
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        output_format: Format,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Register extracted lineage into the graph file
        #[arg(long, requires = "graph")]
        register: bool,

        /// Lineage graph snapshot (created if missing)
        #[arg(short, long)]
        graph: Option<PathBuf>,

        /// Author recorded on registered edges
        #[arg(long, env = "SQL_LINEAGE_CREATED_BY")]
        created_by: Option<String>
    },

    /// List tables the given table is derived from
    Upstream(TraverseArgs),

    /// List tables derived from the given table
    Downstream(TraverseArgs),

    /// Deactivate one table edge so it is no longer traversed
    Deactivate {
        /// Target table of the edge
        target: String,

        /// Source table of the edge
        source: String,

        /// Lineage graph snapshot
        #[arg(short, long)]
        graph: PathBuf
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct TraverseArgs {
    /// Table to start from
    pub table: String,

    /// Lineage graph snapshot
    #[arg(short, long)]
    pub graph: PathBuf,

    /// Maximum number of hops (defaults to the configured depth)
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Include column lineage of first-hop edges
    #[arg(long)]
    pub columns: bool,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    pub output_format: Format,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml
}
