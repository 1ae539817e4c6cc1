//! Application types for CLI commands.
//!
//! Command parameters are plain data so the commands can be driven from
//! tests without going through argument parsing.

use std::path::PathBuf;

use crate::{cli::Format, graph::Direction};

/// Parameters for the parse command.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
///
/// use sql_lineage_analyzer::{app::ParseParams, cli::Format};
///
/// let params = ParseParams {
///     files:         vec![PathBuf::from("load_dm_t.sql")],
///     metadata:      None,
///     output_format: Format::Json,
///     no_color:      true,
///     register:      false,
///     graph:         None,
///     created_by:    None
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ParseParams {
    /// SQL scripts to parse.
    pub files:         Vec<PathBuf>,
    /// Column lists for metadata alignment; falls back to the configured
    /// file.
    pub metadata:      Option<PathBuf>,
    pub output_format: Format,
    pub no_color:      bool,
    /// Register every parsed script with a target into the graph.
    pub register:      bool,
    /// Graph snapshot read before and written after registration.
    pub graph:         Option<PathBuf>,
    /// Overrides the configured `created_by`.
    pub created_by:    Option<String>
}

/// Parameters for the upstream and downstream commands.
#[derive(Debug, Clone)]
pub struct TraverseParams {
    pub table:         String,
    pub direction:     Direction,
    pub graph:         PathBuf,
    /// Overrides the configured default depth.
    pub depth:         Option<usize>,
    pub columns:       bool,
    pub output_format: Format,
    pub no_color:      bool
}

/// Output from CLI command execution.
///
/// Represents the final output ready for display, including the exit
/// code and all lines to be printed to stdout.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code for the process (0=clean, 1=warnings, 2=failed files).
    pub exit_code: i32,
    /// Blocks to print to stdout.
    pub stdout:    Vec<String>,
    /// Per-file failures to print to stderr.
    pub stderr:    Vec<String>
}
