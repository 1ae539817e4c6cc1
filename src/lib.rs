//! # SQL Lineage Analyzer
//!
//! Table- and column-level lineage extraction for batch SQL scripts, plus a
//! lineage graph for impact analysis.
//!
//! A script of the form `INSERT [OVERWRITE] TABLE t [PARTITION (...)] SELECT
//! ... FROM ... [JOIN ...]` is scanned into the target table, its source
//! tables with join kinds, one lineage edge per output column and a set of
//! candidate business indicators. Malformed input never fails extraction:
//! missing pieces stay empty and are reported as diagnostics.
//!
//! Extracted lineage can be registered into a [`graph::LineageGraph`], which
//! answers upstream ("what is this built from") and downstream ("what breaks
//! if this changes") questions with a depth-bounded, cycle-safe traversal.
//!
//! # Quick Start
//!
//! ```bash
//! # Extract lineage from a directory of scripts
//! sql-lineage-analyzer parse etl/*.sql
//!
//! # Align column names against table metadata and register into a graph
//! sql-lineage-analyzer parse etl/*.sql --metadata columns.json --register --graph lineage.json
//!
//! # Impact analysis
//! sql-lineage-analyzer upstream dm.t --graph lineage.json --depth 3 --columns
//! sql-lineage-analyzer downstream ods.d --graph lineage.json -f json
//! ```
//!
//! # Diagnostics
//!
//! | Code | Severity | Raised when |
//! |------|----------|-------------|
//! | LIN001 | warning | no INSERT target found |
//! | LIN002 | warning | no FROM source found |
//! | LIN003 | info | metadata provider failed or returned no columns |
//! | LIN004 | warning | extracted and metadata column counts differ |
//! | LIN005 | info | `SELECT *` skipped column lineage |
//! | LIN006 | info | a column edge has no source column |
//! | LIN007 | info | a field had no output name |
//! | LIN008 | warning | the tokenizer stopped early on malformed text |
//! | LIN009 | info | an empty select field was skipped |
//!
//! # Exit Codes
//!
//! - `0` - Success, no warnings
//! - `1` - Warnings found, or a command-level error
//! - `2` - At least one script could not be read
//!
//! # Modules
//!
//! - [`lineage`] - Extraction pipeline and batch parsing
//! - [`scanner`] - Tokenizer and clause scanner
//! - [`indicator`] - Indicator derivation from aggregate columns
//! - [`metadata`] - Column metadata providers
//! - [`graph`] - Lineage graph, persistence and traversal
//! - [`config`] - Configuration loading
//! - [`output`] - Result formatting
//! - [`error`] - Error types and constructors

pub mod app;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod indicator;
pub mod lineage;
pub mod metadata;
pub mod normalize;
pub mod output;
pub mod scanner;
