//! Table- and column-level lineage extraction.
//!
//! [`LineageExtractor`] runs one SQL script through the pipeline:
//!
//! ```text
//! raw SQL ─▶ normalize ─▶ ClauseScanner ─▶ split_select ─▶ ExpressionClassifier
//!                          (target,          (fields)        (column lineage)
//!                           sources)                                │
//!        AnalysisResult ◀─ summary ◀─ IndicatorDeriver ◀─ align_columns (metadata)
//! ```
//!
//! Extraction never fails on malformed SQL. Missing pieces are left empty
//! and reported as [`Diagnostic`]s on the result. Only reading a file can
//! return an error.
//!
//! # Example
//!
//! ```
//! use sql_lineage_analyzer::lineage::{JoinKind, LineageExtractor, TransformKind};
//!
//! let extractor = LineageExtractor::new();
//! let result = extractor.extract(
//!     "INSERT OVERWRITE TABLE dm.t PARTITION(dt='x') \
//!      SELECT a.dt, SUM(a.amt) AS td_amt FROM dwd.d a \
//!      LEFT JOIN dim.p b ON a.id=b.id"
//! );
//!
//! assert_eq!(result.target_table, "dm.t");
//! assert_eq!(result.table_lineage[1].join_kind, JoinKind::Left);
//! assert_eq!(result.column_lineage[1].transform_kind, TransformKind::Sum);
//! assert_eq!(result.column_lineage[1].source_table.as_deref(), Some("dwd.d"));
//! assert_eq!(result.indicators.len(), 1);
//! ```

mod align;
mod classify;
mod split;
mod types;

use std::{
    collections::HashMap,
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::Arc
};

pub use align::{Alignment, align_columns};
pub use classify::{
    Classification, ClassifiedField, ClassifyRule, ExpressionClassifier, SourceRef, source_ref,
    split_alias
};
use compact_str::{CompactString, format_compact};
use rayon::prelude::*;
pub use split::{SelectFields, split_fields, split_select};
use tracing::{debug, info, warn};
pub use types::{AnalysisResult, ColumnLineage, JoinKind, RelationKind, TableLineage, TransformKind};

use crate::{
    config::Config,
    diagnostics::{Diagnostic, DiagnosticKind, Severity},
    error::{AppResult, file_read_error},
    indicator::{IndicatorDeriver, InferenceTables},
    metadata::MetadataProvider,
    normalize::normalize,
    scanner::{ClauseScanner, TokenScanner}
};

/// Extraction pipeline with its scanner, rule chain and inference tables.
///
/// The extractor holds no per-script state and can be shared across
/// threads.
pub struct LineageExtractor {
    scanner:          Box<dyn ClauseScanner>,
    classifier:       ExpressionClassifier,
    deriver:          IndicatorDeriver,
    excluded_columns: Vec<CompactString>,
    metadata:         Option<Arc<dyn MetadataProvider>>
}

impl Default for LineageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineageExtractor {
    /// Extractor with built-in inference tables and no metadata provider.
    pub fn new() -> Self {
        Self {
            scanner:          Box::new(TokenScanner),
            classifier:       ExpressionClassifier::new(),
            deriver:          IndicatorDeriver::default(),
            excluded_columns: ["dt", "create_time", "update_time"]
                .into_iter()
                .map(CompactString::from)
                .collect(),
            metadata:         None
        }
    }

    /// Build from configuration; fails on invalid inference patterns.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let tables = InferenceTables::from_config(&config.inference)?;
        Ok(Self {
            deriver: IndicatorDeriver::new(tables),
            excluded_columns: config
                .metadata
                .excluded_columns
                .iter()
                .map(|c| CompactString::from(c.as_str()))
                .collect(),
            ..Self::new()
        })
    }

    pub fn with_scanner(mut self, scanner: Box<dyn ClauseScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_metadata(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    /// Analyze one SQL script.
    pub fn extract(&self, sql: &str) -> AnalysisResult {
        let normalized = normalize(sql);
        let mut result = AnalysisResult::default();
        if let Some(error) = &normalized.error {
            report(
                &mut result.diagnostics,
                DiagnosticKind::TokenizeError,
                format!("tokenizer stopped early, only the text before it was analyzed: {}", error)
            );
        }
        let normalized = normalized.sql;

        match self.scanner.target(&normalized) {
            Some(target) => {
                debug!(target_table = %target.table, "found insert target");
                result.target_table = target.table;
                result.partition_columns = target.partition_columns;
            }
            None => report(
                &mut result.diagnostics,
                DiagnosticKind::MissingTarget,
                "no INSERT OVERWRITE TABLE or INSERT INTO target found".to_string()
            )
        }

        result.table_lineage = self.scanner.sources(&normalized);
        if !result
            .table_lineage
            .iter()
            .any(|t| t.join_kind == JoinKind::From)
        {
            report(
                &mut result.diagnostics,
                DiagnosticKind::MissingSource,
                "no FROM source table found".to_string()
            );
        }
        debug!(sources = result.table_lineage.len(), "extracted table lineage");

        if let Some(select_list) = self.scanner.select_list(&normalized) {
            match split_select(select_list) {
                SelectFields::Star => report(
                    &mut result.diagnostics,
                    DiagnosticKind::SelectStar,
                    "SELECT * is not expanded into column lineage".to_string()
                ),
                SelectFields::Fields(fields) => {
                    let empty = fields.iter().filter(|f| f.is_empty()).count();
                    if empty > 0 {
                        report(
                            &mut result.diagnostics,
                            DiagnosticKind::EmptyField,
                            format!("skipped {} empty select field(s)", empty)
                        );
                    }
                    let aliases = alias_map(&result.table_lineage);
                    result.column_lineage = fields
                        .iter()
                        .filter(|f| !f.is_empty())
                        .enumerate()
                        .map(|(i, field)| self.column_lineage(i, field, &aliases, &mut result.diagnostics))
                        .collect();
                }
            }
        }

        for column in result.column_lineage.iter().filter(|c| c.is_unresolved()) {
            report(
                &mut result.diagnostics,
                DiagnosticKind::UnresolvedSource,
                format!(
                    "no source column found for '{}', needs manual review",
                    column.target_column
                )
            );
        }

        if result.has_target() {
            self.align(&mut result);
        }

        result.indicators = self.deriver.derive(
            &result.target_table,
            &result.partition_columns,
            &result.column_lineage
        );
        result.summary = summarize(&result);
        info!(
            target_table = %result.target_table,
            columns = result.column_lineage.len(),
            indicators = result.indicators.len(),
            "extracted lineage"
        );
        result
    }

    /// Read and analyze a script file; the path is recorded on the result.
    pub fn extract_file(&self, path: &Path) -> AppResult<AnalysisResult> {
        let display = path.display().to_string();
        let sql = read_to_string(path).map_err(|e| file_read_error(&display, e))?;
        let mut result = self.extract(&sql);
        result.sql_file = Some(display);
        Ok(result)
    }

    fn column_lineage(
        &self,
        index: usize,
        field: &str,
        aliases: &HashMap<CompactString, CompactString>,
        diagnostics: &mut Vec<Diagnostic>
    ) -> ColumnLineage {
        let classified = self.classifier.classify_field(field);
        let target_column = classified.output_name.unwrap_or_else(|| {
            let positional = format_compact!("_c{}", index);
            report(
                diagnostics,
                DiagnosticKind::UnnamedColumn,
                format!("field '{}' has no output name, using '{}'", field, positional)
            );
            positional
        });
        let classification = classified.classification;
        ColumnLineage {
            target_column,
            source_table: classification
                .source
                .table
                .map(|qualifier| resolve_qualifier(aliases, qualifier)),
            source_column: classification.source.column,
            transform_kind: classification.kind,
            transform_expression: classification.expression
        }
    }

    fn align(&self, result: &mut AnalysisResult) {
        let Some(provider) = &self.metadata else {
            return;
        };
        let authoritative: Vec<CompactString> = match provider.list_columns(&result.target_table) {
            Ok(columns) => columns
                .into_iter()
                .map(|c| c.name)
                .filter(|name| {
                    !self
                        .excluded_columns
                        .iter()
                        .chain(&result.partition_columns)
                        .any(|excluded| excluded.eq_ignore_ascii_case(name))
                })
                .collect(),
            Err(e) => {
                report(
                    &mut result.diagnostics,
                    DiagnosticKind::MetadataUnavailable,
                    format!("metadata lookup failed: {}", e)
                );
                return;
            }
        };

        match align_columns(&mut result.column_lineage, &authoritative) {
            Alignment::Applied {
                renamed
            } => debug!(renamed, "aligned columns with metadata"),
            Alignment::ArityMismatch {
                extracted,
                expected
            } => report(
                &mut result.diagnostics,
                DiagnosticKind::ArityMismatch,
                format!(
                    "extracted {} columns but '{}' has {}, keeping extracted names",
                    extracted, result.target_table, expected
                )
            ),
            Alignment::Unavailable => report(
                &mut result.diagnostics,
                DiagnosticKind::MetadataUnavailable,
                format!("no column metadata for '{}'", result.target_table)
            )
        }
    }
}

fn report(diagnostics: &mut Vec<Diagnostic>, kind: DiagnosticKind, message: String) {
    let diagnostic = Diagnostic::new(kind, message);
    match diagnostic.severity {
        Severity::Warning => warn!(code = diagnostic.code, "{}", diagnostic.message),
        Severity::Info => info!(code = diagnostic.code, "{}", diagnostic.message)
    }
    diagnostics.push(diagnostic);
}

/// Lowercased qualifier to source table.
///
/// Explicit aliases take precedence over bare table names and their last
/// name segment.
fn alias_map(sources: &[TableLineage]) -> HashMap<CompactString, CompactString> {
    let mut aliases = HashMap::new();
    for source in sources {
        if let Some(alias) = &source.alias {
            aliases.insert(
                CompactString::from(alias.to_ascii_lowercase()),
                source.source_table.clone()
            );
        }
    }
    for source in sources {
        let table = &source.source_table;
        let short = table.rsplit('.').next().unwrap_or(table);
        for key in [short, table.as_str()] {
            aliases
                .entry(CompactString::from(key.to_ascii_lowercase()))
                .or_insert_with(|| table.clone());
        }
    }
    aliases
}

fn resolve_qualifier(
    aliases: &HashMap<CompactString, CompactString>,
    qualifier: CompactString
) -> CompactString {
    aliases
        .get(qualifier.to_ascii_lowercase().as_str())
        .cloned()
        .unwrap_or(qualifier)
}

fn summarize(result: &AnalysisResult) -> String {
    let mut summary = match result.table_lineage.as_slice() {
        [] => String::from("no source tables recognized"),
        [single] => format!("single-table load from {}", single.source_table),
        sources => format!("joins {} source tables", sources.len())
    };
    if !result.indicators.is_empty() {
        summary.push_str(&format!(", computes {} indicators", result.indicators.len()));
    }
    summary
}

/// Outcome of parsing one file in a batch.
#[derive(Debug)]
pub struct FileOutcome {
    pub path:   PathBuf,
    pub result: AppResult<AnalysisResult>
}

/// Parse files in parallel; a failing file never aborts the batch.
///
/// Outcomes are returned in input order.
pub fn batch_parse_files(extractor: &LineageExtractor, paths: &[PathBuf]) -> Vec<FileOutcome> {
    batch_parse_files_with(extractor, paths, |_| {})
}

/// Like [`batch_parse_files`], calling `on_done` as each file finishes.
pub fn batch_parse_files_with<F>(
    extractor: &LineageExtractor,
    paths: &[PathBuf],
    on_done: F
) -> Vec<FileOutcome>
where
    F: Fn(&Path) + Sync
{
    paths
        .par_iter()
        .map(|path| {
            let result = extractor.extract_file(path);
            if let Err(e) = &result {
                warn!(path = %path.display(), error = %e, "failed to parse file");
            }
            on_done(path);
            FileOutcome {
                path: path.clone(),
                result
            }
        })
        .collect()
}
