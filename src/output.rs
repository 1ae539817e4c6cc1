//! Rendering of analysis, traversal and registration results.
//!
//! Text output is for people and may be colored; JSON and YAML serialize the
//! result types verbatim.

use colored::Colorize;
use serde::Serialize;

use crate::{
    diagnostics::{Diagnostic, Severity},
    error::{AppResult, output_error},
    graph::{Direction, RegistrationReport, TraversalResult},
    lineage::AnalysisResult
};

/// Output format for results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true
        }
    }
}

fn serialize<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> AppResult<Option<String>> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map(Some)
            .map_err(|e| output_error(e.to_string())),
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map(Some)
            .map_err(|e| output_error(e.to_string())),
        OutputFormat::Text => Ok(None)
    }
}

fn heading(text: &str, opts: &OutputOptions) -> String {
    if opts.colored {
        text.cyan().bold().to_string()
    } else {
        text.to_string()
    }
}

fn section(text: &str, opts: &OutputOptions) -> String {
    if opts.colored {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

fn diagnostic_line(diagnostic: &Diagnostic, opts: &OutputOptions) -> String {
    let line = diagnostic.to_string();
    if !opts.colored {
        return line;
    }
    match diagnostic.severity {
        Severity::Warning => line.yellow().to_string(),
        Severity::Info => line.blue().to_string()
    }
}

/// Format the results of a parse run
pub fn format_analysis(results: &[AnalysisResult], opts: &OutputOptions) -> AppResult<String> {
    if let Some(serialized) = serialize(results, opts.format)? {
        return Ok(serialized);
    }

    let mut output = String::new();
    for result in results {
        let title = if result.has_target() {
            format!("=== {} ===", result.target_table)
        } else {
            String::from("=== (no target table) ===")
        };
        output.push_str(&heading(&title, opts));
        output.push('\n');
        if let Some(file) = &result.sql_file {
            output.push_str(&format!("File: {}\n", file));
        }
        if !result.partition_columns.is_empty() {
            output.push_str(&format!(
                "Partitions: {}\n",
                result.partition_columns.join(", ")
            ));
        }
        output.push_str(&format!("Summary: {}\n", result.summary));

        if !result.table_lineage.is_empty() {
            output.push_str(&section("Table lineage:", opts));
            output.push('\n');
            for table in &result.table_lineage {
                let mut line = format!("  {:<11} {}", table.join_kind, table.source_table);
                if let Some(alias) = &table.alias {
                    line.push_str(&format!(" ({})", alias));
                }
                if let Some(condition) = &table.join_condition {
                    line.push_str(&format!(" ON {}", condition));
                }
                output.push_str(&line);
                output.push('\n');
            }
        }

        if !result.column_lineage.is_empty() {
            output.push_str(&section("Column lineage:", opts));
            output.push('\n');
            for column in &result.column_lineage {
                let source = match (&column.source_table, &column.source_column) {
                    (Some(table), Some(col)) => format!("{}.{}", table, col),
                    (None, Some(col)) => col.to_string(),
                    _ => String::from("?")
                };
                let mut line = format!(
                    "  {} <- {} [{}]",
                    column.target_column, source, column.transform_kind
                );
                if let Some(expression) = &column.transform_expression {
                    line.push_str(&format!(" {}", expression));
                }
                output.push_str(&line);
                output.push('\n');
            }
        }

        if !result.indicators.is_empty() {
            output.push_str(&section("Indicators:", opts));
            output.push('\n');
            for indicator in &result.indicators {
                output.push_str(&format!(
                    "  {} \"{}\" (unconfirmed) {}/{} domain={} type={} {}\n",
                    indicator.english_name,
                    indicator.display_name,
                    indicator.value_kind,
                    indicator.category,
                    indicator.business_domain,
                    indicator.physical_type,
                    indicator.update_frequency
                ));
            }
        }

        if !result.diagnostics.is_empty() {
            output.push_str(&section("Diagnostics:", opts));
            output.push('\n');
            for diagnostic in &result.diagnostics {
                output.push_str("  ");
                output.push_str(&diagnostic_line(diagnostic, opts));
                output.push('\n');
            }
        }
        output.push('\n');
    }
    Ok(output)
}

/// Format an upstream or downstream traversal, grouped by depth
pub fn format_traversal(result: &TraversalResult, opts: &OutputOptions) -> AppResult<String> {
    if let Some(serialized) = serialize(result, opts.format)? {
        return Ok(serialized);
    }

    let title = match result.direction {
        Direction::Upstream => format!("Upstream of {}", result.table),
        Direction::Downstream => format!("Downstream of {}", result.table)
    };
    let mut output = heading(
        &format!(
            "{} (depth {}): {} edges",
            title,
            result.depth,
            result.edges.len()
        ),
        opts
    );
    output.push('\n');

    let mut current_depth = 0;
    for traversed in &result.edges {
        if traversed.depth != current_depth {
            current_depth = traversed.depth;
            output.push_str(&section(&format!("  depth {}", current_depth), opts));
            output.push('\n');
        }
        let edge = &traversed.edge;
        output.push_str(&format!(
            "    {} <- {}  {} {}",
            edge.target_table, edge.source_table, edge.join_kind, edge.relation_kind
        ));
        if let Some(summary) = &edge.logic_summary {
            output.push_str(&format!("  # {}", summary));
        }
        output.push('\n');
    }

    if let Some(columns) = &result.column_edges {
        output.push_str(&section("Column lineage:", opts));
        output.push('\n');
        if columns.is_empty() {
            output.push_str("  (none)\n");
        }
        for column in columns {
            output.push_str(&format!(
                "  {}.{} <- {}.{} [{}]\n",
                column.target_table,
                column.target_column,
                column.source_table,
                column.source_column,
                column.transform_kind
            ));
        }
    }
    Ok(output)
}

/// Format registration reports
pub fn format_registration(reports: &[RegistrationReport], opts: &OutputOptions) -> AppResult<String> {
    if let Some(serialized) = serialize(reports, opts.format)? {
        return Ok(serialized);
    }

    let mut output = String::new();
    for report in reports {
        output.push_str(&heading(&format!("Registered {}", report.target_table), opts));
        output.push('\n');
        for edge in &report.table_edges {
            output.push_str(&format!(
                "  {} {} <- {} ({}) {}\n",
                edge.action, report.target_table, edge.source_table, edge.join_kind, edge.id
            ));
        }
        for edge in &report.column_edges {
            output.push_str(&format!(
                "  {} {}.{} <- {}.{} {}\n",
                edge.action,
                report.target_table,
                edge.target_column,
                edge.source_table,
                edge.source_column,
                edge.id
            ));
        }
        if report.skipped_columns > 0 {
            output.push_str(&format!(
                "  skipped {} column edges without a resolved source\n",
                report.skipped_columns
            ));
        }
    }
    Ok(output)
}

#[derive(Serialize)]
struct ParseRun<'a> {
    results:       &'a [AnalysisResult],
    registrations: &'a [RegistrationReport]
}

/// Format a parse run that also registered its lineage.
///
/// Text output appends the registration reports after the analysis; JSON and
/// YAML emit a single document with `results` and `registrations` keys.
pub fn format_parse_run(
    results: &[AnalysisResult],
    registrations: &[RegistrationReport],
    opts: &OutputOptions
) -> AppResult<String> {
    let run = ParseRun {
        results,
        registrations
    };
    if let Some(serialized) = serialize(&run, opts.format)? {
        return Ok(serialized);
    }
    let mut output = format_analysis(results, opts)?;
    output.push_str(&format_registration(registrations, opts)?);
    Ok(output)
}
