// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use sql_lineage_analyzer::{
    graph::{LineageGraph, RegistrationRequest},
    lineage::{AnalysisResult, JoinKind, LineageExtractor, TransformKind},
    output::{
        OutputFormat, OutputOptions, format_analysis, format_registration, format_traversal
    }
};

fn sample() -> AnalysisResult {
    LineageExtractor::new().extract(
        "INSERT OVERWRITE TABLE dm.loan_stat PARTITION (dt='x', hour='01') \
         SELECT a.dt, SUM(a.loan_amt) AS td_loan_amt, COUNT(1) AS loan_cnt \
         FROM dwd.loan a INNER JOIN dim.product p ON a.pid = p.id"
    )
}

fn opts(format: OutputFormat) -> OutputOptions {
    OutputOptions {
        format,
        colored: false
    }
}

fn graph() -> LineageGraph {
    let graph = LineageGraph::new();
    graph
        .register(
            &RegistrationRequest::new("dm.t", "test")
                .source("dwd.d", JoinKind::From)
                .column("amt", "dwd.d", "amt", TransformKind::Sum)
        )
        .unwrap();
    graph
        .register(&RegistrationRequest::new("dwd.d", "test").source("ods.d", JoinKind::From))
        .unwrap();
    graph
}

#[test]
fn test_output_format_default() {
    let format = OutputFormat::default();
    assert!(matches!(format, OutputFormat::Text));
}

#[test]
fn test_output_options_default() {
    let opts = OutputOptions::default();
    assert!(matches!(opts.format, OutputFormat::Text));
    assert!(opts.colored);
}

#[test]
fn test_format_analysis_text() {
    let output = format_analysis(&[sample()], &opts(OutputFormat::Text)).unwrap();
    assert!(output.contains("=== dm.loan_stat ==="));
    assert!(output.contains("Partitions: dt, hour"));
    assert!(output.contains("INNER JOIN  dim.product (p) ON a.pid = p.id"));
    assert!(output.contains("td_loan_amt <- dwd.loan.loan_amt [SUM]"));
    assert!(output.contains("domain=loan"));
    assert!(output.contains("hourly"));
}

#[test]
fn test_format_analysis_yaml() {
    let output = format_analysis(&[sample()], &opts(OutputFormat::Yaml)).unwrap();
    assert!(output.contains("target_table: dm.loan_stat"));
    assert!(output.contains("value_kind: quantity"));
}

#[test]
fn test_format_analysis_colored() {
    let output = format_analysis(
        &[sample()],
        &OutputOptions {
            format:  OutputFormat::Text,
            colored: true
        }
    )
    .unwrap();
    assert!(output.contains("dm.loan_stat"));
}

#[test]
fn test_format_traversal_text() {
    let result = graph().upstream("dm.t", 2, true).unwrap();
    let output = format_traversal(&result, &opts(OutputFormat::Text)).unwrap();
    assert!(output.starts_with("Upstream of dm.t (depth 2): 2 edges"));
    assert!(output.contains("  depth 1"));
    assert!(output.contains("  depth 2"));
    assert!(output.contains("dm.t.amt <- dwd.d.amt [SUM]"));
}

#[test]
fn test_format_traversal_json() {
    let result = graph().downstream("ods.d", 3, false).unwrap();
    let output = format_traversal(&result, &opts(OutputFormat::Json)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["direction"], "downstream");
    assert_eq!(value["edges"][0]["depth"], 1);
    assert_eq!(value["edges"][0]["target_table"], "dwd.d");
    assert_eq!(value["edges"][1]["target_table"], "dm.t");
    assert!(value["column_edges"].is_null());
}

#[test]
fn test_format_registration_text() {
    let graph = LineageGraph::new();
    let report = graph
        .register(&RegistrationRequest::from_analysis(&sample(), "test"))
        .unwrap();
    let output = format_registration(&[report], &opts(OutputFormat::Text)).unwrap();
    assert!(output.contains("Registered dm.loan_stat"));
    assert!(output.contains("inserted dm.loan_stat <- dwd.loan (FROM)"));
    assert!(output.contains("skipped 1 column edges"));
}
