//! Per-field transform classification.
//!
//! Each select field is run through an ordered chain of [`ClassifyRule`]s and
//! the first rule that matches decides the transform. The order matters:
//! window functions often wrap aggregates (`SUM(x) OVER (...)`), so the
//! window rule runs before the aggregate rule.
//!
//! | Order | Rule | Transform | Source extracted |
//! |-------|------|-----------|------------------|
//! | 1 | [`WindowFunction`] | `CUSTOM` | no |
//! | 2 | [`AggregateFunction`] | `SUM` `COUNT` `AVG` `MAX` `MIN` | from the argument |
//! | 3 | [`CaseExpression`] | `CASE` | no |
//! | 4 | [`Arithmetic`] | `CUSTOM` | no |
//! | 5 | [`DirectReference`] | `DIRECT` | from the expression |
//!
//! # Output names
//!
//! A trailing `AS name` gives the output column name. Without it the last
//! identifier in the field is used, which is ambiguous for unaliased
//! expressions with several identifiers (`CAST(x AS INT)` yields `INT`).
//! Callers that need exact names should align against table metadata.

use compact_str::CompactString;

use super::TransformKind;
use crate::scanner::{Token, TokenKind, qualified_name, tokenize};

/// Aggregate function names in match priority.
const AGGREGATES: &[(&str, TransformKind)] = &[
    ("SUM", TransformKind::Sum),
    ("COUNT", TransformKind::Count),
    ("AVG", TransformKind::Avg),
    ("MAX", TransformKind::Max),
    ("MIN", TransformKind::Min)
];

/// Words skipped when looking for a bare source column.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "CASE", "WHEN", "THEN", "ELSE", "END", "AND", "OR", "NOT", "NULL", "IS", "IN", "AS",
    "DISTINCT", "LIKE", "BETWEEN", "TRUE", "FALSE", "INTERVAL"
];

/// Where an output column's value comes from, before alias resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRef {
    /// Table or alias qualifier
    pub table:  Option<CompactString>,
    pub column: Option<CompactString>
}

/// Result of classifying one expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind:       TransformKind,
    pub source:     SourceRef,
    /// Raw expression, absent for direct references
    pub expression: Option<String>
}

impl Classification {
    fn opaque(kind: TransformKind, expr: &str) -> Self {
        Self {
            kind,
            source: SourceRef::default(),
            expression: Some(expr.to_string())
        }
    }
}

/// A classified select field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedField {
    /// `None` when the field contains no identifier at all
    pub output_name:    Option<CompactString>,
    pub classification: Classification
}

/// One step of the classification chain.
pub trait ClassifyRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Classify `expr` or return `None` to defer to the next rule.
    fn classify(&self, expr: &str, tokens: &[Token<'_>]) -> Option<Classification>;
}

/// Window function: `... OVER (...)`
pub struct WindowFunction;

impl ClassifyRule for WindowFunction {
    fn name(&self) -> &'static str {
        "window"
    }

    fn classify(&self, expr: &str, tokens: &[Token<'_>]) -> Option<Classification> {
        call_open(tokens, "OVER").map(|_| Classification::opaque(TransformKind::Custom, expr))
    }
}

/// Aggregate call; the source comes from the call argument.
pub struct AggregateFunction;

impl ClassifyRule for AggregateFunction {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn classify(&self, expr: &str, tokens: &[Token<'_>]) -> Option<Classification> {
        AGGREGATES.iter().find_map(|(name, kind)| {
            let arguments = match call_arguments(tokens, call_open(tokens, name)?) {
                [distinct, rest @ ..] if distinct.is_keyword("DISTINCT") => rest,
                arguments => arguments
            };
            Some(Classification {
                kind:       *kind,
                source:     source_ref(arguments),
                expression: Some(expr.to_string())
            })
        })
    }
}

/// `CASE ... WHEN ...`
pub struct CaseExpression;

impl ClassifyRule for CaseExpression {
    fn name(&self) -> &'static str {
        "case"
    }

    fn classify(&self, expr: &str, tokens: &[Token<'_>]) -> Option<Classification> {
        let has_case = tokens.iter().any(|t| t.is_keyword("CASE"));
        let has_when = tokens.iter().any(|t| t.is_keyword("WHEN"));
        (has_case && has_when).then(|| Classification::opaque(TransformKind::Case, expr))
    }
}

/// Any `+ - * /` outside string literals.
pub struct Arithmetic;

impl ClassifyRule for Arithmetic {
    fn name(&self) -> &'static str {
        "arithmetic"
    }

    fn classify(&self, expr: &str, tokens: &[Token<'_>]) -> Option<Classification> {
        let has_operator = tokens.iter().enumerate().any(|(i, t)| match t.kind {
            TokenKind::Operator => matches!(t.text, "+" | "-" | "/"),
            TokenKind::Star => i == 0 || tokens[i - 1].kind != TokenKind::Dot,
            _ => false
        });
        has_operator.then(|| Classification::opaque(TransformKind::Custom, expr))
    }
}

/// Fallback: the expression is (or wraps) a plain column reference.
pub struct DirectReference;

impl ClassifyRule for DirectReference {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn classify(&self, _expr: &str, tokens: &[Token<'_>]) -> Option<Classification> {
        Some(Classification {
            kind:       TransformKind::Direct,
            source:     source_ref(tokens),
            expression: None
        })
    }
}

/// Ordered rule chain.
pub struct ExpressionClassifier {
    rules: Vec<Box<dyn ClassifyRule>>
}

impl Default for ExpressionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionClassifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(WindowFunction),
                Box::new(AggregateFunction),
                Box::new(CaseExpression),
                Box::new(Arithmetic),
                Box::new(DirectReference),
            ]
        }
    }

    /// Names of the rules in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Determine the output name and transform of a select field.
    pub fn classify_field(&self, field: &str) -> ClassifiedField {
        let (output_name, expr) = split_alias(field);
        ClassifiedField {
            output_name,
            classification: self.classify(expr)
        }
    }

    /// Classify an expression with no alias attached.
    pub fn classify(&self, expr: &str) -> Classification {
        let tokens = tokenize(expr);
        self.rules
            .iter()
            .find_map(|rule| rule.classify(expr, &tokens))
            .unwrap_or_else(|| Classification {
                kind:       TransformKind::Direct,
                source:     source_ref(&tokens),
                expression: None
            })
    }
}

/// Separate a trailing `AS name` from the expression.
///
/// Without `AS` the expression is the whole field and the name is its last
/// identifier.
pub fn split_alias(field: &str) -> (Option<CompactString>, &str) {
    let tokens = tokenize(field);
    if let [.., as_kw, alias] = tokens.as_slice()
        && as_kw.is_keyword("AS")
        && alias.is_identifier()
    {
        return (
            Some(CompactString::from(alias.text)),
            field[..as_kw.start].trim()
        );
    }
    let name = tokens
        .iter()
        .rev()
        .find(|t| t.is_identifier())
        .map(|t| CompactString::from(t.text));
    (name, field.trim())
}

/// First qualified reference (`t.col`, `db.t.col`), else first bare column.
pub fn source_ref(tokens: &[Token<'_>]) -> SourceRef {
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_identifier() || tokens.get(i + 1).map(|t| t.kind) != Some(TokenKind::Dot) {
            continue;
        }
        if i > 0 && tokens[i - 1].kind == TokenKind::Dot {
            continue;
        }
        if let Some((name, next)) = qualified_name(tokens, i) {
            let is_call = tokens.get(next).is_some_and(|t| t.kind == TokenKind::LParen);
            if let Some((table, column)) = name.rsplit_once('.')
                && !is_call
            {
                return SourceRef {
                    table:  Some(CompactString::from(table)),
                    column: Some(CompactString::from(column))
                };
            }
            let star_follows = tokens.get(next).is_some_and(|t| t.kind == TokenKind::Dot)
                && tokens.get(next + 1).is_some_and(|t| t.kind == TokenKind::Star);
            if star_follows {
                return SourceRef {
                    table:  Some(name),
                    column: Some(CompactString::from("*"))
                };
            }
        }
    }

    let bare = tokens.iter().enumerate().find(|(i, t)| {
        let next_kind = tokens.get(i + 1).map(|n| n.kind);
        t.is_identifier()
            && !matches!(next_kind, Some(TokenKind::LParen | TokenKind::Dot))
            && !(t.kind == TokenKind::Word
                && EXPRESSION_KEYWORDS
                    .iter()
                    .any(|k| t.text.eq_ignore_ascii_case(k)))
    });
    SourceRef {
        table:  None,
        column: bare.map(|(_, t)| CompactString::from(t.text))
    }
}

/// Index of the `(` following the first `name` word directly applied to it.
fn call_open(tokens: &[Token<'_>], name: &str) -> Option<usize> {
    tokens
        .windows(2)
        .position(|pair| pair[0].is_keyword(name) && pair[1].kind == TokenKind::LParen)
        .map(|i| i + 1)
}

/// Tokens between the `(` at `open` and its matching `)`, or to the end
/// when it is never closed.
fn call_arguments<'t, 'a>(tokens: &'t [Token<'a>], open: usize) -> &'t [Token<'a>] {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &tokens[open + 1..i];
                }
            }
            _ => {}
        }
    }
    tokens.get(open + 1..).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(field: &str) -> ClassifiedField {
        ExpressionClassifier::new().classify_field(field)
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            ExpressionClassifier::new().rule_names(),
            vec!["window", "aggregate", "case", "arithmetic", "direct"]
        );
    }

    #[test]
    fn test_direct_qualified_column() {
        let field = classify("a.dt");
        assert_eq!(field.output_name.as_deref(), Some("dt"));
        assert_eq!(field.classification.kind, TransformKind::Direct);
        assert_eq!(field.classification.source.table.as_deref(), Some("a"));
        assert_eq!(field.classification.source.column.as_deref(), Some("dt"));
        assert!(field.classification.expression.is_none());
    }

    #[test]
    fn test_direct_fully_qualified_column() {
        let field = classify("dwd.orders.amount AS amt");
        assert_eq!(field.output_name.as_deref(), Some("amt"));
        assert_eq!(
            field.classification.source.table.as_deref(),
            Some("dwd.orders")
        );
        assert_eq!(
            field.classification.source.column.as_deref(),
            Some("amount")
        );
    }

    #[test]
    fn test_sum_with_alias() {
        let field = classify("SUM(a.amt) AS td_amt");
        assert_eq!(field.output_name.as_deref(), Some("td_amt"));
        assert_eq!(field.classification.kind, TransformKind::Sum);
        assert_eq!(field.classification.source.table.as_deref(), Some("a"));
        assert_eq!(field.classification.source.column.as_deref(), Some("amt"));
        assert_eq!(
            field.classification.expression.as_deref(),
            Some("SUM(a.amt)")
        );
    }

    #[test]
    fn test_count_distinct_argument() {
        let field = classify("count(distinct a.loan_id) AS cnt");
        assert_eq!(field.classification.kind, TransformKind::Count);
        assert_eq!(
            field.classification.source.column.as_deref(),
            Some("loan_id")
        );
    }

    #[test]
    fn test_count_star_has_no_source() {
        let field = classify("COUNT(*) AS n");
        assert_eq!(field.classification.kind, TransformKind::Count);
        assert_eq!(field.classification.source, SourceRef::default());
    }

    #[test]
    fn test_window_over_aggregate_is_custom() {
        let field = classify("SUM(a.amt) OVER (PARTITION BY a.id ORDER BY a.dt) AS running");
        assert_eq!(field.output_name.as_deref(), Some("running"));
        assert_eq!(field.classification.kind, TransformKind::Custom);
        assert_eq!(field.classification.source, SourceRef::default());
        assert!(field.classification.expression.is_some());
    }

    #[test]
    fn test_aggregate_wrapping_case_uses_inner_column() {
        let field =
            classify("SUM(CASE WHEN a.status = 'OK' THEN 1 ELSE 0 END) AS ok_cnt");
        assert_eq!(field.classification.kind, TransformKind::Sum);
        assert_eq!(field.classification.source.column.as_deref(), Some("status"));
    }

    #[test]
    fn test_aggregate_beats_arithmetic() {
        let field = classify("SUM(a.x) / NULLIF(COUNT(DISTINCT a.id), 0) AS avg_x");
        assert_eq!(field.classification.kind, TransformKind::Sum);
        assert_eq!(field.classification.source.column.as_deref(), Some("x"));
    }

    #[test]
    fn test_case_expression() {
        let field = classify("CASE WHEN a.x > 0 THEN 'pos' ELSE 'neg' END AS sign");
        assert_eq!(field.classification.kind, TransformKind::Case);
        assert_eq!(
            field.classification.expression.as_deref(),
            Some("CASE WHEN a.x > 0 THEN 'pos' ELSE 'neg' END")
        );
    }

    #[test]
    fn test_arithmetic_is_custom() {
        let field = classify("a.x * 100 AS pct");
        assert_eq!(field.classification.kind, TransformKind::Custom);
        assert_eq!(field.classification.source, SourceRef::default());
    }

    #[test]
    fn test_operator_inside_string_is_not_arithmetic() {
        let field = classify("'2024-01-01' AS start_dt");
        assert_eq!(field.classification.kind, TransformKind::Direct);
        assert_eq!(field.classification.source.column, None);
    }

    #[test]
    fn test_implicit_alias_uses_last_identifier() {
        let field = classify("MAX(b.updated_at) last_update");
        assert_eq!(field.output_name.as_deref(), Some("last_update"));
        assert_eq!(field.classification.kind, TransformKind::Max);
    }

    #[test]
    fn test_bare_column_skips_function_names() {
        let field = classify("NVL(amount, 0) AS amount");
        assert_eq!(field.classification.kind, TransformKind::Direct);
        assert_eq!(field.classification.source.table, None);
        assert_eq!(
            field.classification.source.column.as_deref(),
            Some("amount")
        );
    }

    #[test]
    fn test_literal_without_identifier() {
        let field = classify("1");
        assert_eq!(field.output_name, None);
        assert_eq!(field.classification.source, SourceRef::default());
    }

    #[test]
    fn test_qualified_star() {
        let field = classify("a.*");
        assert_eq!(field.classification.kind, TransformKind::Direct);
        assert_eq!(field.classification.source.table.as_deref(), Some("a"));
        assert_eq!(field.classification.source.column.as_deref(), Some("*"));
    }

    #[test]
    fn test_min_and_avg() {
        assert_eq!(classify("MIN(t.v) lo").classification.kind, TransformKind::Min);
        assert_eq!(classify("avg(t.v) mean_v").classification.kind, TransformKind::Avg);
    }

    #[test]
    fn test_call_arguments_balance_parens() {
        let texts = |sql: &str| -> Vec<String> {
            let tokens = tokenize(sql);
            call_arguments(&tokens, 1).iter().map(|t| t.text.to_string()).collect()
        };
        assert_eq!(texts("SUM(COALESCE(a, 0)) x"), ["COALESCE", "(", "a", ",", "0", ")"]);
        assert_eq!(texts("SUM(a"), ["a"]);
    }

    #[test]
    fn test_function_names_inside_strings_are_ignored() {
        let field = classify("CONCAT('sum(', a.x) AS label");
        assert_eq!(field.output_name.as_deref(), Some("label"));
        assert_eq!(field.classification.kind, TransformKind::Direct);
        assert_eq!(field.classification.source.table.as_deref(), Some("a"));
        assert_eq!(field.classification.source.column.as_deref(), Some("x"));

        let field = classify("CONCAT(a.y, ' over (') AS note");
        assert_eq!(field.classification.kind, TransformKind::Direct);
        assert_eq!(field.classification.source.column.as_deref(), Some("y"));
    }

    #[test]
    fn test_aggregate_name_needs_a_call() {
        let field = classify("a.sum AS total");
        assert_eq!(field.classification.kind, TransformKind::Direct);
        assert_eq!(field.classification.source.column.as_deref(), Some("sum"));
    }
}
