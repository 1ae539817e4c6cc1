//! SQL text normalization.
//!
//! Every later stage scans a compact form of the script: the text is lexed
//! with [`crate::scanner::lex`], comments are dropped and the whitespace
//! between tokens collapses to one space. Literal text is kept verbatim, so
//! `--` or `/*` inside a string survives.
//!
//! # Example
//!
//! ```
//! use sql_lineage_analyzer::normalize::normalize;
//!
//! let sql = "SELECT a, -- first\n  b /* second */ FROM t";
//! let normalized = normalize(sql);
//! assert_eq!(normalized.sql, "SELECT a, b FROM t");
//! assert!(normalized.error.is_none());
//! ```
//!
//! Normalization never fails. When the tokenizer stops on malformed input
//! (an unterminated string or block comment) the text lexed up to that point
//! is returned together with the tokenizer message.

use crate::scanner::lex;

/// Normalized SQL and the lexing error that truncated it, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub sql:   String,
    pub error: Option<String>
}

/// Strip comments and collapse whitespace between tokens.
#[must_use]
pub fn normalize(sql: &str) -> Normalized {
    let lexed = lex(sql);
    let mut out = String::with_capacity(sql.len());
    let mut previous_end = None;
    for token in &lexed.tokens {
        if previous_end.is_some_and(|end| end < token.start) {
            out.push(' ');
        }
        out.push_str(&sql[token.start..token.end]);
        previous_end = Some(token.end);
    }
    Normalized {
        sql:   out,
        error: lexed.error
    }
}
