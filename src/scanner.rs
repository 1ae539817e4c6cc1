//! Tokenizer and clause scanner for batch-load statements.
//!
//! The scanner recognizes only the clause boundaries lineage extraction
//! needs: the `INSERT` target, the first `FROM` source, every `JOIN`, and the
//! `SELECT` list. Lexing is done by the `sqlparser` tokenizer; the matcher
//! works on the flat token stream with explicit parenthesis tracking instead
//! of backtracking regular expressions, so input size bounds the work done.
//!
//! # Architecture
//!
//! ```text
//! normalized SQL ──▶ lex (sqlparser) ──▶ [Token] ──▶ TokenScanner
//!                                               ├─ target()      INSERT OVERWRITE TABLE / INSERT INTO
//!                                               ├─ sources()     FROM + [LEFT|RIGHT|INNER|FULL] JOIN ... ON ...
//!                                               └─ select_list() SELECT ... <top-level FROM>
//! ```
//!
//! Other scanning strategies plug in through the [`ClauseScanner`] trait.
//!
//! # Example
//!
//! ```
//! use sql_lineage_analyzer::{
//!     lineage::JoinKind,
//!     scanner::{ClauseScanner, TokenScanner}
//! };
//!
//! let sql = "INSERT INTO dm.t SELECT a.x FROM ods.a a LEFT JOIN ods.b b ON a.id = b.id";
//! let scanner = TokenScanner;
//!
//! assert_eq!(scanner.target(sql).unwrap().table, "dm.t");
//! let sources = scanner.sources(sql);
//! assert_eq!(sources[1].join_kind, JoinKind::Left);
//! assert_eq!(sources[1].join_condition.as_deref(), Some("a.id = b.id"));
//! assert_eq!(scanner.select_list(sql), Some("a.x"));
//! ```

use std::{iter::Peekable, str::CharIndices};

use compact_str::CompactString;
use sqlparser::{
    dialect::{Dialect, HiveDialect},
    tokenizer::{Location, Token as SqlToken, TokenWithSpan, Tokenizer}
};

use crate::lineage::{JoinKind, TableLineage};

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword
    Word,
    /// Backtick-quoted identifier, `text` excludes the backticks
    QuotedIdent,
    /// String literal, `text` keeps the quotes
    Str,
    Number,
    /// Template variable such as `${hivevar:dt}`
    Variable,
    LParen,
    RParen,
    Comma,
    Dot,
    Star,
    Semicolon,
    Operator,
    Other
}

/// A token borrowed from the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind:  TokenKind,
    pub text:  &'a str,
    /// Byte offset of the first character, quotes included
    pub start: usize,
    /// Byte offset one past the last character, quotes included
    pub end:   usize
}

impl Token<'_> {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

/// Hive lexing rules for batch scripts.
///
/// Differs from [`HiveDialect`] in three places: `"` opens a string literal
/// rather than an identifier, backslash escapes are honored inside strings,
/// and identifiers may start with `_` or a non-ASCII letter.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiveScriptDialect;

impl Dialect for HiveScriptDialect {
    fn is_delimited_identifier_start(&self, ch: char) -> bool {
        ch == '`'
    }

    fn is_identifier_start(&self, ch: char) -> bool {
        HiveDialect {}.is_identifier_start(ch)
            || ch == '_'
            || (!ch.is_ascii() && ch.is_alphabetic())
    }

    fn is_identifier_part(&self, ch: char) -> bool {
        HiveDialect {}.is_identifier_part(ch) || (!ch.is_ascii() && ch.is_alphanumeric())
    }

    fn supports_numeric_prefix(&self) -> bool {
        true
    }

    fn supports_string_literal_backslash_escape(&self) -> bool {
        true
    }
}

/// Tokens of a script plus the reason lexing stopped early, if it did.
#[derive(Debug, Clone, Default)]
pub struct Lexed<'a> {
    /// Everything lexed before the error; whitespace and comments removed
    pub tokens: Vec<Token<'a>>,
    pub error:  Option<String>
}

/// Lex SQL text with [`HiveScriptDialect`].
///
/// Never fails. On a tokenizer error the tokens read so far are kept and the
/// error message is returned alongside them.
pub fn lex(sql: &str) -> Lexed<'_> {
    let mut raw = Vec::new();
    let error = Tokenizer::new(&HiveScriptDialect, sql)
        .with_unescape(false)
        .tokenize_with_location_into_buf(&mut raw)
        .err()
        .map(|e| e.to_string());

    let mut offsets = ByteOffsets::new(sql);
    let mut tokens: Vec<Token<'_>> = Vec::with_capacity(raw.len());
    for TokenWithSpan {
        token,
        span
    } in &raw
    {
        let start = offsets.at(span.start);
        let end = offsets.at(span.end);
        let Some(kind) = token_kind(token) else {
            continue;
        };
        push_token(&mut tokens, sql, kind, start, end);
    }

    Lexed {
        tokens,
        error
    }
}

/// Lex SQL text, dropping whitespace and comments.
///
/// A tokenizer error truncates the stream; see [`lex`] for the error itself.
pub fn tokenize(sql: &str) -> Vec<Token<'_>> {
    lex(sql).tokens
}

fn token_kind(token: &SqlToken) -> Option<TokenKind> {
    let kind = match token {
        SqlToken::EOF | SqlToken::Whitespace(_) => return None,
        SqlToken::Word(word) if word.quote_style.is_some() => TokenKind::QuotedIdent,
        SqlToken::Word(_) => TokenKind::Word,
        SqlToken::Number(..) => TokenKind::Number,
        SqlToken::Placeholder(_) => TokenKind::Variable,
        SqlToken::SingleQuotedString(_)
        | SqlToken::DoubleQuotedString(_)
        | SqlToken::TripleSingleQuotedString(_)
        | SqlToken::TripleDoubleQuotedString(_)
        | SqlToken::DollarQuotedString(_)
        | SqlToken::SingleQuotedByteStringLiteral(_)
        | SqlToken::DoubleQuotedByteStringLiteral(_)
        | SqlToken::TripleSingleQuotedByteStringLiteral(_)
        | SqlToken::TripleDoubleQuotedByteStringLiteral(_)
        | SqlToken::SingleQuotedRawStringLiteral(_)
        | SqlToken::DoubleQuotedRawStringLiteral(_)
        | SqlToken::TripleSingleQuotedRawStringLiteral(_)
        | SqlToken::TripleDoubleQuotedRawStringLiteral(_)
        | SqlToken::NationalStringLiteral(_)
        | SqlToken::EscapedStringLiteral(_)
        | SqlToken::UnicodeStringLiteral(_)
        | SqlToken::HexStringLiteral(_) => TokenKind::Str,
        SqlToken::LParen => TokenKind::LParen,
        SqlToken::RParen => TokenKind::RParen,
        SqlToken::Comma => TokenKind::Comma,
        SqlToken::Period => TokenKind::Dot,
        SqlToken::Mul => TokenKind::Star,
        SqlToken::SemiColon => TokenKind::Semicolon,
        SqlToken::Char(_)
        | SqlToken::Backslash
        | SqlToken::LBracket
        | SqlToken::RBracket
        | SqlToken::LBrace
        | SqlToken::RBrace => TokenKind::Other,
        _ => TokenKind::Operator
    };
    Some(kind)
}

/// Append a token, folding the pieces of `${ns:name}` into one variable.
fn push_token<'a>(
    tokens: &mut Vec<Token<'a>>,
    sql: &'a str,
    kind: TokenKind,
    start: usize,
    end: usize
) {
    if let Some(last) = tokens.last_mut()
        && last.kind == TokenKind::Variable
        && last.end == start
        && !last.text.contains('}')
    {
        last.end = end;
        last.text = &sql[last.start..end];
        return;
    }
    let raw = &sql[start..end];
    let (kind, text) = match kind {
        TokenKind::Word if raw.starts_with("${") => (TokenKind::Variable, raw),
        TokenKind::QuotedIdent if raw.len() >= 2 && raw.ends_with('`') => {
            (kind, &raw[1..raw.len() - 1])
        }
        TokenKind::QuotedIdent => (kind, raw.get(1..).unwrap_or_default()),
        _ => (kind, raw)
    };
    tokens.push(Token {
        kind,
        text,
        start,
        end
    });
}

/// Converts tokenizer line/column locations into byte offsets.
///
/// Locations must be requested in non-decreasing order, which token spans
/// are, so a whole script is walked once.
struct ByteOffsets<'a> {
    len:    usize,
    chars:  Peekable<CharIndices<'a>>,
    line:   u64,
    column: u64
}

impl<'a> ByteOffsets<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            len:    sql.len(),
            chars:  sql.char_indices().peekable(),
            line:   1,
            column: 1
        }
    }

    fn at(&mut self, location: Location) -> usize {
        while (self.line, self.column) < (location.line, location.column) {
            match self.chars.next() {
                Some((_, '\n')) => {
                    self.line += 1;
                    self.column = 1;
                }
                Some(_) => self.column += 1,
                None => break
            }
        }
        self.chars.peek().map_or(self.len, |&(i, _)| i)
    }
}

/// Read `name` or `db.name` (any number of dotted parts) starting at `idx`.
///
/// Returns the joined name and the index of the first token after it.
pub fn qualified_name(tokens: &[Token<'_>], idx: usize) -> Option<(CompactString, usize)> {
    let first = tokens.get(idx)?;
    if !first.is_identifier() || is_clause_keyword(first) {
        return None;
    }
    let mut name = CompactString::from(first.text);
    let mut next = idx + 1;
    while let (Some(dot), Some(part)) = (tokens.get(next), tokens.get(next + 1)) {
        if dot.kind != TokenKind::Dot || !part.is_identifier() {
            break;
        }
        name.push('.');
        name.push_str(part.text);
        next += 2;
    }
    Some((name, next))
}

fn alias_at(tokens: &[Token<'_>], idx: usize) -> (Option<CompactString>, usize) {
    let (candidate, next) = match tokens.get(idx) {
        Some(t) if t.is_keyword("AS") => (tokens.get(idx + 1), idx + 1),
        other => (other, idx)
    };
    match candidate {
        Some(t) if t.is_identifier() && !is_clause_keyword(t) => {
            (Some(CompactString::from(t.text)), next + 1)
        }
        _ => (None, next)
    }
}

/// The `INSERT` target of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetClause {
    pub table:             CompactString,
    /// Columns named in a `PARTITION (...)` spec following the target
    pub partition_columns: Vec<CompactString>
}

/// Clause-boundary recognition used by the extraction pipeline.
///
/// Implementations receive normalized SQL (see [`crate::normalize`]) and
/// must never fail: unrecognized input yields `None` or an empty list.
pub trait ClauseScanner: Send + Sync {
    /// Target table of `INSERT OVERWRITE TABLE t` (preferred) or
    /// `INSERT INTO [TABLE] t`.
    fn target(&self, sql: &str) -> Option<TargetClause>;

    /// The first `FROM` table and every `JOIN` table, in order of appearance.
    fn sources(&self, sql: &str) -> Vec<TableLineage>;

    /// Text between `SELECT` and its top-level `FROM`, trimmed.
    fn select_list<'a>(&self, sql: &'a str) -> Option<&'a str>;
}

/// Recursive clause matcher over [`tokenize`] output.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenScanner;

impl ClauseScanner for TokenScanner {
    fn target(&self, sql: &str) -> Option<TargetClause> {
        let tokens = tokenize(sql);
        find_insert_target(&tokens, true).or_else(|| find_insert_target(&tokens, false))
    }

    fn sources(&self, sql: &str) -> Vec<TableLineage> {
        let tokens = tokenize(sql);
        let mut found: Vec<(usize, TableLineage)> = Vec::new();
        if let Some(from) = first_from_source(&tokens) {
            found.push(from);
        }
        found.extend(join_sources(&tokens, sql));
        found.sort_by_key(|(position, _)| *position);
        found.into_iter().map(|(_, lineage)| lineage).collect()
    }

    fn select_list<'a>(&self, sql: &'a str) -> Option<&'a str> {
        let tokens = tokenize(sql);
        let select = tokens.iter().position(|t| t.is_keyword("SELECT"))?;
        let mut first = select + 1;
        while tokens
            .get(first)
            .is_some_and(|t| t.is_keyword("DISTINCT") || t.is_keyword("ALL"))
        {
            first += 1;
        }
        let mut depth = 0i32;
        for token in &tokens[first.min(tokens.len())..] {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth < 0 {
                        return None;
                    }
                }
                _ if depth == 0 && token.is_keyword("FROM") => {
                    let start = tokens.get(first)?.start;
                    return Some(sql[start..token.start].trim());
                }
                _ => {}
            }
        }
        None
    }
}

fn find_insert_target(tokens: &[Token<'_>], overwrite: bool) -> Option<TargetClause> {
    let keyword = |idx: usize, kw: &str| tokens.get(idx).is_some_and(|t| t.is_keyword(kw));
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_keyword("INSERT") {
            continue;
        }
        let name_at = if overwrite {
            if !(keyword(i + 1, "OVERWRITE") && keyword(i + 2, "TABLE")) {
                continue;
            }
            i + 3
        } else {
            if !keyword(i + 1, "INTO") {
                continue;
            }
            if keyword(i + 2, "TABLE") { i + 3 } else { i + 2 }
        };
        if let Some((table, next)) = qualified_name(tokens, name_at) {
            return Some(TargetClause {
                table,
                partition_columns: partition_columns(tokens, next)
            });
        }
    }
    None
}

fn partition_columns(tokens: &[Token<'_>], idx: usize) -> Vec<CompactString> {
    let opens = tokens.get(idx).is_some_and(|t| t.is_keyword("PARTITION"))
        && tokens
            .get(idx + 1)
            .is_some_and(|t| t.kind == TokenKind::LParen);
    if !opens {
        return Vec::new();
    }
    let mut columns = Vec::new();
    let mut depth = 1;
    let mut expect_name = true;
    for token in &tokens[idx + 2..] {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            TokenKind::Comma if depth == 1 => {
                expect_name = true;
                continue;
            }
            _ if depth == 1 && expect_name && token.is_identifier() => {
                columns.push(CompactString::from(token.text));
            }
            _ => {}
        }
        expect_name = false;
    }
    columns
}

/// First `FROM <table>`, preferring the outermost query level.
fn first_from_source(tokens: &[Token<'_>]) -> Option<(usize, TableLineage)> {
    let mut depth = 0i32;
    let mut nested = None;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            _ if token.is_keyword("FROM") => {
                if let Some((table, next)) = qualified_name(tokens, i + 1) {
                    let (alias, _) = alias_at(tokens, next);
                    let lineage = TableLineage {
                        source_table: table,
                        alias,
                        join_kind: JoinKind::From,
                        join_condition: None
                    };
                    if depth == 0 {
                        return Some((i, lineage));
                    }
                    if nested.is_none() {
                        nested = Some((i, lineage));
                    }
                }
            }
            _ => {}
        }
    }
    nested
}

fn join_sources(tokens: &[Token<'_>], sql: &str) -> Vec<(usize, TableLineage)> {
    let mut found = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_keyword("JOIN") {
            continue;
        }
        let mut before = i.checked_sub(1);
        if let Some(p) = before
            && tokens[p].is_keyword("OUTER")
        {
            before = p.checked_sub(1);
        }
        let qualifier = before
            .map(|p| &tokens[p])
            .filter(|t| JOIN_QUALIFIERS.iter().any(|q| t.is_keyword(q)))
            .map(|t| t.text);
        let Some((table, next)) = qualified_name(tokens, i + 1) else {
            continue;
        };
        let (alias, next) = alias_at(tokens, next);
        let join_condition = if tokens.get(next).is_some_and(|t| t.is_keyword("ON")) {
            join_condition(tokens, sql, next + 1)
        } else {
            None
        };
        found.push((
            i,
            TableLineage {
                source_table: table,
                alias,
                join_kind: JoinKind::from_qualifier(qualifier),
                join_condition
            }
        ));
    }
    found
}

/// Text of a join condition, stopping at the next clause keyword.
fn join_condition(tokens: &[Token<'_>], sql: &str, start: usize) -> Option<String> {
    let mut depth = 0i32;
    let mut last = None;
    for (offset, token) in tokens.get(start..)?.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            TokenKind::Semicolon => break,
            _ => {
                let is_call = tokens
                    .get(start + offset + 1)
                    .is_some_and(|t| t.kind == TokenKind::LParen);
                if depth == 0 && is_clause_keyword(token) && !is_call {
                    break;
                }
            }
        }
        last = Some(token);
    }
    let first = tokens.get(start)?;
    let text = sql[first.start..last?.end].trim();
    (!text.is_empty()).then(|| text.to_string())
}
