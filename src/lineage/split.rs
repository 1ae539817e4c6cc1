//! Top-level splitting of a `SELECT` list into field expressions.

use crate::scanner::{TokenKind, tokenize};

/// Fields of a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectFields<'a> {
    /// A bare `SELECT *`; column lineage is not derived for it
    Star,
    Fields(Vec<&'a str>)
}

/// Classify a select list as `*` or a list of field expressions.
pub fn split_select(select_list: &str) -> SelectFields<'_> {
    if select_list.trim() == "*" {
        SelectFields::Star
    } else {
        SelectFields::Fields(split_fields(select_list))
    }
}

/// Split on commas that sit outside parentheses and string literals.
///
/// `SUM(a, b) AS x, y` yields `["SUM(a, b) AS x", "y"]`. Fields are trimmed.
/// Empty fields (`a, , b` or a trailing comma) are kept as `""` so the caller
/// can report them; a blank list yields no fields at all.
pub fn split_fields(select_list: &str) -> Vec<&str> {
    if select_list.trim().is_empty() {
        return Vec::new();
    }
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut field_start = 0;

    for token in tokenize(select_list) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                fields.push(select_list[field_start..token.start].trim());
                field_start = token.end;
            }
            _ => {}
        }
    }
    fields.push(select_list[field_start..].trim());
    fields
}
