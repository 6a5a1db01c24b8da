//! Canonical string form of property values
//!
//! Values are compared as strings against expectations such as `"^$"` or
//! `"LAMBDA"`, so every value expression is rendered the same way regardless
//! of how it was spelled in the test.

use crate::ast::{Expr, Literal, LiteralKind};

/// Separator between the elements of an array-valued property
pub const ARRAY_SEPARATOR: &str = ",";

/// Render a value expression in its canonical form.
///
/// Never fails: shapes without a structured rendering degrade to source text.
#[must_use]
pub fn canonicalize(expr: &Expr) -> String {
    match expr {
        Expr::Literal(literal) => literal_text(literal),
        Expr::Name(name) => name.clone(),
        Expr::Field { name, .. } => name.clone(),
        Expr::Array(items) => join_values(items),
        Expr::New { type_name, args } => format!("new {type_name}({})", render_args(args)),
        Expr::Call {
            receiver,
            method,
            args,
        } => match receiver {
            Some(receiver) => format!("{}.{method}({})", render(receiver), render_args(args)),
            None => format!("{method}({})", render_args(args)),
        },
        Expr::Other(text) => text.trim().to_string(),
    }
}

/// Canonical forms of `items` joined with [`ARRAY_SEPARATOR`], in order
#[must_use]
pub fn join_values(items: &[Expr]) -> String {
    items
        .iter()
        .map(canonicalize)
        .collect::<Vec<_>>()
        .join(ARRAY_SEPARATOR)
}

fn literal_text(literal: &Literal) -> String {
    match literal.kind {
        LiteralKind::Str => strip_quotes(&literal.text, &["\"\"\"", "'''", "\"", "'"]),
        LiteralKind::Char => strip_quotes(&literal.text, &["'"]),
        LiteralKind::Text
        | LiteralKind::Number | LiteralKind::Bool | LiteralKind::Null => literal.text.clone(),
    }
}

fn strip_quotes(text: &str, quotes: &[&str]) -> String {
    for quote in quotes {
        if text.len() >= 2 * quote.len() && text.starts_with(quote) && text.ends_with(quote) {
            return text[quote.len()..text.len() - quote.len()].to_string();
        }
    }
    text.to_string()
}

// Source-like rendering for expressions nested inside calls.
fn render(expr: &Expr) -> String {
    match expr {
        Expr::Literal(Literal {
            kind: LiteralKind::Text,
            text,
        }) => format!("{text:?}"),
        Expr::Literal(literal) => literal.text.clone(),
        Expr::Field { receiver, name } => format!("{}.{name}", render(receiver)),
        Expr::Array(items) => format!(
            "{{{}}}",
            items.iter().map(render).collect::<Vec<_>>().join(", ")
        ),
        other => canonicalize(other),
    }
}

fn render_args(args: &[Expr]) -> String {
    args.iter().map(render).collect::<Vec<_>>().join(", ")
}
