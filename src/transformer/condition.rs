//! Field rule conditions.

use super::catalog::display_string;
use super::path;
use serde_json::Value as JsonValue;

/// Compiled field rule condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `path == 'literal'`: string form of the value equals the literal
    Equals { path: String, expected: String },
    /// `path != 'literal'`
    NotEquals { path: String, expected: String },
    /// Bare path: the value is present and truthy
    Truthy { path: String },
}

impl Condition {
    /// Parse a condition expression.
    ///
    /// One pair of surrounding quotes (single or double) is stripped from each
    /// side of a comparison.
    pub fn parse(expr: &str) -> Self {
        let operator = ["==", "!="]
            .into_iter()
            .filter_map(|op| expr.find(op).map(|at| (at, op)))
            .min_by_key(|(at, _)| *at);

        match operator {
            Some((at, op)) => {
                let path = unquote(&expr[..at]).to_string();
                let expected = unquote(&expr[at + op.len()..]).to_string();
                if op == "==" {
                    Condition::Equals { path, expected }
                } else {
                    Condition::NotEquals { path, expected }
                }
            }
            None => Condition::Truthy {
                path: expr.trim().to_string(),
            },
        }
    }

    /// Evaluate against the source value. Missing paths never equal anything.
    pub fn evaluate(&self, source: &JsonValue) -> bool {
        match self {
            Condition::Equals { path, expected } => {
                path::get(source, path).is_some_and(|v| display_string(&v) == *expected)
            }
            Condition::NotEquals { path, expected } => {
                path::get(source, path).map_or(true, |v| display_string(&v) != *expected)
            }
            Condition::Truthy { path } => path::get(source, path).is_some_and(|v| is_truthy(&v)),
        }
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_prefix(['\'', '"']).unwrap_or(s);
    s.strip_suffix(['\'', '"']).unwrap_or(s)
}

/// `null`, `false`, `0`, and `""` are falsy. Containers are always truthy.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}
