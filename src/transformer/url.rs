//! Target URL and query parameter resolution.

use super::catalog::display_string;
use super::path;
use regex::{Captures, Regex};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Matches `{name}` and `:name` placeholders in URL templates.
static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}|:([A-Za-z_][A-Za-z0-9_]*)")
        .expect("placeholder pattern is valid")
});

/// Fill URL placeholders from the payload.
///
/// `path_params` maps placeholder names to payload paths. Resolved values are
/// percent-encoded; placeholders that resolve to nothing become empty, and
/// placeholders without a `path_params` entry are left as written.
pub fn resolve_url(
    template: &str,
    path_params: &HashMap<String, String>,
    payload: &JsonValue,
) -> String {
    if path_params.is_empty() {
        return template.to_string();
    }

    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            match path_params.get(name) {
                Some(expr) => path::get(payload, expr)
                    .map(|value| urlencoding::encode(&display_string(&value)).into_owned())
                    .unwrap_or_default(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Merge static and caller query parameters and resolve them against the
/// payload.
///
/// Caller parameters win on key collision. String values starting with `$.`
/// or `$[` are payload paths; those resolving to nothing are dropped, and
/// list results expand into repeated keys. `null` values are dropped.
pub fn resolve_query(
    static_params: &Map<String, JsonValue>,
    caller_params: &Map<String, JsonValue>,
    payload: &JsonValue,
) -> Vec<(String, String)> {
    let mut merged = static_params.clone();
    for (key, value) in caller_params {
        merged.insert(key.clone(), value.clone());
    }

    let mut pairs = Vec::with_capacity(merged.len());
    for (key, value) in merged {
        let value = match value {
            JsonValue::String(expr) if is_path_expression(&expr) => {
                match path::get(payload, &expr) {
                    Some(resolved) => resolved,
                    None => continue,
                }
            }
            other => other,
        };
        match value {
            JsonValue::Null => {}
            JsonValue::Array(items) => pairs.extend(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| (key.clone(), display_string(item))),
            ),
            other => pairs.push((key, display_string(&other))),
        }
    }
    pairs
}

fn is_path_expression(value: &str) -> bool {
    value.starts_with("$.") || value.starts_with("$[")
}

/// Append percent-encoded query pairs to a URL.
pub fn append_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_string();
    }

    let query_string = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query_string}")
}
