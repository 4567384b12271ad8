//! Path resolution over JSON values.
//!
//! Paths use a JSONPath-like syntax: `$.user.name`, `$.items[0].id`,
//! `$['odd key']`, and `[*]` (or `.*`) to select every element of a
//! collection. Reads never fail: anything that does not resolve is `None`.

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

/// Largest index a write may grow an array to.
const MAX_ARRAY_INDEX: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathSegment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// Parse a path into segments.
///
/// The leading `$` is optional and empty segments (`$..a`, trailing dots)
/// are skipped. Returns `None` for malformed brackets.
pub(crate) fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => flush_key(&mut current, &mut segments),
            '[' => {
                flush_key(&mut current, &mut segments);
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return None;
                }
                segments.push(parse_bracket(inner.trim())?);
            }
            c => current.push(c),
        }
    }
    flush_key(&mut current, &mut segments);

    Some(segments)
}

fn flush_key(current: &mut String, segments: &mut Vec<PathSegment>) {
    if current.is_empty() {
        return;
    }
    let key = std::mem::take(current);
    if key == "*" {
        segments.push(PathSegment::Wildcard);
    } else {
        segments.push(PathSegment::Key(key));
    }
}

fn parse_bracket(inner: &str) -> Option<PathSegment> {
    if inner == "*" {
        return Some(PathSegment::Wildcard);
    }
    for quote in ['\'', '"'] {
        if let Some(key) = inner
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return Some(PathSegment::Key(key.to_string()));
        }
    }
    inner.parse::<usize>().ok().map(PathSegment::Index)
}

/// Read the value at `path`.
///
/// A wildcard collects the matches of the remaining path under every element
/// into a list. Explicit JSON `null` at the path is a value, not an absence.
pub fn get(value: &JsonValue, path: &str) -> Option<JsonValue> {
    let segments = parse_path(path)?;
    resolve(value, &segments)
}

/// Whether anything (including `null`) is present at `path`.
pub fn contains(value: &JsonValue, path: &str) -> bool {
    get(value, path).is_some()
}

fn resolve(value: &JsonValue, segments: &[PathSegment]) -> Option<JsonValue> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    match head {
        PathSegment::Key(key) => {
            let next = match value {
                // "items.0" addresses array elements too
                JsonValue::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => value.get(key.as_str())?,
            };
            resolve(next, rest)
        }
        PathSegment::Index(idx) => resolve(value.get(*idx)?, rest),
        PathSegment::Wildcard => {
            let matches = match value {
                JsonValue::Array(items) => items.iter().filter_map(|v| resolve(v, rest)).collect(),
                JsonValue::Object(map) => map.values().filter_map(|v| resolve(v, rest)).collect(),
                _ => return None,
            };
            Some(JsonValue::Array(matches))
        }
    }
}

/// Write `value` at `path`, creating intermediate objects (or arrays, for
/// index segments) as needed.
///
/// Scalars in the way are replaced. An empty path (`$`) replaces the whole
/// target. Writes through wildcards or malformed paths are ignored.
pub fn set(target: &mut JsonValue, path: &str, value: JsonValue) {
    let Some(segments) = parse_path(path) else {
        debug!(path, "Ignoring write to malformed path");
        return;
    };
    if segments.contains(&PathSegment::Wildcard) {
        debug!(path, "Ignoring write through wildcard path");
        return;
    }
    set_segments(target, &segments, value);
}

fn set_segments(target: &mut JsonValue, segments: &[PathSegment], value: JsonValue) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    match head {
        PathSegment::Key(key) => {
            if !target.is_object() {
                *target = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(map) = target {
                let slot = map.entry(key.clone()).or_insert(JsonValue::Null);
                set_segments(slot, rest, value);
            }
        }
        PathSegment::Index(idx) => {
            if *idx > MAX_ARRAY_INDEX {
                debug!(index = idx, "Ignoring write past maximum array index");
                return;
            }
            if !target.is_array() {
                *target = JsonValue::Array(Vec::new());
            }
            if let JsonValue::Array(items) = target {
                if items.len() <= *idx {
                    items.resize(*idx + 1, JsonValue::Null);
                }
                set_segments(&mut items[*idx], rest, value);
            }
        }
        PathSegment::Wildcard => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path() {
        let segments = parse_path("$.user.profile.name").unwrap();
        assert_eq!(segments.len(), 3);

        let segments = parse_path("$.items[0].name").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Key("items".into()),
                PathSegment::Index(0),
                PathSegment::Key("name".into()),
            ]
        );

        assert!(parse_path("$").unwrap().is_empty());
        assert!(parse_path("").unwrap().is_empty());
        assert_eq!(parse_path("$..a.").unwrap(), vec![PathSegment::Key("a".into())]);
        assert_eq!(
            parse_path("$['first name']").unwrap(),
            vec![PathSegment::Key("first name".into())]
        );
        assert_eq!(
            parse_path("$.items[*].id").unwrap()[1],
            PathSegment::Wildcard
        );
        assert_eq!(parse_path("$.a.*").unwrap()[1], PathSegment::Wildcard);
        assert!(parse_path("$.items[0").is_none());
        assert!(parse_path("$.items[x]").is_none());
    }

    #[test]
    fn test_get_nested() {
        let value = json!({"user": {"name": "John", "tags": ["a", "b"]}, "n": null});

        assert_eq!(get(&value, "$.user.name"), Some(json!("John")));
        assert_eq!(get(&value, "$.user.tags[1]"), Some(json!("b")));
        assert_eq!(get(&value, "user.tags.0"), Some(json!("a")));
        assert_eq!(get(&value, "$"), Some(value.clone()));
        assert_eq!(get(&value, "$.n"), Some(JsonValue::Null));
        assert!(contains(&value, "$.n"));
    }

    #[test]
    fn test_get_is_fail_soft() {
        let value = json!({"user": {"name": "John"}});

        assert_eq!(get(&value, "$.user.missing"), None);
        assert_eq!(get(&value, "$.user.name.first"), None);
        assert_eq!(get(&value, "$.user[3]"), None);
        assert_eq!(get(&value, "$.user[oops"), None);
        assert_eq!(get(&JsonValue::Null, "$.anything"), None);
    }

    #[test]
    fn test_get_wildcard() {
        let value = json!({"items": [{"id": 1}, {"id": 2}, {"other": 3}]});

        assert_eq!(get(&value, "$.items[*].id"), Some(json!([1, 2])));
        assert_eq!(get(&value, "$.items[*]"), get(&value, "$.items"));
        assert_eq!(get(&json!([1, 2]), "$[*]"), Some(json!([1, 2])));
        assert_eq!(get(&json!({"a": 1, "b": 2}), "$.*"), Some(json!([1, 2])));
        assert_eq!(get(&json!({"items": 5}), "$.items[*]"), None);
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut target = json!({});
        set(&mut target, "$.customer.address.city", json!("Oslo"));
        set(&mut target, "$.lines[1].sku", json!("X-1"));

        assert_eq!(target["customer"]["address"]["city"], "Oslo");
        assert_eq!(target["lines"][0], JsonValue::Null);
        assert_eq!(target["lines"][1]["sku"], "X-1");
    }

    #[test]
    fn test_set_replaces_scalars_and_root() {
        let mut target = json!({"a": 5});
        set(&mut target, "$.a.b", json!(true));
        assert_eq!(target, json!({"a": {"b": true}}));

        set(&mut target, "$", json!([1]));
        assert_eq!(target, json!([1]));
    }

    #[test]
    fn test_set_ignores_wildcard_and_malformed() {
        let mut target = json!({"items": [1, 2]});
        set(&mut target, "$.items[*]", json!(0));
        set(&mut target, "$.items[", json!(0));
        assert_eq!(target, json!({"items": [1, 2]}));
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let values = [
            json!("text"),
            json!(12.5),
            json!(null),
            json!([1, {"x": 2}]),
            json!({"nested": {"deep": false}}),
        ];
        let paths = ["$.a", "$.a.b.c", "$.list[2].name", "$['odd key'].v", "plain"];

        for path in paths {
            for value in &values {
                let mut target = json!({});
                set(&mut target, path, value.clone());
                assert_eq!(get(&target, path).as_ref(), Some(value), "path {path}");
            }
        }
    }
}
