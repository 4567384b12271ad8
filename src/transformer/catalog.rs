//! Built-in value transforms and the registry of custom transform functions.

use super::TransformError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Number, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Signature of a registered custom transform.
pub type TransformFn = dyn Fn(&JsonValue) -> anyhow::Result<JsonValue> + Send + Sync;

/// Built-in transforms, addressable by name from field rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTransform {
    RoundTo2,
    Uppercase,
    Lowercase,
    ToNumber,
    ToString,
}

impl BuiltinTransform {
    pub const ALL: [BuiltinTransform; 5] = [
        BuiltinTransform::RoundTo2,
        BuiltinTransform::Uppercase,
        BuiltinTransform::Lowercase,
        BuiltinTransform::ToNumber,
        BuiltinTransform::ToString,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinTransform::RoundTo2 => "roundTo2",
            BuiltinTransform::Uppercase => "uppercase",
            BuiltinTransform::Lowercase => "lowercase",
            BuiltinTransform::ToNumber => "toNumber",
            BuiltinTransform::ToString => "toString",
        }
    }

    /// Apply the transform. Values of the wrong kind pass through unchanged.
    pub fn apply(self, value: &JsonValue) -> JsonValue {
        match self {
            BuiltinTransform::RoundTo2 => round_to_2(value),
            BuiltinTransform::Uppercase => map_str(value, str::to_uppercase),
            BuiltinTransform::Lowercase => map_str(value, str::to_lowercase),
            BuiltinTransform::ToNumber => to_number(value),
            BuiltinTransform::ToString => JsonValue::String(display_string(value)),
        }
    }
}

fn round_to_2(value: &JsonValue) -> JsonValue {
    let JsonValue::Number(n) = value else {
        return value.clone();
    };
    if !n.is_f64() {
        return value.clone();
    }
    // Shortest decimal form of the float, so 100.555 is rounded as written
    let text = n.to_string();
    let Ok(decimal) = Decimal::from_str_exact(&text).or_else(|_| Decimal::from_scientific(&text))
    else {
        return value.clone();
    };
    decimal
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| value.clone(), JsonValue::Number)
}

fn map_str(value: &JsonValue, f: impl Fn(&str) -> String) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(f(s)),
        other => other.clone(),
    }
}

fn to_number(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Number(_) => value.clone(),
        JsonValue::Bool(b) => JsonValue::from(u8::from(*b)),
        JsonValue::Null => JsonValue::from(0),
        JsonValue::String(s) => parse_number(s.trim()),
        JsonValue::Array(_) | JsonValue::Object(_) => JsonValue::Null,
    }
}

/// Parse numeric text; integers stay integral, garbage becomes `null`.
fn parse_number(s: &str) -> JsonValue {
    if s.is_empty() {
        return JsonValue::from(0);
    }
    if let Ok(i) = s.parse::<i64>() {
        return JsonValue::from(i);
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(JsonValue::Null, JsonValue::Number)
}

/// String form of a value: strings unquoted, scalars as written, containers
/// as compact JSON.
pub(crate) fn display_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

/// Registry of custom transform functions.
///
/// Functions are registered by the host at startup and referenced by name
/// from mapping documents, either directly in a field rule's `transform`, via
/// a document's `transforms` table, or as the `logic` of a CUSTOM mapping.
#[derive(Clone, Default)]
pub struct TransformCatalog {
    functions: HashMap<String, Arc<TransformFn>>,
}

impl TransformCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&JsonValue) -> anyhow::Result<JsonValue> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&JsonValue) -> anyhow::Result<JsonValue> + Send + Sync + 'static,
    {
        self.register(name, f);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Run a registered function. Errors and panics become
    /// [`TransformError::CustomLogic`].
    pub fn invoke(&self, name: &str, input: &JsonValue) -> Result<JsonValue, TransformError> {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| TransformError::UnknownLogic(name.to_string()))?;

        match panic::catch_unwind(AssertUnwindSafe(|| f(input))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TransformError::CustomLogic(format!("{e:#}"))),
            Err(payload) => Err(TransformError::CustomLogic(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for TransformCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("TransformCatalog")
            .field("functions", &names)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "transform panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(
            BuiltinTransform::from_name("roundTo2"),
            Some(BuiltinTransform::RoundTo2)
        );
        assert_eq!(BuiltinTransform::from_name("RoundTo2"), None);
        for t in BuiltinTransform::ALL {
            assert_eq!(BuiltinTransform::from_name(t.name()), Some(t));
        }
    }

    #[test]
    fn test_round_to_2() {
        let round = |v: JsonValue| BuiltinTransform::RoundTo2.apply(&v);
        assert_eq!(round(json!(100.555)), json!(100.56));
        assert_eq!(round(json!(0.285)), json!(0.29));
        assert_eq!(round(json!(1.004)), json!(1.0));
        assert_eq!(round(json!(-2.345)), json!(-2.35));
        assert_eq!(round(json!(30000000000000.01)), json!(30000000000000.01));
        assert_eq!(round(json!(1e-7)), json!(0.0));
        assert_eq!(round(json!(1e300)), json!(1e300));
        assert_eq!(round(json!(42)), json!(42));
        assert_eq!(round(json!("12.345")), json!("12.345"));
    }

    #[test]
    fn test_case_transforms() {
        assert_eq!(BuiltinTransform::Uppercase.apply(&json!("no")), json!("NO"));
        assert_eq!(BuiltinTransform::Lowercase.apply(&json!("ÆBC")), json!("æbc"));
        assert_eq!(BuiltinTransform::Uppercase.apply(&json!(7)), json!(7));
    }

    #[test]
    fn test_to_number() {
        let num = |v: JsonValue| BuiltinTransform::ToNumber.apply(&v);
        assert_eq!(num(json!("42")), json!(42));
        assert_eq!(num(json!(" 3.5 ")), json!(3.5));
        assert_eq!(num(json!("")), json!(0));
        assert_eq!(num(json!("abc")), JsonValue::Null);
        assert_eq!(num(json!("NaN")), JsonValue::Null);
        assert_eq!(num(json!(true)), json!(1));
        assert_eq!(num(json!(9.25)), json!(9.25));
        assert_eq!(num(json!({"a": 1})), JsonValue::Null);
    }

    #[test]
    fn test_to_string() {
        let s = |v: JsonValue| BuiltinTransform::ToString.apply(&v);
        assert_eq!(s(json!(12)), json!("12"));
        assert_eq!(s(json!(1.5)), json!("1.5"));
        assert_eq!(s(json!(null)), json!("null"));
        assert_eq!(s(json!([1, 2])), json!("[1,2]"));
        assert_eq!(s(json!("x")), json!("x"));
    }

    #[test]
    fn test_registered_function() {
        let catalog = TransformCatalog::new()
            .with_function("double", |v| Ok(json!(v.as_f64().unwrap_or(0.0) * 2.0)));

        assert!(catalog.contains("double"));
        assert_eq!(catalog.invoke("double", &json!(2.5)).unwrap(), json!(5.0));
        assert_eq!(
            catalog.invoke("missing", &json!(1)),
            Err(TransformError::UnknownLogic("missing".into()))
        );
    }

    #[test]
    fn test_failing_function_is_contained() {
        let catalog = TransformCatalog::new()
            .with_function("fails", |_| Err(anyhow::anyhow!("bad input")))
            .with_function("panics", |_| panic!("boom"));

        assert_eq!(
            catalog.invoke("fails", &json!(1)),
            Err(TransformError::CustomLogic("bad input".into()))
        );
        assert_eq!(
            catalog.invoke("panics", &json!(1)),
            Err(TransformError::CustomLogic("boom".into()))
        );
    }
}
