//! Mapping engine: applies a [`Mapping`] to a JSON value.
//!
//! Mapping is fail-soft. A field that cannot be produced is skipped and
//! reported through [`Diagnostics`]; the rest of the output is still built.

use super::catalog::{BuiltinTransform, TransformCatalog};
use super::condition::Condition;
use super::{path, Diagnostics, TransformError};
use crate::config::{FieldRule, Mapping, MappingKind, TransformDefinition};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Applies mappings, resolving transform names against a shared catalog.
#[derive(Debug, Clone, Default)]
pub struct MappingEngine {
    catalog: Arc<TransformCatalog>,
}

impl MappingEngine {
    pub fn new(catalog: Arc<TransformCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TransformCatalog {
        &self.catalog
    }

    /// Map `source`, discarding diagnostics.
    pub fn transform(
        &self,
        source: &JsonValue,
        mapping: &Mapping,
        transforms: &HashMap<String, TransformDefinition>,
    ) -> JsonValue {
        let mut diagnostics = Diagnostics::new();
        self.transform_with_diagnostics(source, mapping, transforms, &mut diagnostics)
    }

    /// Map `source`, recording per-field failures into `diagnostics`.
    ///
    /// `transforms` is the document's named custom transform table.
    pub fn transform_with_diagnostics(
        &self,
        source: &JsonValue,
        mapping: &Mapping,
        transforms: &HashMap<String, TransformDefinition>,
        diagnostics: &mut Diagnostics,
    ) -> JsonValue {
        match mapping.kind {
            MappingKind::Direct => source.clone(),
            MappingKind::Object => self.map_object(source, mapping, transforms, diagnostics),
            MappingKind::Array => self.map_array(source, mapping, transforms, diagnostics),
            MappingKind::Custom => self.map_custom(source, mapping, diagnostics),
        }
    }

    fn map_object(
        &self,
        source: &JsonValue,
        mapping: &Mapping,
        transforms: &HashMap<String, TransformDefinition>,
        diagnostics: &mut Diagnostics,
    ) -> JsonValue {
        let mut output = JsonValue::Object(Map::new());

        for rule in &mapping.mappings {
            match self.resolve_rule(source, rule, transforms, diagnostics) {
                Ok(Some(value)) => path::set(&mut output, &rule.target, value),
                Ok(None) => trace!(target_path = %rule.target, "No value resolved, skipping field"),
                Err(error) => {
                    warn!(
                        source_path = %rule.source,
                        target_path = %rule.target,
                        error = %error,
                        "Field mapping failed"
                    );
                    diagnostics.record(&rule.source, &rule.target, error);
                }
            }
        }

        for (target, default) in &mapping.defaults {
            if !path::contains(&output, target) {
                path::set(&mut output, target, default.clone());
            }
        }

        output
    }

    fn map_array(
        &self,
        source: &JsonValue,
        mapping: &Mapping,
        transforms: &HashMap<String, TransformDefinition>,
        diagnostics: &mut Diagnostics,
    ) -> JsonValue {
        let Some(root) = mapping.root.as_deref().map(str::trim).filter(|r| !r.is_empty()) else {
            warn!("Array mapping has no root path");
            diagnostics.record("$", "$", TransformError::MissingRoot);
            return JsonValue::Array(Vec::new());
        };
        let items = match path::get(source, root) {
            Some(JsonValue::Array(items)) => items,
            _ => {
                warn!(root, "Array mapping root did not resolve to an array");
                diagnostics.record(root, "$", TransformError::RootNotArray(root.to_string()));
                return JsonValue::Array(Vec::new());
            }
        };

        let mapped: Vec<JsonValue> = items
            .iter()
            .map(|item| self.map_object(item, mapping, transforms, diagnostics))
            .collect();
        debug!(root, count = mapped.len(), "Mapped array elements");

        match mapping.output_wrapper.as_deref() {
            Some(wrapper) => {
                let mut output = JsonValue::Object(Map::new());
                path::set(&mut output, wrapper, JsonValue::Array(mapped));
                output
            }
            None => JsonValue::Array(mapped),
        }
    }

    fn map_custom(
        &self,
        source: &JsonValue,
        mapping: &Mapping,
        diagnostics: &mut Diagnostics,
    ) -> JsonValue {
        let result = match mapping.logic.as_deref() {
            Some(logic) => self.catalog.invoke(logic, source),
            None => Err(TransformError::MissingLogic),
        };
        result.unwrap_or_else(|error| {
            warn!(error = %error, "Custom mapping failed");
            let value = error_value(&error);
            diagnostics.record("$", "$", error);
            value
        })
    }

    /// Produce the value for one rule; `Ok(None)` means the field is omitted.
    fn resolve_rule(
        &self,
        source: &JsonValue,
        rule: &FieldRule,
        transforms: &HashMap<String, TransformDefinition>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<JsonValue>, TransformError> {
        let value = match &rule.condition {
            Some(expr) => {
                if Condition::parse(expr).evaluate(source) {
                    rule.value_if_true
                        .clone()
                        .or_else(|| path::get(source, &rule.source))
                } else {
                    rule.value_if_false.clone()
                }
            }
            None => path::get(source, &rule.source).or_else(|| rule.default.clone()),
        };

        let Some(value) = value else {
            if rule.required {
                return Err(TransformError::RequiredFieldMissing(rule.source.clone()));
            }
            return Ok(None);
        };

        Ok(Some(match rule.transform.as_deref() {
            Some(name) => self.apply_transform(value, name, rule, transforms, diagnostics),
            None => value,
        }))
    }

    /// Resolve a transform name: built-ins first, then the document's
    /// transform table, then functions registered under that name. Unknown
    /// names pass the value through.
    fn apply_transform(
        &self,
        value: JsonValue,
        name: &str,
        rule: &FieldRule,
        transforms: &HashMap<String, TransformDefinition>,
        diagnostics: &mut Diagnostics,
    ) -> JsonValue {
        if let Some(builtin) = BuiltinTransform::from_name(name) {
            return builtin.apply(&value);
        }

        let logic = match transforms.get(name) {
            Some(definition) => definition.logic.as_str(),
            None if self.catalog.contains(name) => name,
            None => {
                debug!(transform = name, "Unknown transform, passing value through");
                return value;
            }
        };

        match self.catalog.invoke(logic, &value) {
            Ok(transformed) => transformed,
            Err(error) => {
                warn!(transform = name, target_path = %rule.target, error = %error, "Custom transform failed");
                let value = error_value(&error);
                diagnostics.record(&rule.source, &rule.target, error);
                value
            }
        }
    }
}

fn error_value(error: &TransformError) -> JsonValue {
    json!({ "error": error.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformKind;

    fn engine() -> MappingEngine {
        let catalog = TransformCatalog::new()
            .with_function("initials", |v| {
                let s = v.as_str().unwrap_or_default();
                Ok(JsonValue::String(
                    s.split_whitespace()
                        .filter_map(|w| w.chars().next())
                        .collect(),
                ))
            })
            .with_function("explode", |_| Err(anyhow::anyhow!("cannot handle input")))
            .with_function("summarize", |v| {
                Ok(json!({ "count": v["items"].as_array().map_or(0, Vec::len) }))
            });
        MappingEngine::new(Arc::new(catalog))
    }

    fn no_transforms() -> HashMap<String, TransformDefinition> {
        HashMap::new()
    }

    #[test]
    fn test_object_mapping() {
        let mapping = Mapping::object(vec![
            FieldRule::new("$.user.name", "$.customer.fullName").with_transform("uppercase"),
            FieldRule::new("$.amount", "$.total").with_transform("roundTo2"),
            FieldRule::new("$.missing", "$.skipped"),
        ]);
        let source = json!({"user": {"name": "ada lovelace"}, "amount": 100.555});

        let output = engine().transform(&source, &mapping, &no_transforms());
        assert_eq!(
            output,
            json!({"customer": {"fullName": "ADA LOVELACE"}, "total": 100.56})
        );
    }

    #[test]
    fn test_direct_returns_source() {
        let mapping = Mapping {
            kind: MappingKind::Direct,
            ..Mapping::default()
        };
        let source = json!({"a": [1, 2, {"b": null}]});
        assert_eq!(engine().transform(&source, &mapping, &no_transforms()), source);
    }

    #[test]
    fn test_array_mapping_with_wrapper() {
        let mut mapping = Mapping::array(
            "$[*]",
            vec![
                FieldRule::new("$.name.common", "$.name"),
                FieldRule::new("$.cca2", "$.code"),
            ],
        );
        mapping.output_wrapper = Some("$.countries".to_string());
        let source = json!([
            {"name": {"common": "Norway"}, "cca2": "NO"},
            {"name": {"common": "Peru"}, "cca2": "PE"}
        ]);

        let output = engine().transform(&source, &mapping, &no_transforms());
        assert_eq!(
            output,
            json!({"countries": [
                {"name": "Norway", "code": "NO"},
                {"name": "Peru", "code": "PE"}
            ]})
        );
    }

    #[test]
    fn test_array_mapping_without_wrapper() {
        let mapping = Mapping::array("$.rows", vec![FieldRule::new("$.id", "$.ref")]);
        let output = engine().transform(&json!({"rows": [{"id": 1}, {"id": 2}]}), &mapping, &no_transforms());
        assert_eq!(output, json!([{"ref": 1}, {"ref": 2}]));
    }

    #[test]
    fn test_array_root_not_array() {
        let mapping = Mapping::array("$.rows", vec![FieldRule::new("$.id", "$.ref")]);
        let mut diagnostics = Diagnostics::new();
        let output = engine().transform_with_diagnostics(
            &json!({"rows": {"id": 1}}),
            &mapping,
            &no_transforms(),
            &mut diagnostics,
        );

        assert_eq!(output, json!([]));
        assert_eq!(
            diagnostics.failures()[0].error,
            TransformError::RootNotArray("$.rows".into())
        );
    }

    #[test]
    fn test_array_without_root_maps_nothing() {
        let mapping = Mapping {
            kind: MappingKind::Array,
            mappings: vec![FieldRule::new("$.a", "$.v")],
            ..Mapping::default()
        };
        let mut diagnostics = Diagnostics::new();
        let output = engine().transform_with_diagnostics(
            &json!([{"a": 1}]),
            &mapping,
            &no_transforms(),
            &mut diagnostics,
        );

        assert_eq!(output, json!([]));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.failures()[0].error, TransformError::MissingRoot);
    }

    #[test]
    fn test_required_fields_are_reported() {
        let mapping = Mapping::object(vec![
            FieldRule::new("$.id", "$.ref").required(),
            FieldRule::new("$.sku", "$.item").required(),
            FieldRule::new("$.qty", "$.quantity"),
        ]);
        let mut diagnostics = Diagnostics::new();
        let output = engine().transform_with_diagnostics(
            &json!({"qty": 3}),
            &mapping,
            &no_transforms(),
            &mut diagnostics,
        );

        assert_eq!(output, json!({"quantity": 3}));
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.missing_required(), 2);
        assert_eq!(diagnostics.failures()[0].target, "$.ref");
    }

    #[test]
    fn test_required_satisfied_by_default() {
        let mapping = Mapping::object(vec![
            FieldRule::new("$.country", "$.country").with_default(json!("NO")).required(),
        ]);
        let mut diagnostics = Diagnostics::new();
        let output = engine().transform_with_diagnostics(&json!({}), &mapping, &no_transforms(), &mut diagnostics);

        assert_eq!(output, json!({"country": "NO"}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_defaults_do_not_override() {
        let mut mapping = Mapping::object(vec![FieldRule::new("$.cur", "$.currency")]);
        mapping.defaults.insert("$.currency".into(), json!("EUR"));
        mapping.defaults.insert("$.meta.source".into(), json!("shop"));

        let output = engine().transform(&json!({"cur": "NOK"}), &mapping, &no_transforms());
        assert_eq!(output, json!({"currency": "NOK", "meta": {"source": "shop"}}));

        let output = engine().transform(&json!({}), &mapping, &no_transforms());
        assert_eq!(output["currency"], "EUR");
    }

    #[test]
    fn test_conditional_values() {
        let mapping = Mapping::object(vec![
            FieldRule::new("$.status", "$.active").with_condition(
                "$.status == 'ACTIVE'",
                Some(json!(true)),
                Some(json!(false)),
            ),
            FieldRule::new("$.vip", "$.tier").with_condition("$.vip", Some(json!("gold")), None),
            FieldRule::new("$.note", "$.note").with_condition("$.note", None, None),
        ]);

        let output = engine().transform(
            &json!({"status": "ACTIVE", "vip": false, "note": "hi"}),
            &mapping,
            &no_transforms(),
        );
        assert_eq!(output, json!({"active": true, "note": "hi"}));

        let output = engine().transform(&json!({"status": "OFF"}), &mapping, &no_transforms());
        assert_eq!(output, json!({"active": false}));
    }

    #[test]
    fn test_null_literal_is_written() {
        let rule = FieldRule::new("$.x", "$.cleared").with_condition("$.x", Some(JsonValue::Null), None);
        let output = engine().transform(&json!({"x": 1}), &Mapping::object(vec![rule]), &no_transforms());
        assert_eq!(output, json!({"cleared": null}));
    }

    #[test]
    fn test_custom_transforms() {
        let mut transforms = HashMap::new();
        transforms.insert(
            "toInitials".to_string(),
            TransformDefinition {
                kind: TransformKind::Function,
                logic: "initials".to_string(),
            },
        );
        let mapping = Mapping::object(vec![
            FieldRule::new("$.name", "$.a").with_transform("toInitials"),
            FieldRule::new("$.name", "$.b").with_transform("initials"),
            FieldRule::new("$.name", "$.c").with_transform("noSuchTransform"),
        ]);

        let output = engine().transform(&json!({"name": "Grace Brewster Hopper"}), &mapping, &transforms);
        assert_eq!(output, json!({"a": "GBH", "b": "GBH", "c": "Grace Brewster Hopper"}));
    }

    #[test]
    fn test_failing_custom_transform_is_contained() {
        let mapping = Mapping::object(vec![
            FieldRule::new("$.v", "$.broken").with_transform("explode"),
            FieldRule::new("$.v", "$.fine"),
        ]);
        let mut diagnostics = Diagnostics::new();
        let output = engine().transform_with_diagnostics(&json!({"v": 1}), &mapping, &no_transforms(), &mut diagnostics);

        assert_eq!(
            output,
            json!({"broken": {"error": "Custom transform error: cannot handle input"}, "fine": 1})
        );
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_custom_mapping() {
        let output = engine().transform(
            &json!({"items": [1, 2, 3]}),
            &Mapping::custom("summarize"),
            &no_transforms(),
        );
        assert_eq!(output, json!({"count": 3}));

        let output = engine().transform(&json!({}), &Mapping::custom("nope"), &no_transforms());
        assert!(output["error"].as_str().unwrap().starts_with("Custom transform error"));
    }
}
