//! Configuration types for the connector engine.
//!
//! Mapping documents are the durable wire contract and use camelCase keys;
//! engine settings follow the snake_case layout of the host config file.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Host configuration: engine settings plus the mapping documents to serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Configuration version
    pub version: String,
    /// Global settings
    pub settings: Settings,
    /// Mapping documents, addressable by id or name
    pub mappings: Vec<MappingDocument>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: Settings::default(),
            mappings: vec![],
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Timeout applied by the HTTP transport to every outbound call (ms)
    pub request_timeout_ms: u64,
    /// Delay between retries when a document does not set one (ms)
    pub default_retry_delay_ms: u64,
    /// User-Agent sent by the HTTP transport
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            default_retry_delay_ms: 1_000,
            user_agent: concat!("connector-engine/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A declarative integration between a source and a target system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDocument {
    /// Integration id (mapping key)
    pub id: String,
    /// Optional human-readable name, also usable as lookup key
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source_system: String,
    #[serde(default)]
    pub target_system: String,
    /// Inbound payload -> target request body
    #[serde(default)]
    pub request_mapping: Option<Mapping>,
    /// Target response -> result
    #[serde(default)]
    pub response_mapping: Option<Mapping>,
    /// Target endpoint
    #[serde(default)]
    pub target_api: Option<TargetApiSpec>,
    /// Stored authentication for the target
    #[serde(default, alias = "auth")]
    pub auth_config: Option<AuthSpec>,
    /// Failed call error body -> result
    #[serde(default)]
    pub error_mapping: Option<Mapping>,
    /// Named custom transforms referenced by field rules
    #[serde(default)]
    pub transforms: HashMap<String, TransformDefinition>,
    /// Free-form metadata, carried but not interpreted
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

impl MappingDocument {
    /// Create a document with the given id that calls `target_api`.
    pub fn new(id: impl Into<String>, target_api: TargetApiSpec) -> Self {
        Self {
            id: id.into(),
            name: None,
            source_system: String::new(),
            target_system: String::new(),
            request_mapping: None,
            response_mapping: None,
            target_api: Some(target_api),
            auth_config: None,
            error_mapping: None,
            transforms: HashMap::new(),
            metadata: Map::new(),
        }
    }

    /// Parse a document from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Mapping mode selected by the `type` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MappingKind {
    /// Return the source unchanged
    Direct,
    /// Build an object from field rules
    #[default]
    #[serde(alias = "STATIC")]
    Object,
    /// Map every element of a root collection
    Array,
    /// Run registered logic over the whole value
    Custom,
}

/// Request, response or error mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Mapping {
    #[serde(rename = "type")]
    pub kind: MappingKind,
    pub description: Option<String>,
    /// Collection path for ARRAY mappings, e.g. `$.items[*]`
    pub root: Option<String>,
    /// Path the ARRAY result is nested under, e.g. `$.countries`
    pub output_wrapper: Option<String>,
    /// Field rules, applied in order
    pub mappings: Vec<FieldRule>,
    /// Output path -> literal, written only where rules produced nothing
    pub defaults: Map<String, JsonValue>,
    /// Registered logic name for CUSTOM mappings
    pub logic: Option<String>,
}

impl Mapping {
    /// An OBJECT mapping over the given rules.
    pub fn object(rules: Vec<FieldRule>) -> Self {
        Self {
            mappings: rules,
            ..Self::default()
        }
    }

    /// An ARRAY mapping over `root` with the given per-element rules.
    pub fn array(root: impl Into<String>, rules: Vec<FieldRule>) -> Self {
        Self {
            kind: MappingKind::Array,
            root: Some(root.into()),
            mappings: rules,
            ..Self::default()
        }
    }

    /// A CUSTOM mapping running the registered `logic`.
    pub fn custom(logic: impl Into<String>) -> Self {
        Self {
            kind: MappingKind::Custom,
            logic: Some(logic.into()),
            ..Self::default()
        }
    }

    /// Whether applying this mapping would just rebuild an empty object.
    ///
    /// Request payloads skip such mappings and are sent unchanged.
    pub fn is_passthrough(&self) -> bool {
        match self.kind {
            MappingKind::Direct => true,
            MappingKind::Object => self.mappings.is_empty() && self.defaults.is_empty(),
            MappingKind::Array | MappingKind::Custom => false,
        }
    }
}

/// One source -> target line of a mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    /// Path into the source value
    #[serde(default)]
    pub source: String,
    /// Path into the output being built
    pub target: String,
    /// Built-in or custom transform name
    #[serde(default)]
    pub transform: Option<String>,
    /// `path == 'literal'` or a bare path tested for truthiness
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "present_value")]
    pub value_if_true: Option<JsonValue>,
    #[serde(default, deserialize_with = "present_value")]
    pub value_if_false: Option<JsonValue>,
    /// Used when the source path resolves to nothing
    #[serde(default, deserialize_with = "present_value")]
    pub default: Option<JsonValue>,
    /// Report the field when nothing resolves
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    /// A plain `source -> target` rule.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_transform(mut self, name: impl Into<String>) -> Self {
        self.transform = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_condition(
        mut self,
        condition: impl Into<String>,
        if_true: Option<JsonValue>,
        if_false: Option<JsonValue>,
    ) -> Self {
        self.condition = Some(condition.into());
        self.value_if_true = if_true;
        self.value_if_false = if_false;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Keeps an explicit `null` literal distinct from an absent key.
fn present_value<'de, D>(deserializer: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

/// Named custom transform definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformDefinition {
    #[serde(rename = "type", default)]
    pub kind: TransformKind,
    /// Name of the registered function implementing the transform
    pub logic: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransformKind {
    #[default]
    Function,
}

/// Target endpoint description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetApiSpec {
    /// URL template; `:name` / `{name}` placeholders are filled from `path_params`
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Static headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Static query parameters; `$.`-prefixed values resolve against the payload
    #[serde(default)]
    pub query_params: Map<String, JsonValue>,
    /// Placeholder name -> payload path
    #[serde(default)]
    pub path_params: HashMap<String, String>,
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

fn default_method() -> String {
    "POST".to_string()
}

impl TargetApiSpec {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: HashMap::new(),
            query_params: Map::new(),
            path_params: HashMap::new(),
            resilience: ResilienceConfig::default(),
        }
    }
}

/// Retry policy for the target call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceConfig {
    /// Retries after the first attempt
    pub retry_count: u32,
    /// Fixed delay between attempts; falls back to `Settings::default_retry_delay_ms`
    pub retry_delay_ms: Option<u64>,
    /// Accepted for compatibility, not enforced
    pub circuit_breaker_threshold: Option<u32>,
}

/// Authentication type tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    ApiKey,
    Bearer,
    OAuth2,
    Jwt,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthType::None => "NONE",
            AuthType::Basic => "BASIC",
            AuthType::ApiKey => "API_KEY",
            AuthType::Bearer => "BEARER",
            AuthType::OAuth2 => "OAUTH2",
            AuthType::Jwt => "JWT",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = UnknownAuthType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" | "" => Ok(AuthType::None),
            "BASIC" => Ok(AuthType::Basic),
            "API_KEY" | "APIKEY" => Ok(AuthType::ApiKey),
            "BEARER" | "BEARER_TOKEN" => Ok(AuthType::Bearer),
            "OAUTH2" | "OAUTH2_CLIENT_CREDENTIALS" => Ok(AuthType::OAuth2),
            "JWT" => Ok(AuthType::Jwt),
            _ => Err(UnknownAuthType(s.to_string())),
        }
    }
}

impl TryFrom<String> for AuthType {
    type Error = UnknownAuthType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthType> for String {
    fn from(value: AuthType) -> Self {
        value.as_str().to_string()
    }
}

/// Unrecognized auth type tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported auth type: {0}")]
pub struct UnknownAuthType(pub String);

/// Authentication spec: a type tag plus a type-specific configuration bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    #[serde(alias = "type")]
    pub auth_type: AuthType,
    #[serde(default)]
    pub config: Map<String, JsonValue>,
}

impl AuthSpec {
    pub fn new(auth_type: AuthType) -> Self {
        Self {
            auth_type,
            config: Map::new(),
        }
    }

    /// Add a configuration field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectorConfig::default();
        assert_eq!(config.version, "1");
        assert!(config.mappings.is_empty());
        assert_eq!(config.settings.request_timeout_ms, 30_000);
        assert_eq!(config.settings.default_retry_delay_ms, 1_000);
    }

    #[test]
    fn test_document_parsing() {
        let json = r#"{
            "id": "orders-to-erp",
            "name": "orders",
            "sourceSystem": "shop",
            "targetSystem": "erp",
            "requestMapping": {
                "mappings": [
                    {"source": "$.amount", "target": "$.total", "transform": "roundTo2"},
                    {"source": "$.id", "target": "$.ref", "required": true}
                ],
                "defaults": {"$.currency": "EUR"}
            },
            "targetApi": {
                "url": "https://erp.example.com/orders/:id",
                "method": "PUT",
                "pathParams": {"id": "$.id"},
                "resilience": {"retryCount": 2, "retryDelayMs": 250}
            },
            "authConfig": {"authType": "BASIC", "config": {"username": "u", "password": "p"}},
            "errorMapping": {"mappings": [{"source": "$.error.code", "target": "$.errCode"}]}
        }"#;
        let doc = MappingDocument::from_json(json).unwrap();
        assert_eq!(doc.id, "orders-to-erp");
        assert_eq!(doc.name.as_deref(), Some("orders"));

        let request = doc.request_mapping.as_ref().unwrap();
        assert_eq!(request.kind, MappingKind::Object);
        assert_eq!(request.mappings.len(), 2);
        assert!(request.mappings[1].required);
        assert_eq!(request.defaults["$.currency"], "EUR");

        let api = doc.target_api.as_ref().unwrap();
        assert_eq!(api.method, "PUT");
        assert_eq!(api.resilience.retry_count, 2);
        assert_eq!(api.resilience.retry_delay_ms, Some(250));

        let auth = doc.auth_config.as_ref().unwrap();
        assert_eq!(auth.auth_type, AuthType::Basic);
        assert!(doc.error_mapping.is_some());
    }

    #[test]
    fn test_auth_type_aliases() {
        for (raw, expected) in [
            ("BEARER_TOKEN", AuthType::Bearer),
            ("bearer", AuthType::Bearer),
            ("OAUTH2_CLIENT_CREDENTIALS", AuthType::OAuth2),
            ("api_key", AuthType::ApiKey),
            ("JWT", AuthType::Jwt),
            ("NONE", AuthType::None),
        ] {
            assert_eq!(raw.parse::<AuthType>().unwrap(), expected, "{raw}");
        }
        assert!("KERBEROS".parse::<AuthType>().is_err());

        let spec: AuthSpec =
            serde_json::from_str(r#"{"type": "oauth2", "config": {}}"#).unwrap();
        assert_eq!(spec.auth_type, AuthType::OAuth2);
        assert_eq!(serde_json::to_value(&spec).unwrap()["authType"], "OAUTH2");
    }

    #[test]
    fn test_explicit_null_literal_is_kept() {
        let rule: FieldRule = serde_json::from_str(
            r#"{"source": "$.a", "target": "$.b", "default": null}"#,
        )
        .unwrap();
        assert_eq!(rule.default, Some(JsonValue::Null));
        assert_eq!(rule.value_if_true, None);
    }

    #[test]
    fn test_mapping_kind_parsing() {
        let mapping: Mapping = serde_json::from_str(r#"{"type": "STATIC"}"#).unwrap();
        assert_eq!(mapping.kind, MappingKind::Object);
        assert!(mapping.is_passthrough());

        let mapping: Mapping =
            serde_json::from_str(r#"{"type": "ARRAY", "root": "$[*]", "outputWrapper": "$.rows"}"#)
                .unwrap();
        assert_eq!(mapping.kind, MappingKind::Array);
        assert_eq!(mapping.output_wrapper.as_deref(), Some("$.rows"));
        assert!(!mapping.is_passthrough());
    }

    #[test]
    fn test_yaml_config_parsing() {
        let yaml = r#"
version: "1"
settings:
  request_timeout_ms: 5000
mappings:
  - id: "countries"
    targetApi:
      url: "https://api.example.com/countries"
      method: GET
    responseMapping:
      type: ARRAY
      root: "$[*]"
      mappings:
        - source: "$.name.common"
          target: "$.name"
"#;
        let config: ConnectorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.settings.request_timeout_ms, 5000);
        assert_eq!(config.settings.default_retry_delay_ms, 1_000);
        assert_eq!(config.mappings.len(), 1);
        let api = config.mappings[0].target_api.as_ref().unwrap();
        assert_eq!(api.method, "GET");
    }
}
