//! Per-call execution context.

use crate::config::AuthSpec;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Caller-supplied inputs for one execution, alongside the payload.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Overrides the target API method
    pub method: Option<String>,
    /// Query parameters layered over the document's static ones
    pub query_params: Map<String, JsonValue>,
    /// Headers added after the document's static headers
    pub headers: HashMap<String, String>,
    /// Bearer token forwarded from the inbound request
    pub incoming_token: Option<String>,
    /// Caller auth spec, checked against and merged under the stored one
    pub auth: Option<AuthSpec>,
    /// Correlation ID used in every log line of the execution
    pub correlation_id: String,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Create an empty context with a fresh correlation ID.
    pub fn new() -> Self {
        Self {
            method: None,
            query_params: Map::new(),
            headers: HashMap::new(),
            incoming_token: None,
            auth: None,
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Add parameters from a raw query string such as `page=2&sort=name`.
    pub fn with_query_string(mut self, query: &str) -> Self {
        for (key, value) in parse_query_string(query) {
            self.query_params.insert(key, JsonValue::String(value));
        }
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_incoming_token(mut self, token: impl Into<String>) -> Self {
        self.incoming_token = Some(token.into());
        self
    }

    /// Take the passthrough token from an inbound `Authorization` header value.
    ///
    /// Only `Bearer` credentials are accepted; anything else is ignored.
    pub fn with_authorization_header(mut self, value: &str) -> Self {
        if let Some((scheme, token)) = value.trim().split_once(' ') {
            let token = token.trim();
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
                self.incoming_token = Some(token.to_string());
            }
        }
        self
    }

    pub fn with_auth(mut self, auth: AuthSpec) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Get a caller header value, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a query string into decoded key/value pairs; the last value of a
/// repeated key wins once inserted into a map.
fn parse_query_string(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}
