//! API key authentication.

use super::{AuthError, ConfigBag, Secret};
use crate::transport::OutboundRequest;

/// Where the key is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyLocation {
    #[default]
    Header,
    Query,
}

/// A named key sent as a header (default) or query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKeyAuth {
    key_name: String,
    key_value: Secret,
    location: KeyLocation,
}

impl ApiKeyAuth {
    pub(crate) fn from_config(bag: &ConfigBag<'_>) -> Result<Self, AuthError> {
        let [key_name, key_value] = bag.require(["keyName", "keyValue"])?;
        let location = match bag.string("location") {
            Some(location) if location.eq_ignore_ascii_case("query") => KeyLocation::Query,
            _ => KeyLocation::Header,
        };
        Ok(Self {
            key_name,
            key_value: Secret::new(key_value),
            location,
        })
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn location(&self) -> KeyLocation {
        self.location
    }

    pub(crate) fn inject(&self, request: &mut OutboundRequest) {
        match self.location {
            KeyLocation::Header => request.set_header(&self.key_name, self.key_value.expose()),
            KeyLocation::Query => request.set_query_param(&self.key_name, self.key_value.expose()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthType;
    use serde_json::{json, Value as JsonValue};

    fn auth(config: JsonValue) -> ApiKeyAuth {
        let bag = ConfigBag::new(AuthType::ApiKey, config.as_object().unwrap());
        ApiKeyAuth::from_config(&bag).unwrap()
    }

    #[test]
    fn test_header_location() {
        let auth = auth(json!({"keyName": "X-Api-Key", "keyValue": "k-123"}));
        let mut request = OutboundRequest::new("GET", "https://api.example.com");
        auth.inject(&mut request);

        assert_eq!(auth.location(), KeyLocation::Header);
        assert_eq!(request.header("x-api-key"), Some("k-123"));
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_query_location() {
        let auth = auth(json!({"keyName": "apikey", "keyValue": "k-123", "location": "query"}));
        let mut request = OutboundRequest::new("GET", "https://api.example.com");
        request.set_query_param("apikey", "stale");
        auth.inject(&mut request);

        assert_eq!(request.query, vec![("apikey".to_string(), "k-123".to_string())]);
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_missing_key_value() {
        let config = json!({"keyName": "X-Api-Key"});
        let bag = ConfigBag::new(AuthType::ApiKey, config.as_object().unwrap());
        let error = ApiKeyAuth::from_config(&bag).unwrap_err();
        assert_eq!(
            error.to_string(),
            r#"AuthType API_KEY requires "keyValue" in config"#
        );
    }
}
