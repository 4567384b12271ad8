//! HTTP Basic authentication.

use super::{AuthError, ConfigBag, Secret};
use crate::transport::OutboundRequest;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// `Authorization: Basic base64(username:password)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicAuth {
    username: String,
    password: Secret,
}

impl BasicAuth {
    pub(crate) fn from_config(bag: &ConfigBag<'_>) -> Result<Self, AuthError> {
        let [username, password] = bag.require(["username", "password"])?;
        Ok(Self {
            username,
            password: Secret::new(password),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn inject(&self, request: &mut OutboundRequest) {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password.expose()));
        request.set_header("Authorization", format!("Basic {encoded}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthType;
    use serde_json::json;

    #[test]
    fn test_inject_basic_header() {
        let config = json!({"username": "u", "password": "p"});
        let bag = ConfigBag::new(AuthType::Basic, config.as_object().unwrap());
        let auth = BasicAuth::from_config(&bag).unwrap();

        let mut request = OutboundRequest::new("GET", "https://api.example.com");
        auth.inject(&mut request);

        assert_eq!(request.header("Authorization"), Some("Basic dTpw"));
        assert_eq!(auth.username(), "u");
    }

    #[test]
    fn test_debug_hides_password() {
        let config = json!({"username": "svc", "password": "s3cr3t-pw"});
        let bag = ConfigBag::new(AuthType::Basic, config.as_object().unwrap());
        let auth = BasicAuth::from_config(&bag).unwrap();

        assert!(!format!("{auth:?}").contains("s3cr3t-pw"));
    }
}
