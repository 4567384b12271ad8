//! OAuth2 client-credentials authentication.

use super::cache::{TokenCache, TokenKey};
use super::{token, AuthError, ConfigBag, Secret};
use crate::transport::{HttpTransport, OutboundRequest};
use serde_json::json;

/// Fetches an access token with the client-credentials grant and sends it as
/// `Authorization: Bearer <token>`. Tokens are cached per token URL, client
/// id and credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuth2Auth {
    token_url: String,
    client_id: String,
    client_secret: Secret,
    scope: Option<String>,
    grant_type: String,
}

impl OAuth2Auth {
    pub(crate) fn from_config(bag: &ConfigBag<'_>) -> Result<Self, AuthError> {
        let [token_url, client_id, client_secret] =
            bag.require(["tokenUrl", "clientId", "clientSecret"])?;
        Ok(Self {
            token_url,
            client_id,
            client_secret: Secret::new(client_secret),
            scope: bag.string("scope"),
            grant_type: bag
                .string("grantType")
                .unwrap_or_else(|| "client_credentials".to_string()),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Token URL and client id, bound to the secret, scope and grant type.
    pub fn cache_key(&self) -> TokenKey {
        let credential = json!([self.grant_type, self.client_secret.expose(), self.scope]);
        TokenKey::new(self.token_url.as_str(), self.client_id.as_str())
            .with_credential(credential.to_string())
    }

    fn token_request(&self) -> OutboundRequest {
        let mut form = vec![
            ("grant_type".to_string(), self.grant_type.clone()),
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), self.client_secret.expose().to_string()),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope".to_string(), scope.clone()));
        }
        OutboundRequest::new("POST", self.token_url.as_str()).with_form(form)
    }

    pub(crate) async fn inject(
        &self,
        request: &mut OutboundRequest,
        cache: &TokenCache,
        transport: &dyn HttpTransport,
    ) -> Result<(), AuthError> {
        let token = token::fetch_cached(cache, transport, self.cache_key(), self.token_request()).await?;
        request.set_header("Authorization", format!("Bearer {token}"));
        Ok(())
    }
}
