//! Bearer token authentication.

use super::cache::{TokenCache, TokenKey};
use super::{token, AuthError, ConfigBag, Secret};
use crate::context::ExecutionContext;
use crate::transport::{HttpTransport, OutboundRequest};
use serde_json::{json, Value as JsonValue};

/// Bearer token from, in order: the caller's passthrough token, a static
/// `token`, or a login call to `tokenUrl` whose result is cached per login
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BearerAuth {
    token: Option<Secret>,
    token_url: Option<String>,
    login_payload: JsonValue,
    client_id: String,
    header_name: String,
    token_prefix: String,
}

impl BearerAuth {
    /// Nothing is strictly required up front: a passthrough token may arrive
    /// with the call.
    pub(crate) fn from_config(bag: &ConfigBag<'_>) -> Self {
        Self {
            token: bag.string("token").map(Secret::new),
            token_url: bag.string("tokenUrl"),
            login_payload: bag
                .value("loginPayload")
                .or_else(|| bag.value("credentials"))
                .cloned()
                .unwrap_or_else(|| json!({})),
            client_id: bag.string("clientId").unwrap_or_default(),
            header_name: bag
                .string("headerName")
                .unwrap_or_else(|| "Authorization".to_string()),
            token_prefix: bag
                .string("tokenPrefix")
                .unwrap_or_else(|| "Bearer ".to_string()),
        }
    }

    pub fn token_url(&self) -> Option<&str> {
        self.token_url.as_deref()
    }

    pub(crate) async fn inject(
        &self,
        request: &mut OutboundRequest,
        ctx: &ExecutionContext,
        cache: &TokenCache,
        transport: &dyn HttpTransport,
    ) -> Result<(), AuthError> {
        let token = match (ctx.incoming_token.as_deref(), &self.token, &self.token_url) {
            (Some(passthrough), _, _) if !passthrough.is_empty() => passthrough.to_string(),
            (_, Some(token), _) => token.expose().to_string(),
            (_, None, Some(token_url)) => {
                let login = OutboundRequest::new("POST", token_url.as_str())
                    .with_json(self.login_payload.clone());
                token::fetch_cached(
                    cache,
                    transport,
                    TokenKey::new(token_url.as_str(), self.client_id.as_str())
                        .with_credential(self.login_payload.to_string()),
                    login,
                )
                .await?
            }
            (_, None, None) => return Err(AuthError::MissingBearerToken),
        };

        request.set_header(&self.header_name, format!("{}{}", self.token_prefix, token));
        Ok(())
    }
}
