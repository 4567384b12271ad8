//! Authentication strategies for outbound target calls.
//!
//! An [`AuthSpec`] is a type tag plus a loose configuration bag. Each tag is
//! parsed into a typed strategy ([`AuthStrategy`]) which validates the bag and
//! injects credentials into an [`OutboundRequest`]. Token-issuing strategies
//! share a [`TokenCache`].

mod api_key;
mod basic;
mod bearer;
pub mod cache;
mod jwt;
mod oauth2;
mod token;

pub use api_key::{ApiKeyAuth, KeyLocation};
pub use basic::BasicAuth;
pub use bearer::BearerAuth;
pub use cache::{TokenCache, TokenCacheEntry, TokenKey};
pub use jwt::JwtAuth;
pub use oauth2::OAuth2Auth;

use crate::config::{AuthSpec, AuthType};
use crate::context::ExecutionContext;
use crate::transformer::catalog::display_string;
use crate::transport::{HttpTransport, OutboundRequest};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Auth type {incoming} does not match required {required}")]
    Mismatch {
        incoming: AuthType,
        required: AuthType,
    },

    #[error("AuthType {auth_type} requires {fields} in config")]
    MissingFields { auth_type: AuthType, fields: String },

    #[error("Failed to generate token: {0}")]
    TokenGeneration(String),

    #[error("Token not found in response from {0}")]
    TokenNotFound(String),

    #[error("Bearer token missing: no passthrough token, static token or token URL")]
    MissingBearerToken,
}

impl AuthError {
    /// Whether the error comes from the auth configuration rather than from
    /// talking to a token endpoint.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AuthError::Mismatch { .. } | AuthError::MissingFields { .. }
        )
    }
}

/// Combine the stored auth spec with a caller-supplied one.
///
/// When the stored type is not NONE, a caller spec must carry the same type.
/// The stored type wins unless it is NONE (or absent), in which case the
/// caller's type is used. Configuration bags merge with stored fields winning.
pub fn resolve_auth(
    stored: Option<&AuthSpec>,
    caller: Option<&AuthSpec>,
) -> Result<AuthSpec, AuthError> {
    let stored_type = stored.map_or(AuthType::None, |s| s.auth_type);

    if let Some(caller) = caller {
        if stored_type != AuthType::None && caller.auth_type != stored_type {
            return Err(AuthError::Mismatch {
                incoming: caller.auth_type,
                required: stored_type,
            });
        }
    }

    let auth_type = match stored_type {
        AuthType::None => caller.map_or(AuthType::None, |c| c.auth_type),
        stored_type => stored_type,
    };

    let mut config = caller.map(|c| c.config.clone()).unwrap_or_default();
    if let Some(stored) = stored {
        for (key, value) in &stored.config {
            config.insert(key.clone(), value.clone());
        }
    }

    Ok(AuthSpec { auth_type, config })
}

/// Typed strategy for one auth type.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStrategy {
    None,
    Basic(BasicAuth),
    ApiKey(ApiKeyAuth),
    Bearer(BearerAuth),
    OAuth2(OAuth2Auth),
    Jwt(JwtAuth),
}

impl AuthStrategy {
    /// Parse and validate a spec's configuration bag.
    pub fn from_spec(spec: &AuthSpec) -> Result<Self, AuthError> {
        let bag = ConfigBag::new(spec.auth_type, &spec.config);
        Ok(match spec.auth_type {
            AuthType::None => AuthStrategy::None,
            AuthType::Basic => AuthStrategy::Basic(BasicAuth::from_config(&bag)?),
            AuthType::ApiKey => AuthStrategy::ApiKey(ApiKeyAuth::from_config(&bag)?),
            AuthType::Bearer => AuthStrategy::Bearer(BearerAuth::from_config(&bag)),
            AuthType::OAuth2 => AuthStrategy::OAuth2(OAuth2Auth::from_config(&bag)?),
            AuthType::Jwt => AuthStrategy::Jwt(JwtAuth::from_config(&bag)?),
        })
    }

    pub fn auth_type(&self) -> AuthType {
        match self {
            AuthStrategy::None => AuthType::None,
            AuthStrategy::Basic(_) => AuthType::Basic,
            AuthStrategy::ApiKey(_) => AuthType::ApiKey,
            AuthStrategy::Bearer(_) => AuthType::Bearer,
            AuthStrategy::OAuth2(_) => AuthType::OAuth2,
            AuthStrategy::Jwt(_) => AuthType::Jwt,
        }
    }
}

/// Validates auth specs and injects credentials, sharing one token cache.
#[derive(Debug, Clone, Default)]
pub struct AuthRegistry {
    cache: Arc<TokenCache>,
}

impl AuthRegistry {
    pub fn new(cache: Arc<TokenCache>) -> Self {
        Self { cache }
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Check that an auth spec carries the fields its type requires.
    pub fn validate(&self, spec: &AuthSpec) -> Result<(), AuthError> {
        AuthStrategy::from_spec(spec).map(|_| ())
    }

    /// Add credentials for `spec` to the request.
    ///
    /// Token-issuing types may call their token endpoint through `transport`.
    pub async fn inject(
        &self,
        request: &mut OutboundRequest,
        spec: &AuthSpec,
        ctx: &ExecutionContext,
        transport: &dyn HttpTransport,
    ) -> Result<(), AuthError> {
        let strategy = AuthStrategy::from_spec(spec)?;
        debug!(
            correlation_id = %ctx.correlation_id,
            auth_type = %strategy.auth_type(),
            "Applying authentication"
        );

        match strategy {
            AuthStrategy::None => {}
            AuthStrategy::Basic(basic) => basic.inject(request),
            AuthStrategy::ApiKey(api_key) => api_key.inject(request),
            AuthStrategy::Bearer(bearer) => {
                bearer.inject(request, ctx, &self.cache, transport).await?;
            }
            AuthStrategy::OAuth2(oauth2) => oauth2.inject(request, &self.cache, transport).await?,
            AuthStrategy::Jwt(jwt) => jwt.inject(request),
        }
        Ok(())
    }
}

/// Read access to an auth configuration bag.
pub(crate) struct ConfigBag<'a> {
    auth_type: AuthType,
    config: &'a Map<String, JsonValue>,
}

impl<'a> ConfigBag<'a> {
    pub(crate) fn new(auth_type: AuthType, config: &'a Map<String, JsonValue>) -> Self {
        Self { auth_type, config }
    }

    /// A non-empty scalar field as a string.
    pub(crate) fn string(&self, key: &str) -> Option<String> {
        match self.config.get(key)? {
            JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
            JsonValue::String(s) if s.is_empty() => None,
            value => Some(display_string(value)),
        }
    }

    pub(crate) fn value(&self, key: &str) -> Option<&'a JsonValue> {
        self.config.get(key)
    }

    /// All of `keys`, or a [`AuthError::MissingFields`] naming every one
    /// that is absent.
    pub(crate) fn require<const N: usize>(&self, keys: [&str; N]) -> Result<[String; N], AuthError> {
        let mut missing = Vec::new();
        let values = keys.map(|key| {
            self.string(key).unwrap_or_else(|| {
                missing.push(format!("\"{key}\""));
                String::new()
            })
        });
        if missing.is_empty() {
            Ok(values)
        } else {
            Err(AuthError::MissingFields {
                auth_type: self.auth_type,
                fields: missing.join(" and "),
            })
        }
    }
}

/// Credential that never appears in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}
