//! JWT authentication.
//!
//! Only the configuration is validated; no token is signed and the request
//! is left unchanged.

use super::{AuthError, ConfigBag};
use crate::transport::OutboundRequest;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct JwtAuth {
    issuer: String,
    audience: String,
    private_key_ref: String,
}

impl JwtAuth {
    pub(crate) fn from_config(bag: &ConfigBag<'_>) -> Result<Self, AuthError> {
        let [issuer, audience, private_key_ref] =
            bag.require(["issuer", "audience", "privateKeyRef"])?;
        Ok(Self {
            issuer,
            audience,
            private_key_ref,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn private_key_ref(&self) -> &str {
        &self.private_key_ref
    }

    pub(crate) fn inject(&self, request: &OutboundRequest) {
        debug!(
            issuer = %self.issuer,
            audience = %self.audience,
            url = %request.url,
            "JWT signing not available, sending request without credentials"
        );
    }
}
