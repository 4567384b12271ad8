//! Token endpoint calls with caching.

use super::cache::{TokenCache, TokenCacheEntry, TokenKey, DEFAULT_EXPIRES_IN_SECS};
use super::AuthError;
use crate::transport::{HttpTransport, OutboundRequest};
use serde_json::Value as JsonValue;
use tracing::debug;

/// Return the cached token for `key`, or send `request` to obtain and cache
/// a fresh one.
pub(crate) async fn fetch_cached(
    cache: &TokenCache,
    transport: &dyn HttpTransport,
    key: TokenKey,
    request: OutboundRequest,
) -> Result<String, AuthError> {
    if let Some(token) = cache.get(&key).await {
        debug!(token_url = %key.token_url, "Using cached token");
        return Ok(token);
    }

    let token_url = request.url.clone();
    debug!(token_url = %token_url, "Requesting token");

    let response = transport
        .send(request)
        .await
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))?;
    let token = extract_token(&response).ok_or_else(|| AuthError::TokenNotFound(token_url.clone()))?;
    let expires_in = expires_in(&response).unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    cache
        .insert(key, TokenCacheEntry::expiring_in(token.clone(), expires_in))
        .await;
    debug!(token_url = %token_url, expires_in, "Cached token");

    Ok(token)
}

/// First of `accessToken`, `access_token`, `token`, `data.token`.
fn extract_token(body: &JsonValue) -> Option<String> {
    ["/accessToken", "/access_token", "/token", "/data/token"]
        .into_iter()
        .find_map(|pointer| {
            body.pointer(pointer)
                .and_then(JsonValue::as_str)
                .filter(|t| !t.is_empty())
        })
        .map(str::to_string)
}

fn expires_in(body: &JsonValue) -> Option<i64> {
    let value = body.get("expires_in").or_else(|| body.get("expiresIn"))?;
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
