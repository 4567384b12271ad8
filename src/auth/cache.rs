//! Token cache shared by token-issuing auth strategies.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Tokens are treated as expired this long before the issuer says so.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the token response carries no `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Upper bound on an accepted `expires_in` (ten years).
const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 3600;

/// Cache key: token endpoint, client id, and a digest of the credentials
/// sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub token_url: String,
    pub client_id: String,
    credential: String,
}

impl TokenKey {
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            credential: String::new(),
        }
    }

    /// Bind the key to the credential material of the token request. Only a
    /// SHA-256 digest of it is kept.
    #[must_use]
    pub fn with_credential(mut self, material: impl AsRef<[u8]>) -> Self {
        self.credential = hex::encode(Sha256::digest(material.as_ref()));
        self
    }
}

/// A cached token and the instant it stops being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCacheEntry {
    pub token: String,
    pub expires_at: Instant,
}

impl TokenCacheEntry {
    /// Entry for a token the issuer declared valid for `expires_in_secs`,
    /// shortened by [`EXPIRY_MARGIN_SECS`].
    pub fn expiring_in(token: impl Into<String>, expires_in_secs: i64) -> Self {
        let lifetime = expires_in_secs.clamp(0, MAX_EXPIRES_IN_SECS) - EXPIRY_MARGIN_SECS;
        Self {
            token: token.into(),
            expires_at: Instant::now() + Duration::from_secs(u64::try_from(lifetime).unwrap_or(0)),
        }
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Token cache keyed by [`TokenKey`].
///
/// Expiry follows the tokio clock. Entries are replaced on refresh, skipped
/// once expired, and dropped on the next insert. The lock is never held
/// across a token fetch, so concurrent misses for one key may each fetch and
/// the last write wins.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: RwLock<HashMap<TokenKey, TokenCacheEntry>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token for `key`, if still valid.
    pub async fn get(&self, key: &TokenKey) -> Option<String> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.token.clone())
    }

    /// Store `entry`, dropping any entries that have expired.
    pub async fn insert(&self, key: TokenKey, entry: TokenCacheEntry) {
        let mut entries = self.entries.write().await;
        retain_valid(&mut entries, Instant::now());
        entries.insert(key, entry);
    }

    /// Drop the entry for `key`; returns whether one existed.
    pub async fn invalidate(&self, key: &TokenKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Remove expired entries, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        retain_valid(&mut *self.entries.write().await, Instant::now())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn retain_valid(entries: &mut HashMap<TokenKey, TokenCacheEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.is_valid_at(now));
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TokenKey {
        TokenKey::new("https://idp.example.com/token", "client-a")
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_lifetime_applies_margin() {
        let entry = TokenCacheEntry::expiring_in("t", 3600);
        let now = Instant::now();
        assert_eq!(entry.expires_at - now, Duration::from_secs(3540));
        assert!(entry.is_valid_at(now + Duration::from_secs(3539)));
        assert!(!entry.is_valid_at(now + Duration::from_secs(3540)));

        let entry = TokenCacheEntry::expiring_in("t", 60);
        assert!(!entry.is_valid_at(Instant::now()));
        let entry = TokenCacheEntry::expiring_in("t", -5);
        assert!(!entry.is_valid_at(Instant::now()));
    }

    #[tokio::test]
    async fn test_get_and_insert() {
        let cache = TokenCache::new();
        assert_eq!(cache.get(&key()).await, None);

        cache
            .insert(key(), TokenCacheEntry::expiring_in("abc", 3600))
            .await;
        assert_eq!(cache.get(&key()).await.as_deref(), Some("abc"));
        assert_eq!(
            cache.get(&TokenKey::new("https://idp.example.com/token", "client-b")).await,
            None
        );
    }

    #[tokio::test]
    async fn test_credential_digest_separates_keys() {
        let alice = key().with_credential(r#"{"user":"alice"}"#);
        let bob = key().with_credential(r#"{"user":"bob"}"#);
        assert_ne!(alice, bob);
        assert_ne!(alice, key());
        assert_eq!(alice, key().with_credential(r#"{"user":"alice"}"#));
        assert!(!format!("{alice:?}").contains("alice"));

        let cache = TokenCache::new();
        cache
            .insert(alice.clone(), TokenCacheEntry::expiring_in("tok-alice", 3600))
            .await;
        assert_eq!(cache.get(&alice).await.as_deref(), Some("tok-alice"));
        assert_eq!(cache.get(&bob).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_not_served() {
        let cache = TokenCache::new();
        cache
            .insert(key(), TokenCacheEntry::expiring_in("old", 120))
            .await;
        assert_eq!(cache.get(&key()).await.as_deref(), Some("old"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(&key()).await, None);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_drops_expired_entries() {
        let cache = TokenCache::new();
        cache
            .insert(key(), TokenCacheEntry::expiring_in("old", 120))
            .await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let other = TokenKey::new("https://idp.example.com/token", "client-b");
        cache
            .insert(other.clone(), TokenCacheEntry::expiring_in("new", 3600))
            .await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&other).await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = TokenCache::new();
        cache
            .insert(key(), TokenCacheEntry::expiring_in("abc", 3600))
            .await;
        assert!(cache.invalidate(&key()).await);
        assert!(!cache.invalidate(&key()).await);
    }
}
