//! CSRF state for the OAuth callback leg.
//!
//! A state token is issued when a login starts and travels through the
//! provider back to the callback. Each token is bound to one provider, lives
//! for a few minutes and can be consumed exactly once. Consuming an unknown,
//! expired or already-used token yields `None`, never an error.

use crate::error::AuthResult;
use crate::redirect::sanitize_return_path;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Key of a state entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    /// Provider id (lowercase)
    pub provider: String,

    /// Random state token
    pub token: String,
}

impl StateKey {
    /// Build a key, normalising the provider id.
    pub fn new(provider: &str, token: impl Into<String>) -> Self {
        Self {
            provider: provider.to_lowercase(),
            token: token.into(),
        }
    }
}

/// Stored state for one pending login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Where to send the browser afterwards
    pub return_path: String,

    /// When the entry stops being valid
    pub expires_at: DateTime<Utc>,
}

impl StateEntry {
    /// Check if the entry has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Key/value storage behind the state store.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Store an entry.
    async fn put(&self, key: StateKey, entry: StateEntry) -> AuthResult<()>;

    /// Remove and return an entry in one atomic step.
    async fn take(&self, key: &StateKey) -> AuthResult<Option<StateEntry>>;
}

/// In-memory state backend.
#[derive(Debug, Default)]
pub struct MemoryStateBackend {
    entries: Mutex<HashMap<StateKey, StateEntry>>,
}

impl MemoryStateBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn put(&self, key: StateKey, entry: StateEntry) -> AuthResult<()> {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| !e.is_expired());
        entries.insert(key, entry);
        Ok(())
    }

    async fn take(&self, key: &StateKey) -> AuthResult<Option<StateEntry>> {
        Ok(self.entries.lock().await.remove(key))
    }
}

/// Issues and consumes single-use state tokens.
#[derive(Clone)]
pub struct CsrfStateStore {
    backend: Arc<dyn StateBackend>,
    ttl: Duration,
    site_origin: String,
    default_path: String,
}

impl std::fmt::Debug for CsrfStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfStateStore")
            .field("ttl", &self.ttl)
            .field("site_origin", &self.site_origin)
            .field("default_path", &self.default_path)
            .finish()
    }
}

impl CsrfStateStore {
    /// Default lifetime of a state token.
    pub const DEFAULT_TTL_SECS: i64 = 600;

    /// Create a store over a backend.
    pub fn new(
        backend: Arc<dyn StateBackend>,
        site_origin: impl Into<String>,
        default_path: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            ttl: Duration::seconds(Self::DEFAULT_TTL_SECS),
            site_origin: site_origin.into(),
            default_path: default_path.into(),
        }
    }

    /// Set the token lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path used when no valid state is presented.
    pub fn default_path(&self) -> &str {
        &self.default_path
    }

    /// Cookie carrying the state between issue and callback.
    pub fn cookie_name(provider: &str) -> String {
        format!("{}_oauth_state", provider.to_lowercase())
    }

    /// Issue a token for `provider`, remembering where to return.
    pub async fn issue(&self, provider: &str, return_path: Option<&str>) -> AuthResult<String> {
        let return_path = return_path
            .map(|p| sanitize_return_path(p, &self.site_origin, &self.default_path))
            .unwrap_or_else(|| self.default_path.clone());

        let token = generate_token();
        let entry = StateEntry {
            return_path,
            expires_at: Utc::now() + self.ttl,
        };
        self.backend.put(StateKey::new(provider, &token), entry).await?;

        debug!(provider, "Issued OAuth state");
        Ok(token)
    }

    /// Consume a token, returning its return path at most once.
    pub async fn consume(&self, provider: &str, token: &str) -> Option<String> {
        let key = StateKey::new(provider, token);
        let entry = match self.backend.take(&key).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(provider, error = %e, "State backend failed; treating state as absent");
                return None;
            }
        };

        if entry.is_expired() {
            debug!(provider, "OAuth state expired");
            return None;
        }

        Some(sanitize_return_path(
            &entry.return_path,
            &self.site_origin,
            &self.default_path,
        ))
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;

    const SITE: &str = "https://shop.example.com";

    fn store() -> CsrfStateStore {
        CsrfStateStore::new(Arc::new(MemoryStateBackend::new()), SITE, "/account")
    }

    struct BrokenBackend;

    #[async_trait]
    impl StateBackend for BrokenBackend {
        async fn put(&self, _key: StateKey, _entry: StateEntry) -> AuthResult<()> {
            Err(AuthError::Internal("backend down".to_string()))
        }

        async fn take(&self, _key: &StateKey) -> AuthResult<Option<StateEntry>> {
            Err(AuthError::Internal("backend down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = store();
        let token = store.issue("discord", Some("/us/cart")).await.unwrap();

        assert_eq!(store.consume("discord", &token).await.as_deref(), Some("/us/cart"));
        assert_eq!(store.consume("discord", &token).await, None);
        assert_eq!(store.consume("discord", &token).await, None);
    }

    #[tokio::test]
    async fn test_token_bound_to_provider() {
        let store = store();
        let token = store.issue("google", Some("/cart")).await.unwrap();

        assert_eq!(store.consume("discord", &token).await, None);
        // Provider ids are case-insensitive.
        assert_eq!(store.consume("Google", &token).await.as_deref(), Some("/cart"));
    }

    #[tokio::test]
    async fn test_unknown_and_expired_tokens_are_none() {
        let store = store();
        assert_eq!(store.consume("google", "never-issued").await, None);

        let expiring = store.clone().with_ttl(Duration::zero());
        let token = expiring.issue("google", Some("/cart")).await.unwrap();
        assert_eq!(expiring.consume("google", &token).await, None);
    }

    #[tokio::test]
    async fn test_issue_sanitizes_return_path() {
        let store = store();
        let token = store.issue("google", Some("https://evil.test/")).await.unwrap();
        assert_eq!(store.consume("google", &token).await.as_deref(), Some("/account"));

        let token = store.issue("google", None).await.unwrap();
        assert_eq!(store.consume("google", &token).await.as_deref(), Some("/account"));
    }

    #[tokio::test]
    async fn test_tokens_are_random() {
        let store = store();
        let a = store.issue("google", None).await.unwrap();
        let b = store.issue("google", None).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }

    #[tokio::test]
    async fn test_backend_failure_consumes_as_none() {
        let store = CsrfStateStore::new(Arc::new(BrokenBackend), SITE, "/account");
        assert!(store.issue("google", None).await.is_err());
        assert_eq!(store.consume("google", "anything").await, None);
    }

    #[tokio::test]
    async fn test_concurrent_replay_of_consumed_state() {
        let store = store();
        let token = store.issue("discord", Some("/cart")).await.unwrap();
        assert!(store.consume("discord", &token).await.is_some());

        let (a, b) = tokio::join!(store.consume("discord", &token), store.consume("discord", &token));
        assert_eq!(a, None);
        assert_eq!(b, None);
    }

    #[tokio::test]
    async fn test_concurrent_consume_has_one_winner() {
        let store = store();
        let token = store.issue("discord", Some("/cart")).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let token = token.clone();
                tokio::spawn(async move { store.consume("discord", &token).await })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_put_prunes_expired_entries() {
        let backend = Arc::new(MemoryStateBackend::new());
        let expiring = CsrfStateStore::new(backend.clone(), SITE, "/").with_ttl(Duration::zero());
        expiring.issue("google", None).await.unwrap();
        expiring.issue("google", None).await.unwrap();
        assert_eq!(backend.len().await, 1);
    }

    #[test]
    fn test_cookie_name() {
        assert_eq!(CsrfStateStore::cookie_name("Discord"), "discord_oauth_state");
    }
}
