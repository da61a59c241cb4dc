//! Forum connection configuration.
//!
//! Loaded from environment variables once at process start, with defaults
//! suitable for local development.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Configuration for the community forum.
#[derive(Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    /// Base URL of the forum (e.g., "https://community.example.com").
    pub base_url: String,

    /// Shared secret used to sign SSO payloads.
    pub sso_secret: String,

    /// Admin API key.
    pub api_key: Option<String>,

    /// Username the API key acts as.
    pub api_username: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ForumConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForumConfig")
            .field("base_url", &self.base_url)
            .field("sso_secret", &"[REDACTED]")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_username", &self.api_username)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4200".to_string(),
            sso_secret: String::new(),
            api_key: None,
            api_username: "system".to_string(),
            timeout_secs: 10,
        }
    }
}

impl ForumConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FORUM_URL`: forum base URL (default: http://localhost:4200)
    /// - `FORUM_SSO_SECRET`: shared DiscourseConnect secret
    /// - `FORUM_API_KEY`: admin API key
    /// - `FORUM_API_USERNAME`: API username (default: system)
    /// - `SSO_HTTP_TIMEOUT_SECS`: request timeout (default: 10)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            base_url: std::env::var("FORUM_URL").unwrap_or(default.base_url),
            sso_secret: std::env::var("FORUM_SSO_SECRET").unwrap_or(default.sso_secret),
            api_key: std::env::var("FORUM_API_KEY").ok(),
            api_username: std::env::var("FORUM_API_USERNAME").unwrap_or(default.api_username),
            timeout_secs: std::env::var("SSO_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.timeout_secs),
        }
    }

    /// Build a full URL by appending a path to the base URL.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parsed origin of the forum (scheme, host and port).
    pub fn origin(&self) -> BridgeResult<url::Origin> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| BridgeError::Config(format!("Invalid FORUM_URL: {}", e)))?;
        Ok(url.origin())
    }

    /// Validate that everything the bridge needs is configured.
    pub fn validate_for_production(&self) -> BridgeResult<()> {
        if self.sso_secret.is_empty() {
            return Err(BridgeError::Config("FORUM_SSO_SECRET is not set".to_string()));
        }
        if self.api_key.is_none() {
            return Err(BridgeError::Config("FORUM_API_KEY is not set".to_string()));
        }
        self.origin().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let config = ForumConfig {
            base_url: "https://forum.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.url("/admin/users/sync_sso"),
            "https://forum.example.com/admin/users/sync_sso"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ForumConfig {
            sso_secret: "super-secret".to_string(),
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_validate_for_production() {
        let mut config = ForumConfig::default();
        assert!(config.validate_for_production().is_err());

        config.sso_secret = "secret".to_string();
        config.api_key = Some("key".to_string());
        assert!(config.validate_for_production().is_ok());

        config.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate_for_production(),
            Err(BridgeError::Config(_))
        ));
    }
}
