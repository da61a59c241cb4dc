//! Login configuration.
//!
//! Loaded from environment variables once at process start, with defaults
//! suitable for local development. Provider configuration is immutable after
//! loading.

use crate::commerce::CommerceEndpoint;
use crate::error::{AuthError, AuthResult};
use crate::oauth::{ProviderConfig, ProviderKind};
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use url::Url;

/// Minimum length accepted for the session secret in production.
const MIN_SECRET_LEN: usize = 32;

/// Accepted range for `SESSION_TTL_HOURS` (up to one year).
const SESSION_TTL_HOURS_RANGE: std::ops::RangeInclusive<i64> = 1..=24 * 365;

/// Accepted range for `SSO_STATE_TTL_SECS` (up to one day).
const STATE_TTL_SECS_RANGE: std::ops::RangeInclusive<i64> = 1..=86_400;

/// Everything the login flow needs.
#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// Storefront origin (e.g., "https://shop.example.com").
    pub site_origin: String,

    /// Where to land when no valid return path is known.
    pub default_return_path: String,

    /// HMAC secret for session tokens.
    pub session_secret: String,

    /// Session lifetime in hours.
    pub session_ttl_hours: i64,

    /// Lifetime of CSRF state tokens in seconds.
    pub state_ttl_secs: i64,

    /// Timeout for every outbound call, in seconds.
    pub http_timeout_secs: u64,

    /// Commerce backend.
    pub commerce: CommerceEndpoint,

    /// Configured identity providers.
    pub providers: Vec<ProviderConfig>,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            site_origin: "http://localhost:8000".to_string(),
            default_return_path: "/account".to_string(),
            session_secret: String::new(),
            session_ttl_hours: 24,
            state_ttl_secs: 600,
            http_timeout_secs: 10,
            commerce: CommerceEndpoint {
                base_url: "http://localhost:9000".to_string(),
                publishable_key: None,
            },
            providers: Vec::new(),
        }
    }
}

impl SsoConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STOREFRONT_ORIGIN`: storefront origin (default: http://localhost:8000)
    /// - `SSO_DEFAULT_RETURN_PATH`: fallback return path (default: /account)
    /// - `SESSION_JWT_SECRET`: session signing secret
    /// - `SESSION_TTL_HOURS`: session lifetime (default: 24)
    /// - `SSO_STATE_TTL_SECS`: CSRF state lifetime (default: 600)
    /// - `SSO_HTTP_TIMEOUT_SECS`: outbound request timeout (default: 10)
    /// - `COMMERCE_API_URL`: store API base URL (default: http://localhost:9000)
    /// - `COMMERCE_PUBLISHABLE_KEY`: store API publishable key
    /// - `<PROVIDER>_CLIENT_ID`, `<PROVIDER>_CLIENT_SECRET`,
    ///   `<PROVIDER>_CALLBACK_URL`, `<PROVIDER>_SCOPE`, `<PROVIDER>_ENABLED`
    ///   for `DISCORD`, `FACEBOOK`, `GOOGLE` and `GENERIC_OAUTH`
    /// - `GENERIC_OAUTH_AUTH_URL`, `GENERIC_OAUTH_TOKEN_URL`,
    ///   `GENERIC_OAUTH_PROFILE_URL`: generic provider endpoints
    ///
    /// A provider is configured when its client id is set.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let site_origin = var("STOREFRONT_ORIGIN").unwrap_or(default.site_origin);

        let providers = ProviderKind::ALL
            .iter()
            .filter_map(|kind| provider_from_vars(*kind, &site_origin, &var))
            .collect();

        Self {
            default_return_path: var("SSO_DEFAULT_RETURN_PATH").unwrap_or(default.default_return_path),
            session_secret: var("SESSION_JWT_SECRET").unwrap_or(default.session_secret),
            session_ttl_hours: var("SESSION_TTL_HOURS")
                .and_then(|s| s.parse().ok())
                .filter(|hours| SESSION_TTL_HOURS_RANGE.contains(hours))
                .unwrap_or(default.session_ttl_hours),
            state_ttl_secs: var("SSO_STATE_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs| STATE_TTL_SECS_RANGE.contains(secs))
                .unwrap_or(default.state_ttl_secs),
            http_timeout_secs: var("SSO_HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.http_timeout_secs),
            commerce: CommerceEndpoint {
                base_url: var("COMMERCE_API_URL").unwrap_or(default.commerce.base_url),
                publishable_key: var("COMMERCE_PUBLISHABLE_KEY"),
            },
            site_origin,
            providers,
        }
    }

    /// Outbound request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Session lifetime, clamped to the accepted range.
    pub fn session_ttl(&self) -> ChronoDuration {
        ChronoDuration::hours(self.session_ttl_hours.clamp(
            *SESSION_TTL_HOURS_RANGE.start(),
            *SESSION_TTL_HOURS_RANGE.end(),
        ))
    }

    /// CSRF state lifetime, clamped to the accepted range.
    pub fn state_ttl(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.state_ttl_secs.clamp(
            *STATE_TTL_SECS_RANGE.start(),
            *STATE_TTL_SECS_RANGE.end(),
        ))
    }

    /// Validate that everything the login flow needs is configured.
    pub fn validate_for_production(&self) -> AuthResult<()> {
        if self.session_secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::ConfigError(format!(
                "SESSION_JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        Url::parse(&self.site_origin)
            .map_err(|e| AuthError::ConfigError(format!("Invalid STOREFRONT_ORIGIN: {}", e)))?;
        if !SESSION_TTL_HOURS_RANGE.contains(&self.session_ttl_hours) {
            return Err(AuthError::ConfigError(format!(
                "SESSION_TTL_HOURS must be between {} and {}",
                SESSION_TTL_HOURS_RANGE.start(),
                SESSION_TTL_HOURS_RANGE.end()
            )));
        }
        if !STATE_TTL_SECS_RANGE.contains(&self.state_ttl_secs) {
            return Err(AuthError::ConfigError(format!(
                "SSO_STATE_TTL_SECS must be between {} and {}",
                STATE_TTL_SECS_RANGE.start(),
                STATE_TTL_SECS_RANGE.end()
            )));
        }
        if !self.default_return_path.starts_with('/') {
            return Err(AuthError::ConfigError(
                "SSO_DEFAULT_RETURN_PATH must be a path".to_string(),
            ));
        }
        if !self.providers.iter().any(|p| p.enabled) {
            return Err(AuthError::ConfigError("No identity provider is enabled".to_string()));
        }
        for provider in self.providers.iter().filter(|p| p.enabled) {
            if provider.client_secret.is_empty() {
                return Err(AuthError::ConfigError(format!(
                    "{} client secret is not set",
                    provider.display_name
                )));
            }
            provider.get_auth_url()?;
            provider.get_token_url()?;
            provider.get_profile_url()?;
        }
        Ok(())
    }
}

fn env_prefix(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Discord => "DISCORD",
        ProviderKind::Facebook => "FACEBOOK",
        ProviderKind::Google => "GOOGLE",
        ProviderKind::Generic => "GENERIC_OAUTH",
    }
}

fn provider_from_vars(
    kind: ProviderKind,
    site_origin: &str,
    var: &impl Fn(&str) -> Option<String>,
) -> Option<ProviderConfig> {
    let prefix = env_prefix(kind);
    let get = |suffix: &str| var(&format!("{}_{}", prefix, suffix)).filter(|v| !v.is_empty());

    let client_id = get("CLIENT_ID")?;
    let callback_url = get("CALLBACK_URL").unwrap_or_else(|| {
        format!(
            "{}/auth/{}/callback",
            site_origin.trim_end_matches('/'),
            kind.as_str()
        )
    });

    let mut config = ProviderConfig::new(
        kind,
        client_id,
        get("CLIENT_SECRET").unwrap_or_default(),
        callback_url,
    );

    if let Some(scope) = get("SCOPE") {
        config.scope = scope
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(enabled) = get("ENABLED") {
        config.enabled = enabled != "false" && enabled != "0";
    }
    if let Some(required) = get("REQUIRE_VERIFIED_EMAIL") {
        config.require_verified_email = required != "false" && required != "0";
    }
    config.auth_url = get("AUTH_URL");
    config.token_url = get("TOKEN_URL");
    config.profile_url = get("PROFILE_URL");

    Some(config)
}
