//! HTTP provider adapters.
//!
//! One [`OAuthAdapter`] serves every [`ProviderKind`]; the differences
//! between providers (token request shape, profile fields) are decided by
//! the kind, never by comparing id strings.

use crate::error::{AuthError, AuthResult};
use crate::identity::{IdentityResolver, ResolvedIdentity};
use crate::oauth::{
    ExternalProfile, ProviderAdapter, ProviderConfig, ProviderKind, ProviderRegistry,
    TokenRequestMethod, TokenResponse,
};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const DISCORD_CDN: &str = "https://cdn.discordapp.com/avatars";
const FACEBOOK_FIELDS: &str = "id,name,email,picture";

/// Provider adapter speaking plain OAuth 2.0 over HTTP.
#[derive(Clone)]
pub struct OAuthAdapter {
    /// Provider configuration.
    config: ProviderConfig,

    /// HTTP client instance.
    client: Client,

    /// Identity lookup and creation.
    resolver: IdentityResolver,
}

impl std::fmt::Debug for OAuthAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthAdapter")
            .field("config", &self.config)
            .finish()
    }
}

impl OAuthAdapter {
    /// Create an adapter whose outbound calls are bounded by `timeout`.
    pub fn new(
        config: ProviderConfig,
        resolver: IdentityResolver,
        timeout: Duration,
    ) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            resolver,
        })
    }

    /// Provider kind.
    pub fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    fn token_params(&self, code: &str) -> Vec<(&'static str, String)> {
        vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.config.callback_url.clone()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
            ("scope", self.config.scope_string()),
        ]
    }
}

#[async_trait]
impl ProviderAdapter for OAuthAdapter {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn authorization_url(&self, state: &str) -> AuthResult<String> {
        let base = self.config.get_auth_url()?;
        let mut url = Url::parse(&base)
            .map_err(|e| AuthError::ConfigError(format!("Invalid authorization URL: {}", e)))?;

        let mut extra: Vec<_> = self.config.extra_params.iter().collect();
        extra.sort();

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.callback_url)
                .append_pair("response_type", "code")
                .append_pair("scope", &self.config.scope_string())
                .append_pair("state", state);
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    #[instrument(skip(self, code), fields(provider = %self.config.id))]
    async fn exchange_code(&self, code: &str) -> AuthResult<TokenResponse> {
        let url = self.config.get_token_url()?;
        let params = self.token_params(code);

        let request = match self.config.kind.token_request_method() {
            TokenRequestMethod::FormPost => self.client.post(&url).form(&params),
            TokenRequestMethod::QueryGet => self.client.get(&url).query(&params),
        };

        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("Token request failed: {}", e);
                AuthError::TokenExchangeFailed { status: None }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Token endpoint returned {}", status.as_u16());
            return Err(AuthError::TokenExchangeFailed {
                status: Some(status.as_u16()),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            warn!("Invalid token response: {}", e);
            AuthError::TokenExchangeFailed { status: None }
        })?;

        debug!("Exchanged authorization code");
        Ok(token)
    }

    #[instrument(skip(self, access_token), fields(provider = %self.config.id))]
    async fn fetch_profile(&self, access_token: &str) -> AuthResult<ExternalProfile> {
        let url = self.config.get_profile_url()?;

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json");
        if self.config.kind == ProviderKind::Facebook {
            request = request.query(&[("fields", FACEBOOK_FIELDS)]);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Profile request failed: {}", e);
            AuthError::ProfileFetchFailed { status: None }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Profile endpoint returned {}", status.as_u16());
            return Err(AuthError::ProfileFetchFailed {
                status: Some(status.as_u16()),
            });
        }

        let raw: Value = response.json().await.map_err(|e| {
            warn!("Invalid profile response: {}", e);
            AuthError::InvalidProfileData("profile is not JSON".to_string())
        })?;

        Ok(parse_profile(self.config.kind, raw))
    }

    async fn resolve_or_create_identity(
        &self,
        profile: &ExternalProfile,
    ) -> AuthResult<ResolvedIdentity> {
        self.resolver
            .resolve_or_create(self.id(), profile, &self.config.scope)
            .await
    }
}

/// Build a registry with one adapter per configured provider.
pub fn build_registry(
    configs: &[ProviderConfig],
    resolver: &IdentityResolver,
    timeout: Duration,
) -> AuthResult<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for config in configs {
        let adapter = OAuthAdapter::new(config.clone(), resolver.clone(), timeout)?;
        registry.register(Arc::new(adapter));
    }
    Ok(registry)
}

/// Normalise a provider's profile JSON.
pub fn parse_profile(kind: ProviderKind, raw: Value) -> ExternalProfile {
    let mut profile = match kind {
        ProviderKind::Discord => {
            let entity_id = string_field(&raw, "id");
            let avatar_url = match (&entity_id, string_field(&raw, "avatar")) {
                (Some(id), Some(hash)) => Some(format!("{}/{}/{}.png", DISCORD_CDN, id, hash)),
                _ => None,
            };
            ExternalProfile {
                email: string_field(&raw, "email"),
                email_verified: bool_field(&raw, "verified"),
                name: string_field(&raw, "global_name").or_else(|| string_field(&raw, "username")),
                username: string_field(&raw, "username"),
                avatar_url,
                entity_id,
                ..Default::default()
            }
        }
        ProviderKind::Facebook => {
            // Graph API only returns emails Facebook has confirmed.
            let email = string_field(&raw, "email");
            ExternalProfile {
                entity_id: string_field(&raw, "id"),
                email_verified: email.is_some(),
                email,
                name: string_field(&raw, "name"),
                avatar_url: raw
                    .pointer("/picture/data/url")
                    .and_then(Value::as_str)
                    .map(String::from),
                ..Default::default()
            }
        }
        ProviderKind::Google => ExternalProfile {
            entity_id: string_field(&raw, "sub"),
            email: string_field(&raw, "email"),
            email_verified: bool_field(&raw, "email_verified"),
            name: string_field(&raw, "name"),
            avatar_url: string_field(&raw, "picture"),
            ..Default::default()
        },
        ProviderKind::Generic => ExternalProfile {
            entity_id: string_field(&raw, "sub").or_else(|| string_field(&raw, "id")),
            email: string_field(&raw, "email"),
            email_verified: bool_field(&raw, "email_verified") || bool_field(&raw, "verified"),
            name: string_field(&raw, "name")
                .or_else(|| string_field(&raw, "preferred_username")),
            username: string_field(&raw, "preferred_username")
                .or_else(|| string_field(&raw, "username")),
            avatar_url: string_field(&raw, "picture")
                .or_else(|| string_field(&raw, "avatar_url")),
            ..Default::default()
        },
    };
    profile.raw = raw;
    profile
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bool_field(raw: &Value, key: &str) -> bool {
    match raw.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentityStore;
    use serde_json::json;

    fn adapter(config: ProviderConfig) -> OAuthAdapter {
        let resolver = IdentityResolver::new(Arc::new(MemoryIdentityStore::new()));
        OAuthAdapter::new(config, resolver, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_authorization_url() {
        let mut config = ProviderConfig::new(
            ProviderKind::Google,
            "client-123",
            "secret",
            "https://shop.example.com/auth/google/callback",
        );
        config
            .extra_params
            .insert("prompt".to_string(), "select_account".to_string());

        let url = Url::parse(&adapter(config).authorization_url("state-xyz").unwrap()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["redirect_uri"], "https://shop.example.com/auth/google/callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email profile");
        assert_eq!(pairs["state"], "state-xyz");
        assert_eq!(pairs["prompt"], "select_account");
    }

    #[test]
    fn test_generic_without_endpoints_is_config_error() {
        let config = ProviderConfig::new(ProviderKind::Generic, "id", "secret", "cb");
        assert!(matches!(
            adapter(config).authorization_url("s"),
            Err(AuthError::ConfigError(_))
        ));
    }

    #[test]
    fn test_parse_discord_profile() {
        let profile = parse_profile(
            ProviderKind::Discord,
            json!({
                "id": "80351110224678912",
                "username": "nelly",
                "global_name": "Nelly",
                "avatar": "8342729096ea3675442027381ff50dfe",
                "verified": true,
                "email": "nelly@discord.com"
            }),
        );
        assert_eq!(profile.entity_id.as_deref(), Some("80351110224678912"));
        assert_eq!(profile.name.as_deref(), Some("Nelly"));
        assert_eq!(profile.username.as_deref(), Some("nelly"));
        assert!(profile.email_verified);
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png")
        );
    }

    #[test]
    fn test_parse_discord_without_email_scope() {
        let profile = parse_profile(
            ProviderKind::Discord,
            json!({ "id": "1", "username": "quiet", "avatar": null }),
        );
        assert_eq!(profile.email, None);
        assert!(!profile.email_verified);
        assert_eq!(profile.name.as_deref(), Some("quiet"));
        assert_eq!(profile.avatar_url, None);
    }

    #[test]
    fn test_parse_facebook_profile() {
        let profile = parse_profile(
            ProviderKind::Facebook,
            json!({
                "id": "10158",
                "name": "Ada Lovelace",
                "picture": { "data": { "url": "https://graph.test/pic.jpg" } }
            }),
        );
        assert_eq!(profile.entity_id.as_deref(), Some("10158"));
        assert_eq!(profile.email, None);
        assert!(!profile.email_verified);
        assert_eq!(profile.avatar_url.as_deref(), Some("https://graph.test/pic.jpg"));
    }

    #[test]
    fn test_parse_google_profile() {
        let profile = parse_profile(
            ProviderKind::Google,
            json!({
                "sub": "1099",
                "email": "ada@gmail.com",
                "email_verified": "true",
                "name": "Ada",
                "picture": "https://lh3.test/a.png"
            }),
        );
        assert_eq!(profile.entity_id.as_deref(), Some("1099"));
        assert!(profile.email_verified);
        assert_eq!(profile.avatar_url.as_deref(), Some("https://lh3.test/a.png"));
        assert_eq!(profile.raw["sub"], "1099");
    }

    #[test]
    fn test_parse_generic_profile() {
        let profile = parse_profile(
            ProviderKind::Generic,
            json!({ "id": 42, "preferred_username": "ada", "verified": true }),
        );
        assert_eq!(profile.entity_id.as_deref(), Some("42"));
        assert_eq!(profile.name.as_deref(), Some("ada"));
        assert_eq!(profile.username.as_deref(), Some("ada"));
        assert!(profile.email_verified);

        let empty = parse_profile(ProviderKind::Generic, json!({ "sub": "  " }));
        assert_eq!(empty.entity_id, None);
    }

    #[test]
    fn test_build_registry() {
        let resolver = IdentityResolver::new(Arc::new(MemoryIdentityStore::new()));
        let configs = vec![
            ProviderConfig::new(ProviderKind::Discord, "d", "s", "cb"),
            ProviderConfig::new(ProviderKind::Facebook, "f", "s", "cb").with_enabled(false),
        ];
        let registry = build_registry(&configs, &resolver, Duration::from_secs(5)).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("discord").is_ok());
        assert!(matches!(
            registry.get("facebook"),
            Err(AuthError::DisabledProvider(_))
        ));
    }
}
