//! OAuth 2.0 provider support
//!
//! This module defines the supported identity providers, their static
//! configuration, and the [`ProviderAdapter`] capability set every provider
//! implements. Providers are a closed set of [`ProviderKind`] variants looked
//! up through a [`ProviderRegistry`]; the callback flow never branches on
//! provider id strings.

use crate::error::{AuthError, AuthResult};
use crate::identity::ResolvedIdentity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Supported OAuth providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Discord OAuth
    Discord,
    /// Facebook Login
    Facebook,
    /// Google OAuth
    Google,
    /// Any standards-following OAuth provider
    Generic,
}

/// How the token endpoint expects the code exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRequestMethod {
    /// Form-encoded POST body
    FormPost,
    /// Query parameters on a GET
    QueryGet,
}

impl ProviderKind {
    /// All kinds, in registry order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Discord,
        ProviderKind::Facebook,
        ProviderKind::Google,
        ProviderKind::Generic,
    ];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Discord => "discord",
            ProviderKind::Facebook => "facebook",
            ProviderKind::Google => "google",
            ProviderKind::Generic => "oauth",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "discord" => Some(ProviderKind::Discord),
            "facebook" | "meta" => Some(ProviderKind::Facebook),
            "google" => Some(ProviderKind::Google),
            "oauth" | "generic" => Some(ProviderKind::Generic),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Discord => "Discord",
            ProviderKind::Facebook => "Facebook",
            ProviderKind::Google => "Google",
            ProviderKind::Generic => "OAuth",
        }
    }

    /// Get the default authorization URL for the provider.
    pub fn auth_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Discord => Some("https://discord.com/oauth2/authorize"),
            ProviderKind::Facebook => Some("https://www.facebook.com/v19.0/dialog/oauth"),
            ProviderKind::Google => Some("https://accounts.google.com/o/oauth2/v2/auth"),
            ProviderKind::Generic => None,
        }
    }

    /// Get the default token URL for the provider.
    pub fn token_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Discord => Some("https://discord.com/api/oauth2/token"),
            ProviderKind::Facebook => {
                Some("https://graph.facebook.com/v19.0/oauth/access_token")
            }
            ProviderKind::Google => Some("https://oauth2.googleapis.com/token"),
            ProviderKind::Generic => None,
        }
    }

    /// Get the default profile URL for the provider.
    pub fn profile_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Discord => Some("https://discord.com/api/users/@me"),
            ProviderKind::Facebook => Some("https://graph.facebook.com/me"),
            ProviderKind::Google => Some("https://openidconnect.googleapis.com/v1/userinfo"),
            ProviderKind::Generic => None,
        }
    }

    /// Get default scopes for the provider.
    pub fn default_scopes(&self) -> Vec<&'static str> {
        match self {
            ProviderKind::Discord => vec!["identify", "email"],
            ProviderKind::Facebook => vec!["email", "public_profile"],
            ProviderKind::Google => vec!["openid", "email", "profile"],
            ProviderKind::Generic => vec!["openid", "email", "profile"],
        }
    }

    /// Whether logins must present a verified email by default.
    pub fn requires_verified_email(&self) -> bool {
        matches!(self, ProviderKind::Discord | ProviderKind::Google)
    }

    /// How the code is exchanged.
    pub fn token_request_method(&self) -> TokenRequestMethod {
        match self {
            ProviderKind::Facebook => TokenRequestMethod::QueryGet,
            _ => TokenRequestMethod::FormPost,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static provider configuration, loaded once at start.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider id used in routes (lowercase)
    pub id: String,

    /// Name shown to customers
    pub display_name: String,

    /// Provider type
    pub kind: ProviderKind,

    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Redirect URL registered with the provider
    pub callback_url: String,

    /// Scopes to request
    pub scope: Vec<String>,

    /// Whether logins are accepted
    pub enabled: bool,

    /// Reject profiles without a verified email
    pub require_verified_email: bool,

    /// Authorization URL (optional, uses default for known providers)
    pub auth_url: Option<String>,

    /// Token URL (optional, uses default for known providers)
    pub token_url: Option<String>,

    /// Profile URL (optional, uses default for known providers)
    pub profile_url: Option<String>,

    /// Additional authorization parameters
    #[serde(default)]
    pub extra_params: HashMap<String, String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("callback_url", &self.callback_url)
            .field("scope", &self.scope)
            .field("enabled", &self.enabled)
            .field("require_verified_email", &self.require_verified_email)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a new provider configuration with the kind's defaults.
    pub fn new(
        kind: ProviderKind,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            id: kind.as_str().to_string(),
            display_name: kind.display_name().to_string(),
            kind,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url: callback_url.into(),
            scope: kind.default_scopes().iter().map(|s| s.to_string()).collect(),
            enabled: true,
            require_verified_email: kind.requires_verified_email(),
            auth_url: None,
            token_url: None,
            profile_url: None,
            extra_params: HashMap::new(),
        }
    }

    /// Override the endpoint URLs.
    pub fn with_endpoints(
        mut self,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        profile_url: impl Into<String>,
    ) -> Self {
        self.auth_url = Some(auth_url.into());
        self.token_url = Some(token_url.into());
        self.profile_url = Some(profile_url.into());
        self
    }

    /// Set whether the provider accepts logins.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the verified-email policy.
    pub fn with_verified_email_required(mut self, required: bool) -> Self {
        self.require_verified_email = required;
        self
    }

    /// Scopes joined for the wire.
    pub fn scope_string(&self) -> String {
        self.scope.join(" ")
    }

    /// Get the authorization URL.
    pub fn get_auth_url(&self) -> AuthResult<String> {
        self.auth_url
            .clone()
            .or_else(|| self.kind.auth_url().map(String::from))
            .ok_or_else(|| AuthError::ConfigError("Authorization URL not configured".to_string()))
    }

    /// Get the token URL.
    pub fn get_token_url(&self) -> AuthResult<String> {
        self.token_url
            .clone()
            .or_else(|| self.kind.token_url().map(String::from))
            .ok_or_else(|| AuthError::ConfigError("Token URL not configured".to_string()))
    }

    /// Get the profile URL.
    pub fn get_profile_url(&self) -> AuthResult<String> {
        self.profile_url
            .clone()
            .or_else(|| self.kind.profile_url().map(String::from))
            .ok_or_else(|| AuthError::ConfigError("Profile URL not configured".to_string()))
    }
}

/// OAuth token response from provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default)]
    pub token_type: Option<String>,

    /// Expires in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,

    /// Refresh token (if provided)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// ID token (for OIDC)
    #[serde(default)]
    pub id_token: Option<String>,

    /// Granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

/// Profile returned by a provider, normalised across providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalProfile {
    /// Provider-stable user id
    pub entity_id: Option<String>,

    /// Email address, when the provider shares it
    pub email: Option<String>,

    /// Whether the provider vouches for the email
    pub email_verified: bool,

    /// Display name
    pub name: Option<String>,

    /// Handle or username
    pub username: Option<String>,

    /// Profile picture URL
    pub avatar_url: Option<String>,

    /// Raw provider response
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Capability set implemented by every identity provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider configuration.
    fn config(&self) -> &ProviderConfig;

    /// Provider id (lowercase).
    fn id(&self) -> &str {
        &self.config().id
    }

    /// Build the URL the browser is sent to for consent.
    fn authorization_url(&self, state: &str) -> AuthResult<String>;

    /// Exchange an authorization code for tokens. Never retried.
    async fn exchange_code(&self, code: &str) -> AuthResult<TokenResponse>;

    /// Fetch the profile behind an access token.
    async fn fetch_profile(&self, access_token: &str) -> AuthResult<ExternalProfile>;

    /// Find or create the local identity for a profile.
    async fn resolve_or_create_identity(
        &self,
        profile: &ExternalProfile,
    ) -> AuthResult<ResolvedIdentity>;

    /// Apply provider policy to a fetched profile.
    fn check_policy(&self, profile: &ExternalProfile) -> AuthResult<()> {
        if self.config().require_verified_email
            && (profile.email.is_none() || !profile.email_verified)
        {
            return Err(AuthError::PolicyViolation(
                "account email must be verified".to_string(),
            ));
        }
        Ok(())
    }

    /// Password-style registration is never offered through a provider.
    async fn register(&self) -> AuthResult<()> {
        Err(AuthError::RegistrationNotAllowed(self.id().to_string()))
    }
}

/// Providers keyed by lowercase id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its id.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id().to_lowercase(), adapter);
    }

    /// Look up an enabled provider, case-insensitively.
    pub fn get(&self, id: &str) -> AuthResult<Arc<dyn ProviderAdapter>> {
        let adapter = self
            .adapters
            .get(&id.to_lowercase())
            .ok_or_else(|| AuthError::UnknownProvider(id.to_string()))?;
        if !adapter.config().enabled {
            return Err(AuthError::DisabledProvider(adapter.id().to_string()));
        }
        Ok(adapter.clone())
    }

    /// Registered provider ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AuthIdentity, ProviderMetadata, UserMetadata};

    struct StaticAdapter {
        config: ProviderConfig,
    }

    #[async_trait]
    impl ProviderAdapter for StaticAdapter {
        fn config(&self) -> &ProviderConfig {
            &self.config
        }

        fn authorization_url(&self, state: &str) -> AuthResult<String> {
            Ok(format!("https://idp.test/auth?state={}", state))
        }

        async fn exchange_code(&self, _code: &str) -> AuthResult<TokenResponse> {
            Err(AuthError::TokenExchangeFailed { status: None })
        }

        async fn fetch_profile(&self, _access_token: &str) -> AuthResult<ExternalProfile> {
            Ok(ExternalProfile::default())
        }

        async fn resolve_or_create_identity(
            &self,
            profile: &ExternalProfile,
        ) -> AuthResult<ResolvedIdentity> {
            Ok(ResolvedIdentity {
                identity: AuthIdentity::new(
                    self.id(),
                    profile.entity_id.clone().unwrap_or_default(),
                    UserMetadata::default(),
                    ProviderMetadata::default(),
                ),
                created: true,
            })
        }
    }

    fn adapter(kind: ProviderKind, enabled: bool) -> Arc<dyn ProviderAdapter> {
        Arc::new(StaticAdapter {
            config: ProviderConfig::new(kind, "id", "secret", "http://localhost/cb")
                .with_enabled(enabled),
        })
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(ProviderKind::parse("discord"), Some(ProviderKind::Discord));
        assert_eq!(ProviderKind::parse("Google"), Some(ProviderKind::Google));
        assert_eq!(ProviderKind::parse("FACEBOOK"), Some(ProviderKind::Facebook));
        assert_eq!(ProviderKind::parse("generic"), Some(ProviderKind::Generic));
        assert_eq!(ProviderKind::parse("myspace"), None);
    }

    #[test]
    fn test_provider_urls() {
        assert!(ProviderKind::Google.token_url().is_some());
        assert!(ProviderKind::Generic.token_url().is_none());
        assert_eq!(
            ProviderKind::Facebook.token_request_method(),
            TokenRequestMethod::QueryGet
        );
        assert_eq!(
            ProviderKind::Discord.token_request_method(),
            TokenRequestMethod::FormPost
        );
    }

    #[test]
    fn test_generic_config_requires_endpoints() {
        let config = ProviderConfig::new(ProviderKind::Generic, "id", "secret", "cb");
        assert!(matches!(config.get_token_url(), Err(AuthError::ConfigError(_))));

        let config = config.with_endpoints("https://a/auth", "https://a/token", "https://a/me");
        assert_eq!(config.get_token_url().unwrap(), "https://a/token");
        assert_eq!(config.get_profile_url().unwrap(), "https://a/me");
    }

    #[test]
    fn test_config_defaults() {
        let config = ProviderConfig::new(ProviderKind::Discord, "id", "secret", "cb");
        assert_eq!(config.id, "discord");
        assert_eq!(config.scope_string(), "identify email");
        assert!(config.require_verified_email);
        assert!(!format!("{:?}", config).contains("secret\""));

        let config = ProviderConfig::new(ProviderKind::Facebook, "id", "secret", "cb");
        assert!(!config.require_verified_email);
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let mut registry = ProviderRegistry::new();
        registry.register(adapter(ProviderKind::Discord, true));

        assert_eq!(registry.get("Discord").unwrap().id(), "discord");
        assert_eq!(registry.get("DISCORD").unwrap().id(), "discord");
        assert!(matches!(registry.get("google"), Err(AuthError::UnknownProvider(_))));
    }

    #[test]
    fn test_registry_reports_disabled() {
        let mut registry = ProviderRegistry::new();
        registry.register(adapter(ProviderKind::Google, false));
        assert!(matches!(registry.get("google"), Err(AuthError::DisabledProvider(_))));
        assert_eq!(registry.ids(), vec!["google".to_string()]);
    }

    #[test]
    fn test_verified_email_policy() {
        let adapter = adapter(ProviderKind::Discord, true);
        let mut profile = ExternalProfile {
            entity_id: Some("1".to_string()),
            email: Some("a@b.c".to_string()),
            email_verified: false,
            ..Default::default()
        };
        assert!(matches!(
            adapter.check_policy(&profile),
            Err(AuthError::PolicyViolation(_))
        ));

        profile.email_verified = true;
        assert!(adapter.check_policy(&profile).is_ok());

        profile.email = None;
        assert!(adapter.check_policy(&profile).is_err());
    }

    #[test]
    fn test_optional_email_policy() {
        let adapter = adapter(ProviderKind::Facebook, true);
        let profile = ExternalProfile {
            entity_id: Some("1".to_string()),
            ..Default::default()
        };
        assert!(adapter.check_policy(&profile).is_ok());
    }

    #[tokio::test]
    async fn test_registration_not_allowed() {
        let adapter = adapter(ProviderKind::Google, true);
        assert!(matches!(
            adapter.register().await,
            Err(AuthError::RegistrationNotAllowed(ref id)) if id == "google"
        ));
    }
}
