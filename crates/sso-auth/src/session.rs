//! Session tokens
//!
//! A successful login mints an HS256 JWT bound to the resolved identity. The
//! token is set as an HTTP-only cookie and forwarded to the commerce backend
//! as a bearer credential.

use crate::error::{AuthError, AuthResult};
use crate::identity::AuthIdentity;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "_storefront_session";

/// Actor type stamped on every customer session.
pub const CUSTOMER_ACTOR: &str = "customer";

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (identity id)
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Audience
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// JWT ID
    pub jti: String,

    /// Customer email, when the provider shared one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the provider verified the email
    #[serde(default)]
    pub email_verified: bool,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Provider that authenticated the customer
    pub provider: String,

    /// Provider-stable external id
    pub entity_id: String,

    /// Kind of actor
    #[serde(default = "default_actor")]
    pub actor_type: String,
}

fn default_actor() -> String {
    CUSTOMER_ACTOR.to_string()
}

impl SessionClaims {
    /// Build claims for an identity.
    pub fn for_identity(
        identity: &AuthIdentity,
        issuer: &str,
        audience: &[String],
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: identity.id.to_string(),
            iss: issuer.to_string(),
            aud: audience.to_vec(),
            exp: (now + duration).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::now_v7().to_string(),
            email: identity.user_metadata.email.clone(),
            email_verified: identity.user_metadata.email_verified,
            name: identity.user_metadata.name.clone(),
            provider: identity.provider.clone(),
            entity_id: identity.entity_id.clone(),
            actor_type: CUSTOMER_ACTOR.to_string(),
        }
    }

    /// Identity id as UUID.
    pub fn identity_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Get expiration as DateTime.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// Session token configuration.
#[derive(Clone)]
pub struct SessionConfig {
    /// HMAC secret
    pub secret: String,

    /// Token issuer
    pub issuer: String,

    /// Token audience
    pub audience: Vec<String>,

    /// Session lifetime
    pub ttl: Duration,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionConfig {
    /// Default session issuer.
    pub const DEFAULT_ISSUER: &'static str = "storefront-sso";

    /// Default session audience.
    pub const DEFAULT_AUDIENCE: &'static str = "storefront";

    /// Configuration with defaults around a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: Self::DEFAULT_ISSUER.to_string(),
            audience: vec![Self::DEFAULT_AUDIENCE.to_string()],
            ttl: Duration::hours(24),
        }
    }

    /// Set the session lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Mints and checks session tokens.
pub struct SessionIssuer {
    config: SessionConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("config", &self.config)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl SessionIssuer {
    /// Create an issuer.
    pub fn new(config: SessionConfig) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::ConfigError(
                "Session secret must not be empty".to_string(),
            ));
        }
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    /// Create with a secret and default settings.
    pub fn with_secret(secret: impl Into<String>) -> AuthResult<Self> {
        Self::new(SessionConfig::new(secret))
    }

    /// Get the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mint a session token for an identity.
    pub fn issue(&self, identity: &AuthIdentity) -> AuthResult<String> {
        let claims = SessionClaims::for_identity(
            identity,
            &self.config.issuer,
            &self.config.audience,
            self.config.ttl,
        );
        self.encode_claims(&claims)
    }

    /// Encode existing claims.
    pub fn encode_claims(&self, claims: &SessionClaims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Validate and decode a token.
    pub fn validate(&self, token: &str) -> AuthResult<SessionClaims> {
        self.decode_verified(token, true)
    }

    /// Validate a token for logout.
    ///
    /// Signature, issuer and audience are checked; expiry is not, so an
    /// expired session can still end its remote sessions.
    pub fn validate_for_logout(&self, token: &str) -> AuthResult<SessionClaims> {
        self.decode_verified(token, false)
    }

    fn decode_verified(&self, token: &str, check_expiry: bool) -> AuthResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&self.config.audience);
        validation.validate_exp = check_expiry;

        let token_data: TokenData<SessionClaims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AuthError::InvalidToken("Malformed token".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("Invalid signature".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    AuthError::InvalidToken("Invalid issuer".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    AuthError::InvalidToken("Invalid audience".to_string())
                }
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        Ok(token_data.claims)
    }

    /// Decode a token without checking its signature.
    ///
    /// # Warning
    ///
    /// The result is only an account-bootstrap email hint. It must never
    /// feed an authentication or authorization decision.
    pub fn decode_unverified(&self, token: &str) -> AuthResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;

        let token_data: TokenData<SessionClaims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ProviderMetadata, UserMetadata};

    fn test_secret() -> String {
        "test-secret-key-for-session-signing-minimum-32-chars".to_string()
    }

    fn identity() -> AuthIdentity {
        AuthIdentity::new(
            "discord",
            "80351110224678912",
            UserMetadata {
                email: Some("ada@example.com".to_string()),
                email_verified: true,
                name: Some("Ada".to_string()),
                avatar_url: None,
            },
            ProviderMetadata::default(),
        )
    }

    #[test]
    fn test_issue_and_validate() {
        let issuer = SessionIssuer::with_secret(test_secret()).unwrap();
        let identity = identity();

        let token = issuer.issue(&identity).unwrap();
        let claims = issuer.validate(&token).unwrap();

        assert_eq!(claims.identity_id(), Some(identity.id));
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
        assert!(claims.email_verified);
        assert_eq!(claims.provider, "discord");
        assert_eq!(claims.entity_id, "80351110224678912");
        assert_eq!(claims.actor_type, CUSTOMER_ACTOR);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            SessionIssuer::with_secret(""),
            Err(AuthError::ConfigError(_))
        ));
    }

    #[test]
    fn test_invalid_token() {
        let issuer = SessionIssuer::with_secret(test_secret()).unwrap();
        assert!(matches!(
            issuer.validate("invalid-token"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let ours = SessionIssuer::with_secret(test_secret()).unwrap();
        let theirs = SessionIssuer::with_secret("another-secret-of-reasonable-length!!").unwrap();

        let forged = theirs.issue(&identity()).unwrap();
        assert!(matches!(ours.validate(&forged), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token() {
        let issuer = SessionIssuer::with_secret(test_secret()).unwrap();
        let mut claims = SessionClaims::for_identity(
            &identity(),
            SessionConfig::DEFAULT_ISSUER,
            &[SessionConfig::DEFAULT_AUDIENCE.to_string()],
            Duration::hours(1),
        );
        claims.exp = Utc::now().timestamp() - 3600;

        let token = issuer.encode_claims(&claims).unwrap();
        assert!(matches!(issuer.validate(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_logout_validation_accepts_expired_but_authentic() {
        let issuer = SessionIssuer::with_secret(test_secret()).unwrap();
        let mut claims = SessionClaims::for_identity(
            &identity(),
            SessionConfig::DEFAULT_ISSUER,
            &[SessionConfig::DEFAULT_AUDIENCE.to_string()],
            Duration::hours(1),
        );
        claims.exp = Utc::now().timestamp() - 7200;
        let token = issuer.encode_claims(&claims).unwrap();

        assert!(matches!(issuer.validate(&token), Err(AuthError::TokenExpired)));
        assert_eq!(issuer.validate_for_logout(&token).unwrap().sub, claims.sub);
    }

    #[test]
    fn test_logout_validation_rejects_foreign_signature() {
        let ours = SessionIssuer::with_secret(test_secret()).unwrap();
        let theirs = SessionIssuer::with_secret("another-secret-of-reasonable-length!!").unwrap();

        let forged = theirs.issue(&identity()).unwrap();
        assert!(matches!(
            ours.validate_for_logout(&forged),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_decode_unverified_reads_foreign_tokens() {
        let ours = SessionIssuer::with_secret(test_secret()).unwrap();
        let theirs = SessionIssuer::with_secret("another-secret-of-reasonable-length!!").unwrap();

        let token = theirs.issue(&identity()).unwrap();
        let hint = ours.decode_unverified(&token).unwrap();
        assert_eq!(hint.email.as_deref(), Some("ada@example.com"));

        assert!(ours.decode_unverified("not.a.jwt").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let issuer = SessionIssuer::with_secret(test_secret()).unwrap();
        assert!(!format!("{:?}", issuer).contains("test-secret-key"));
    }
}
