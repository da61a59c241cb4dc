//! Error types for federated login
//!
//! This module defines every failure the login flow can report, from
//! provider lookup through code exchange, profile checks and session
//! issuance. User-facing text comes from [`AuthError::user_message`] and
//! never includes upstream response bodies.

use thiserror::Error;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No provider is registered under this id
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider is registered but switched off
    #[error("Provider is disabled: {0}")]
    DisabledProvider(String),

    /// The provider rejected the authorization code (or did not answer)
    #[error("Token exchange failed{}", .status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    TokenExchangeFailed {
        /// Upstream HTTP status, absent on transport errors and timeouts
        status: Option<u16>,
    },

    /// The provider's profile endpoint failed
    #[error("Profile fetch failed{}", .status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    ProfileFetchFailed {
        /// Upstream HTTP status, absent on transport errors and timeouts
        status: Option<u16>,
    },

    /// The profile lacks the fields needed to build an identity
    #[error("Invalid profile data: {0}")]
    InvalidProfileData(String),

    /// The profile breaks a provider policy
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Creating the commerce account failed (soft)
    #[error("Account bootstrap failed: {0}")]
    AccountBootstrapFailed(String),

    /// Password-style registration through an OAuth provider
    #[error("Registration is not allowed for provider {0}")]
    RegistrationNotAllowed(String),

    /// Session token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// Session token is invalid (malformed, bad signature, etc.)
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Soft errors are logged and never abort a login.
    pub fn is_soft(&self) -> bool {
        matches!(self, AuthError::AccountBootstrapFailed(_))
    }

    /// Check if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(self, AuthError::Internal(_) | AuthError::ConfigError(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::UnknownProvider(_) | AuthError::DisabledProvider(_) => 404,

            AuthError::TokenExchangeFailed { .. }
            | AuthError::ProfileFetchFailed { .. }
            | AuthError::InvalidProfileData(_) => 502,

            AuthError::PolicyViolation(_) => 403,
            AuthError::RegistrationNotAllowed(_) => 405,

            AuthError::TokenExpired | AuthError::InvalidToken(_) => 401,

            AuthError::AccountBootstrapFailed(_)
            | AuthError::ConfigError(_)
            | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            AuthError::DisabledProvider(_) => "DISABLED_PROVIDER",
            AuthError::TokenExchangeFailed { .. } => "TOKEN_EXCHANGE_FAILED",
            AuthError::ProfileFetchFailed { .. } => "PROFILE_FETCH_FAILED",
            AuthError::InvalidProfileData(_) => "INVALID_PROFILE_DATA",
            AuthError::PolicyViolation(_) => "POLICY_VIOLATION",
            AuthError::AccountBootstrapFailed(_) => "ACCOUNT_BOOTSTRAP_FAILED",
            AuthError::RegistrationNotAllowed(_) => "REGISTRATION_NOT_ALLOWED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Short reason safe to show the end user.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::UnknownProvider(_) | AuthError::DisabledProvider(_) => {
                "This sign-in method is not available.".to_string()
            }
            AuthError::TokenExchangeFailed { .. } => {
                "We could not complete sign-in with the provider.".to_string()
            }
            AuthError::ProfileFetchFailed { .. } => {
                "We could not read your profile from the provider.".to_string()
            }
            AuthError::InvalidProfileData(_) => {
                "The provider returned an incomplete profile.".to_string()
            }
            AuthError::PolicyViolation(reason) => reason.clone(),
            AuthError::RegistrationNotAllowed(_) => {
                "Registration is not supported for this sign-in method.".to_string()
            }
            AuthError::TokenExpired | AuthError::InvalidToken(_) => {
                "Your session is no longer valid.".to_string()
            }
            AuthError::AccountBootstrapFailed(_)
            | AuthError::ConfigError(_)
            | AuthError::Internal(_) => "Sign-in failed.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_in_display() {
        let err = AuthError::TokenExchangeFailed { status: Some(400) };
        assert_eq!(err.to_string(), "Token exchange failed with status 400");

        let err = AuthError::TokenExchangeFailed { status: None };
        assert_eq!(err.to_string(), "Token exchange failed");
    }

    #[test]
    fn test_unknown_provider_is_not_found() {
        assert_eq!(AuthError::UnknownProvider("x".to_string()).status_code(), 404);
        assert_eq!(AuthError::DisabledProvider("x".to_string()).status_code(), 404);
    }

    #[test]
    fn test_policy_message_is_actionable() {
        let err = AuthError::PolicyViolation("account email must be verified".to_string());
        assert_eq!(err.user_message(), "account email must be verified");
        assert_eq!(err.error_code(), "POLICY_VIOLATION");
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = AuthError::Internal("db password rejected".to_string());
        assert!(!err.user_message().contains("password"));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_only_bootstrap_is_soft() {
        assert!(AuthError::AccountBootstrapFailed("down".to_string()).is_soft());
        assert!(!AuthError::ProfileFetchFailed { status: Some(500) }.is_soft());
    }
}
