//! Error types for the forum bridge
//!
//! Verification failures are always hard errors. Remote calls to the forum
//! are a side channel, so their failures are reported as `RemoteSyncFailed`
//! and callers decide to log and move on.

use thiserror::Error;

/// Forum bridge error types.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The signature does not match the payload
    #[error("SSO signature mismatch")]
    SignatureMismatch,

    /// The payload could not be decoded or lacks required fields
    #[error("Malformed SSO payload: {0}")]
    MalformedPayload(String),

    /// A return URL does not point at the configured forum
    #[error("Return URL is not on the forum origin: {0}")]
    InvalidReturnUrl(String),

    /// A call to the forum admin API failed
    #[error("Forum sync failed: {0}")]
    RemoteSyncFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for forum bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Soft errors are logged and swallowed by callers.
    pub fn is_soft(&self) -> bool {
        matches!(self, BridgeError::RemoteSyncFailed(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::SignatureMismatch => 403,
            BridgeError::MalformedPayload(_) | BridgeError::InvalidReturnUrl(_) => 400,
            BridgeError::RemoteSyncFailed(_) => 502,
            BridgeError::Config(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::SignatureMismatch => "SIGNATURE_MISMATCH",
            BridgeError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            BridgeError::InvalidReturnUrl(_) => "INVALID_RETURN_URL",
            BridgeError::RemoteSyncFailed(_) => "REMOTE_SYNC_FAILED",
            BridgeError::Config(_) => "CONFIG_ERROR",
        }
    }
}
