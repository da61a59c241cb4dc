//! Commerce backend client.
//!
//! The login flow only needs two calls from the commerce backend: read the
//! customer behind a session and create a minimal customer when none exists.
//! Both are behind [`CommerceAccounts`] so the flow can be tested without a
//! backend.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Commerce client errors.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// The session was not accepted.
    #[error("Unauthorized")]
    Unauthorized,

    /// No customer exists for the session.
    #[error("Customer not found")]
    NotFound,

    /// API returned another error response.
    #[error("API error ({status})")]
    ApiError {
        /// HTTP status code.
        status: u16,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
}

impl CommerceError {
    /// Whether the customer is missing and may be created.
    pub fn is_missing_customer(&self) -> bool {
        matches!(self, CommerceError::Unauthorized | CommerceError::NotFound)
    }
}

/// Customer as returned by the store API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    /// Customer id
    pub id: String,

    /// Email address
    pub email: String,

    /// First name
    #[serde(default)]
    pub first_name: Option<String>,

    /// Last name
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerEnvelope {
    customer: CustomerProfile,
}

#[derive(Debug, Serialize)]
struct CreateCustomerRequest<'a> {
    email: &'a str,
}

/// Account operations the login flow needs from the commerce backend.
#[async_trait]
pub trait CommerceAccounts: Send + Sync {
    /// Read the customer behind a session token.
    async fn retrieve_customer(&self, session_token: &str) -> Result<CustomerProfile, CommerceError>;

    /// Create a customer for a session token.
    async fn create_customer(
        &self,
        session_token: &str,
        email: &str,
    ) -> Result<CustomerProfile, CommerceError>;
}

/// Commerce backend endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct CommerceEndpoint {
    /// Base URL of the store API (e.g., "https://api.shop.example.com").
    pub base_url: String,

    /// Publishable key sent with every store request.
    pub publishable_key: Option<String>,
}

impl std::fmt::Debug for CommerceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommerceEndpoint")
            .field("base_url", &self.base_url)
            .field("has_publishable_key", &self.publishable_key.is_some())
            .finish()
    }
}

impl CommerceEndpoint {
    /// Build a full URL by appending a path to the base URL.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }
}

/// Store API client.
#[derive(Debug, Clone)]
pub struct CommerceClient {
    /// HTTP client instance.
    client: Client,

    /// Endpoint configuration.
    endpoint: CommerceEndpoint,
}

impl CommerceClient {
    /// Create a new commerce client.
    pub fn new(endpoint: CommerceEndpoint, timeout: Duration) -> Result<Self, CommerceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CommerceError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    fn authorized(&self, request: reqwest::RequestBuilder, session_token: &str) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(session_token);
        match self.endpoint.publishable_key {
            Some(ref key) => request.header("x-publishable-api-key", key),
            None => request,
        }
    }

    async fn handle_response(&self, response: Response) -> Result<CustomerProfile, CommerceError> {
        let status = response.status();
        match status {
            s if s.is_success() => {
                let body: CustomerEnvelope = response
                    .json()
                    .await
                    .map_err(|e| CommerceError::RequestFailed(format!("Invalid response: {}", e)))?;
                Ok(body.customer)
            }
            StatusCode::UNAUTHORIZED => Err(CommerceError::Unauthorized),
            StatusCode::NOT_FOUND => Err(CommerceError::NotFound),
            _ => {
                warn!("Commerce API returned {}", status.as_u16());
                Err(CommerceError::ApiError {
                    status: status.as_u16(),
                })
            }
        }
    }
}

#[async_trait]
impl CommerceAccounts for CommerceClient {
    #[instrument(skip_all)]
    async fn retrieve_customer(&self, session_token: &str) -> Result<CustomerProfile, CommerceError> {
        let url = self.endpoint.url("/store/customers/me");
        let response = self
            .authorized(self.client.get(&url), session_token)
            .send()
            .await
            .map_err(|e| CommerceError::RequestFailed(e.to_string()))?;
        self.handle_response(response).await
    }

    #[instrument(skip_all)]
    async fn create_customer(
        &self,
        session_token: &str,
        email: &str,
    ) -> Result<CustomerProfile, CommerceError> {
        debug!("Creating commerce customer");
        let url = self.endpoint.url("/store/customers");
        let response = self
            .authorized(self.client.post(&url), session_token)
            .json(&CreateCustomerRequest { email })
            .send()
            .await
            .map_err(|e| CommerceError::RequestFailed(e.to_string()))?;
        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let endpoint = CommerceEndpoint {
            base_url: "https://api.shop.example.com/".to_string(),
            publishable_key: None,
        };
        assert_eq!(
            endpoint.url("/store/customers/me"),
            "https://api.shop.example.com/store/customers/me"
        );
    }

    #[test]
    fn test_missing_customer_errors() {
        assert!(CommerceError::Unauthorized.is_missing_customer());
        assert!(CommerceError::NotFound.is_missing_customer());
        assert!(!CommerceError::ApiError { status: 500 }.is_missing_customer());
        assert!(!CommerceError::RequestFailed("refused".to_string()).is_missing_customer());
    }

    #[test]
    fn test_debug_hides_publishable_key() {
        let endpoint = CommerceEndpoint {
            base_url: "https://api.shop.example.com".to_string(),
            publishable_key: Some("pk_live_abc".to_string()),
        };
        assert!(!format!("{:?}", endpoint).contains("pk_live_abc"));
    }
}
