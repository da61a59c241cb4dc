//! Forum bridge client.
//!
//! Holds the shared signing secret and an HTTP client for the forum admin
//! API. Verification and payload building are synchronous; admin calls are
//! async and bounded by the configured timeout.

use crate::config::ForumConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::payload::{ForumUser, InboundSsoRequest, SsoPayload};
use crate::signing::SsoSigner;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Outcome of a remote logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteLogout {
    /// The forum session was terminated
    LoggedOut,
    /// The user never existed on the forum
    NotProvisioned,
}

/// Storefront side of the forum single-sign-on handoff.
#[derive(Clone)]
pub struct ForumBridge {
    /// HTTP client instance.
    client: Client,

    /// Forum configuration.
    config: ForumConfig,

    /// Shared-secret signer.
    signer: SsoSigner,

    /// Parsed forum origin used for return URL checks.
    origin: url::Origin,
}

impl std::fmt::Debug for ForumBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForumBridge")
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ExternalUserResponse {
    user: ExternalUser,
}

#[derive(Debug, Deserialize)]
struct ExternalUser {
    id: u64,
}

impl ForumBridge {
    /// Create a bridge from configuration.
    pub fn new(config: ForumConfig) -> BridgeResult<Self> {
        let signer = SsoSigner::new(&config.sso_secret)?;
        let origin = config.origin()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            signer,
            origin,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ForumConfig {
        &self.config
    }

    /// Encode and sign a payload, returning `(sso, sig)`.
    pub fn sign_payload(&self, payload: &SsoPayload) -> (String, String) {
        let sso = payload.encode();
        let sig = self.signer.sign(&sso);
        (sso, sig)
    }

    /// Verify an inbound `sso`/`sig` pair and decode it.
    ///
    /// The signature is checked before anything in the payload is read.
    pub fn verify_payload(&self, sso: &str, sig: &str) -> BridgeResult<InboundSsoRequest> {
        if !self.signer.verify(sso, sig) {
            warn!("Rejected forum SSO payload with bad signature");
            return Err(BridgeError::SignatureMismatch);
        }
        InboundSsoRequest::decode(sso)
    }

    /// Whether `url` is on exactly the configured forum origin.
    pub fn is_valid_return_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.origin() == self.origin,
            Err(_) => false,
        }
    }

    /// Answer a forum login request for an authenticated customer.
    ///
    /// Returns the URL the browser should be redirected to: the forum's
    /// `return_sso_url` carrying a signed response with the original nonce.
    pub fn complete_login(&self, sso: &str, sig: &str, user: ForumUser) -> BridgeResult<String> {
        let request = self.verify_payload(sso, sig)?;

        if !self.is_valid_return_url(&request.return_sso_url) {
            warn!(return_url = %request.return_sso_url, "Forum SSO return URL outside forum origin");
            return Err(BridgeError::InvalidReturnUrl(request.return_sso_url));
        }

        let payload = SsoPayload::new(request.nonce, user);
        let (response_sso, response_sig) = self.sign_payload(&payload);

        let mut redirect = Url::parse(&request.return_sso_url)
            .map_err(|e| BridgeError::InvalidReturnUrl(e.to_string()))?;
        redirect
            .query_pairs_mut()
            .append_pair("sso", &response_sso)
            .append_pair("sig", &response_sig);

        debug!(external_id = %payload.user.external_id, "Completed forum SSO login");
        Ok(redirect.to_string())
    }

    /// Push a user's attributes to the forum.
    #[instrument(skip(self, user), fields(external_id = %user.external_id))]
    pub async fn sync_user(&self, user: &ForumUser) -> BridgeResult<()> {
        let payload = SsoPayload::for_sync(user.clone());
        let (sso, sig) = self.sign_payload(&payload);

        let url = self.config.url("/admin/users/sync_sso");
        let response = self
            .authorized(self.client.post(&url))
            .form(&[("sso", sso.as_str()), ("sig", sig.as_str())])
            .send()
            .await
            .map_err(|e| BridgeError::RemoteSyncFailed(format!("sync request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Forum sync_sso returned {}", status.as_u16());
            return Err(BridgeError::RemoteSyncFailed(format!(
                "sync_sso returned {}",
                status.as_u16()
            )));
        }

        info!("Synced user to forum");
        Ok(())
    }

    /// Look up the forum's user id for a storefront external id.
    ///
    /// `Ok(None)` means the forum has never seen this user.
    #[instrument(skip(self))]
    pub async fn lookup_external(&self, external_id: &str) -> BridgeResult<Option<u64>> {
        let mut url = Url::parse(&self.config.url("/users/by-external"))
            .map_err(|e| BridgeError::Config(format!("Invalid forum URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| BridgeError::Config("Forum URL cannot be a base".to_string()))?
            .push(&format!("{}.json", external_id));

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| BridgeError::RemoteSyncFailed(format!("lookup request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("User not provisioned on forum");
            return Ok(None);
        }
        if !status.is_success() {
            warn!("Forum user lookup returned {}", status.as_u16());
            return Err(BridgeError::RemoteSyncFailed(format!(
                "user lookup returned {}",
                status.as_u16()
            )));
        }

        let body: ExternalUserResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::RemoteSyncFailed(format!("invalid lookup response: {}", e)))?;
        Ok(Some(body.user.id))
    }

    /// Terminate the user's forum sessions.
    #[instrument(skip(self))]
    pub async fn logout_remote_user(&self, external_id: &str) -> BridgeResult<RemoteLogout> {
        let Some(forum_id) = self.lookup_external(external_id).await? else {
            return Ok(RemoteLogout::NotProvisioned);
        };

        let url = self.config.url(&format!("/admin/users/{}/log_out", forum_id));
        let response = self
            .authorized(self.client.post(&url))
            .send()
            .await
            .map_err(|e| BridgeError::RemoteSyncFailed(format!("logout request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(forum_id, "Forum log_out returned {}", status.as_u16());
            return Err(BridgeError::RemoteSyncFailed(format!(
                "log_out returned {}",
                status.as_u16()
            )));
        }

        info!(forum_id, "Logged user out of forum");
        Ok(RemoteLogout::LoggedOut)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Api-Username", &self.config.api_username);
        match self.config.api_key {
            Some(ref api_key) => request.header("Api-Key", api_key),
            None => request,
        }
    }
}
