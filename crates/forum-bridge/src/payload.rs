//! SSO payload encoding and decoding.
//!
//! A payload is a URL-encoded query string, base64-encoded. Outbound payloads
//! describe a storefront customer to the forum; inbound payloads are login
//! requests from the forum carrying a nonce and the URL to return to.
//!
//! Decoding never runs before the signature has been checked; see
//! [`crate::client::ForumBridge::verify_payload`].

use crate::error::{BridgeError, BridgeResult};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::form_urlencoded;

/// A storefront customer as the forum should see them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumUser {
    /// Stable storefront identifier shared with the forum
    pub external_id: String,

    /// Email address
    pub email: String,

    /// Forum username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Avatar image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Skip the forum's welcome message for this user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_welcome_message: Option<bool>,
}

impl ForumUser {
    /// Create a user with the required attributes.
    pub fn new(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            email: email.into(),
            username: None,
            name: None,
            avatar_url: None,
            suppress_welcome_message: None,
        }
    }

    /// Set the forum username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the avatar URL.
    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// Suppress the forum welcome message.
    pub fn suppress_welcome(mut self) -> Self {
        self.suppress_welcome_message = Some(true);
        self
    }
}

/// Outbound payload: a nonce plus the user's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoPayload {
    /// Nonce echoed from the forum request, or a fresh one for sync
    pub nonce: String,

    /// The user being asserted
    pub user: ForumUser,
}

impl SsoPayload {
    /// Create a payload for a user.
    pub fn new(nonce: impl Into<String>, user: ForumUser) -> Self {
        Self {
            nonce: nonce.into(),
            user,
        }
    }

    /// Create a payload with a random nonce, for admin sync calls.
    pub fn for_sync(user: ForumUser) -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(hex::encode(bytes), user)
    }

    /// URL-encode the fields in a fixed order.
    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("nonce", &self.nonce);
        query.append_pair("external_id", &self.user.external_id);
        query.append_pair("email", &self.user.email);
        if let Some(ref username) = self.user.username {
            query.append_pair("username", username);
        }
        if let Some(ref name) = self.user.name {
            query.append_pair("name", name);
        }
        if let Some(ref avatar_url) = self.user.avatar_url {
            query.append_pair("avatar_url", avatar_url);
        }
        if let Some(suppress) = self.user.suppress_welcome_message {
            query.append_pair("suppress_welcome_message", if suppress { "true" } else { "false" });
        }
        query.finish()
    }

    /// Base64 form sent as the `sso` parameter.
    pub fn encode(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_query())
    }
}

/// Inbound login request from the forum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSsoRequest {
    /// Nonce that must be echoed back
    pub nonce: String,

    /// Where the forum wants the signed response delivered
    pub return_sso_url: String,

    /// Any other parameters the forum sent
    pub extra: HashMap<String, String>,
}

impl InboundSsoRequest {
    /// Decode a base64 `sso` parameter.
    ///
    /// Fails with `MalformedPayload` unless both `nonce` and `return_sso_url`
    /// are present and non-empty.
    pub fn decode(encoded: &str) -> BridgeResult<Self> {
        // The forum wraps base64 output at 60 columns.
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|_| BridgeError::MalformedPayload("not valid base64".to_string()))?;
        let query = String::from_utf8(bytes)
            .map_err(|_| BridgeError::MalformedPayload("not valid UTF-8".to_string()))?;

        let mut fields: HashMap<String, String> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let nonce = fields
            .remove("nonce")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| BridgeError::MalformedPayload("missing nonce".to_string()))?;
        let return_sso_url = fields
            .remove("return_sso_url")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| BridgeError::MalformedPayload("missing return_sso_url".to_string()))?;

        Ok(Self {
            nonce,
            return_sso_url,
            extra: fields,
        })
    }
}
