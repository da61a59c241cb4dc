//! # Forum Bridge
//!
//! Signed single-sign-on handoff between the storefront and the community
//! forum (DiscourseConnect protocol).
//!
//! ## Overview
//!
//! The forum-bridge crate handles:
//! - **Signing**: HMAC-SHA256 over base64 payloads, constant-time verification
//! - **Inbound login**: verifying a forum login request and answering it
//! - **Sync**: pushing storefront customers to the forum admin API
//! - **Remote logout**: ending a customer's forum sessions
//! - **Events**: background delivery of account lifecycle events
//!
//! ## Usage
//!
//! ```rust,no_run
//! use forum_bridge::{ForumBridge, ForumConfig, ForumUser};
//!
//! let bridge = ForumBridge::new(ForumConfig::from_env()).unwrap();
//!
//! // Forum redirected the customer to us with ?sso=..&sig=..
//! let user = ForumUser::new("cus_01H", "ada@example.com").with_name("Ada");
//! let redirect = bridge.complete_login("c3NvPQ==", "abcd", user);
//! ```
//!
//! ## Failure Policy
//!
//! `SignatureMismatch` and `MalformedPayload` are hard failures. Admin API
//! failures surface as `RemoteSyncFailed`, which the event dispatcher logs
//! and drops so that storefront signup, login and logout never depend on the
//! forum being reachable.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod signing;

// Re-export main types
pub use client::{ForumBridge, RemoteLogout};
pub use config::ForumConfig;
pub use error::{BridgeError, BridgeResult};
pub use events::{AccountEvent, AccountEventDispatcher, AccountEventHandler};
pub use payload::{ForumUser, InboundSsoRequest, SsoPayload};
pub use signing::SsoSigner;
