//! # Storefront SSO Authentication
//!
//! This crate signs storefront customers in through third-party identity
//! providers and hands the resulting session to the commerce backend and the
//! community forum.
//!
//! ## Overview
//!
//! The sso-auth crate handles:
//! - **Providers**: Discord, Facebook, Google and generic OAuth 2.0 adapters
//! - **Identities**: find-or-create of the local record for an external account
//! - **CSRF state**: single-use state tokens bound to a return path
//! - **Return paths**: same-origin sanitization of post-login redirects
//! - **Sessions**: HS256 session tokens set as HTTP-only cookies
//! - **Callback flow**: the staged login from code exchange to redirect or popup reply
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sso_auth::{
//!     CallbackOrchestrator, CallbackQuery, MemoryIdentityStore, MemoryStateBackend,
//!     RequestContext, ResponseMode, SsoConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> sso_auth::AuthResult<()> {
//! let config = SsoConfig::from_env();
//! config.validate_for_production()?;
//!
//! let orchestrator = CallbackOrchestrator::from_config(
//!     &config,
//!     Arc::new(MemoryIdentityStore::new()),
//!     Arc::new(MemoryStateBackend::new()),
//!     None,
//! )?;
//!
//! // GET /auth/discord?return_to=/us/cart
//! let mut ctx = RequestContext::new();
//! let start = orchestrator
//!     .begin_login(&mut ctx, "discord", Some("/us/cart"), ResponseMode::Redirect)
//!     .await;
//!
//! // GET /auth/discord/callback?code=..&state=..
//! let mut ctx = RequestContext::from_cookie_header("discord_oauth_state=...");
//! let query = CallbackQuery::from_query_string("code=abc&state=...");
//! let response = orchestrator.handle_callback(&mut ctx, "discord", &query).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Policy
//!
//! Commerce account bootstrap and forum synchronisation are soft: they are
//! logged and never fail a login or logout. Every other failure aborts the
//! login with a short, non-sensitive reason for the customer.

pub mod callback;
pub mod commerce;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod oauth;
pub mod popup;
pub mod providers;
pub mod redirect;
pub mod session;
pub mod state;

// Re-export main types
pub use callback::{
    AbortReason, CallbackOrchestrator, CallbackQuery, LoginAborted, LoginStage, LoginSuccess,
    ResponseMode,
};
pub use commerce::{CommerceAccounts, CommerceClient, CommerceEndpoint, CommerceError, CustomerProfile};
pub use config::SsoConfig;
pub use context::{HttpResponse, RequestContext, SameSite, SetCookie};
pub use error::{AuthError, AuthResult};
pub use identity::{
    AuthIdentity, IdentityResolver, IdentityStore, MemoryIdentityStore, ProviderMetadata,
    ResolvedIdentity, UserMetadata,
};
pub use oauth::{
    ExternalProfile, ProviderAdapter, ProviderConfig, ProviderKind, ProviderRegistry,
    TokenRequestMethod, TokenResponse,
};
pub use popup::{render_failure_page, render_popup, PopupMessage};
pub use providers::{build_registry, parse_profile, OAuthAdapter};
pub use redirect::sanitize_return_path;
pub use session::{SessionClaims, SessionConfig, SessionIssuer, SESSION_COOKIE};
pub use state::{CsrfStateStore, MemoryStateBackend, StateBackend, StateEntry, StateKey};
