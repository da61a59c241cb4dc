//! Login callback flow.
//!
//! [`CallbackOrchestrator::run`] drives one login through
//! `Received → CodeExchanged → ProfileFetched → IdentityResolved →
//! SessionIssued → AccountBootstrapped → Completed`. Any step may abort;
//! the abort records the reason and the last stage reached. Steps are
//! strictly sequential and share nothing with other logins except the CSRF
//! state backend.

use crate::commerce::{CommerceAccounts, CommerceClient};
use crate::config::SsoConfig;
use crate::context::{HttpResponse, RequestContext, SetCookie};
use crate::error::{AuthError, AuthResult};
use crate::identity::{AuthIdentity, IdentityResolver, IdentityStore};
use crate::oauth::{ProviderAdapter, ProviderRegistry};
use crate::popup::{render_failure_page, render_popup, PopupMessage};
use crate::providers::build_registry;
use crate::session::{SessionClaims, SessionConfig, SessionIssuer, SESSION_COOKIE};
use crate::state::{CsrfStateStore, StateBackend};
use forum_bridge::{AccountEvent, AccountEventDispatcher, ForumBridge, ForumUser};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Stages of one login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// Callback request accepted
    Received,
    /// Authorization code traded for tokens
    CodeExchanged,
    /// Provider profile fetched
    ProfileFetched,
    /// Local identity found or created
    IdentityResolved,
    /// Session token minted
    SessionIssued,
    /// Commerce account bootstrap attempted
    AccountBootstrapped,
    /// Response ready
    Completed,
}

/// Why a login stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// No provider with this id
    UnknownProvider,
    /// Provider switched off
    DisabledProvider,
    /// Code missing, refused or exchange failed
    ExchangeFailed,
    /// Profile endpoint failed
    ProfileFailed,
    /// Profile unusable
    InvalidProfile,
    /// Provider policy refused the profile
    PolicyViolation(String),
    /// Anything else
    Internal,
}

impl AbortReason {
    /// Classify an error.
    pub fn from_error(error: &AuthError) -> Self {
        match error {
            AuthError::UnknownProvider(_) => AbortReason::UnknownProvider,
            AuthError::DisabledProvider(_) => AbortReason::DisabledProvider,
            AuthError::TokenExchangeFailed { .. } => AbortReason::ExchangeFailed,
            AuthError::ProfileFetchFailed { .. } => AbortReason::ProfileFailed,
            AuthError::InvalidProfileData(_) => AbortReason::InvalidProfile,
            AuthError::PolicyViolation(reason) => AbortReason::PolicyViolation(reason.clone()),
            _ => AbortReason::Internal,
        }
    }
}

/// Query parameters of a provider callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackQuery {
    /// Authorization code
    pub code: Option<String>,

    /// CSRF state token
    pub state: Option<String>,

    /// Error reported by the provider (e.g., "access_denied")
    pub error: Option<String>,

    /// Provider's error description
    pub error_description: Option<String>,

    /// Provider-specific extras
    pub extra: HashMap<String, String>,
}

impl CallbackQuery {
    /// Parse a raw query string, with or without the leading `?`.
    pub fn from_query_string(query: &str) -> Self {
        let mut parsed = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            let slot = match &*key {
                "code" => &mut parsed.code,
                "state" => &mut parsed.state,
                "error" => &mut parsed.error,
                "error_description" => &mut parsed.error_description,
                other => {
                    parsed.extra.insert(other.to_string(), value);
                    continue;
                }
            };
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
        parsed
    }

    /// Callback with a code and state.
    pub fn with_code(code: impl Into<String>, state: Option<String>) -> Self {
        Self {
            code: Some(code.into()),
            state,
            ..Default::default()
        }
    }
}

/// How the login answers the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// 302 to the return path
    Redirect,
    /// Document posting a message to the opener window
    Popup,
}

impl ResponseMode {
    /// Cookie remembering the mode between start and callback.
    pub fn cookie_name(provider: &str) -> String {
        format!("{}_oauth_mode", provider.to_lowercase())
    }

    /// Mode chosen when the login started.
    pub fn from_context(ctx: &RequestContext, provider: &str) -> Self {
        match ctx.cookie(&Self::cookie_name(provider)) {
            Some("popup") => ResponseMode::Popup,
            _ => ResponseMode::Redirect,
        }
    }
}

/// A completed login.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    /// Provider id
    pub provider: String,

    /// Resolved identity
    pub identity: AuthIdentity,

    /// Whether the identity was created by this login
    pub created: bool,

    /// Session token
    pub session_token: String,

    /// Sanitized return path
    pub return_path: String,

    /// Whether the commerce account is known to exist
    pub account_bootstrapped: bool,

    /// Stages passed, in order
    pub stages: Vec<LoginStage>,
}

/// A login that stopped early.
#[derive(Debug)]
pub struct LoginAborted {
    /// Why it stopped
    pub reason: AbortReason,

    /// Last stage reached
    pub at: LoginStage,

    /// Underlying error
    pub error: AuthError,
}

impl LoginAborted {
    fn new(at: LoginStage, error: AuthError) -> Self {
        Self {
            reason: AbortReason::from_error(&error),
            at,
            error,
        }
    }
}

/// Drives provider logins end to end.
pub struct CallbackOrchestrator {
    registry: ProviderRegistry,
    states: CsrfStateStore,
    sessions: Arc<SessionIssuer>,
    commerce: Arc<dyn CommerceAccounts>,
    events: AccountEventDispatcher,
    forum: Option<Arc<ForumBridge>>,
    site_origin: String,
    popup_token: bool,
}

impl std::fmt::Debug for CallbackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackOrchestrator")
            .field("registry", &self.registry)
            .field("states", &self.states)
            .field("events", &self.events)
            .field("site_origin", &self.site_origin)
            .finish_non_exhaustive()
    }
}

impl CallbackOrchestrator {
    /// Create an orchestrator without forum integration.
    pub fn new(
        registry: ProviderRegistry,
        states: CsrfStateStore,
        sessions: SessionIssuer,
        commerce: Arc<dyn CommerceAccounts>,
        site_origin: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            states,
            sessions: Arc::new(sessions),
            commerce,
            events: AccountEventDispatcher::disabled(),
            forum: None,
            site_origin: site_origin.into(),
            popup_token: false,
        }
    }

    /// Wire everything from configuration.
    pub fn from_config(
        config: &SsoConfig,
        identities: Arc<dyn IdentityStore>,
        state_backend: Arc<dyn StateBackend>,
        forum: Option<ForumBridge>,
    ) -> AuthResult<Self> {
        let resolver = IdentityResolver::new(identities);
        let registry = build_registry(&config.providers, &resolver, config.timeout())?;
        let states = CsrfStateStore::new(
            state_backend,
            config.site_origin.clone(),
            config.default_return_path.clone(),
        )
        .with_ttl(config.state_ttl());
        let sessions = SessionIssuer::new(
            SessionConfig::new(config.session_secret.clone()).with_ttl(config.session_ttl()),
        )?;
        let commerce = CommerceClient::new(config.commerce.clone(), config.timeout())
            .map_err(|e| AuthError::ConfigError(e.to_string()))?;

        let orchestrator = Self::new(
            registry,
            states,
            sessions,
            Arc::new(commerce),
            config.site_origin.clone(),
        );
        Ok(match forum {
            Some(bridge) => orchestrator.with_forum(Arc::new(bridge)),
            None => orchestrator,
        })
    }

    /// Answer forum logins and send account events to the forum.
    pub fn with_forum(mut self, bridge: Arc<ForumBridge>) -> Self {
        self.events = AccountEventDispatcher::new(bridge.clone());
        self.forum = Some(bridge);
        self
    }

    /// Send account events somewhere else.
    pub fn with_events(mut self, events: AccountEventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// Include the session token in popup messages.
    pub fn with_popup_token(mut self, include: bool) -> Self {
        self.popup_token = include;
        self
    }

    /// Provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Session issuer.
    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    /// Start a login: remember the return path and send the browser to the
    /// provider.
    #[instrument(skip(self, ctx, return_to), fields(provider = %provider_id))]
    pub async fn begin_login(
        &self,
        ctx: &mut RequestContext,
        provider_id: &str,
        return_to: Option<&str>,
        mode: ResponseMode,
    ) -> HttpResponse {
        let result = async {
            let adapter = self.registry.get(provider_id)?;
            let token = self.states.issue(adapter.id(), return_to).await?;
            let url = adapter.authorization_url(&token)?;
            Ok::<_, AuthError>((adapter, token, url))
        }
        .await;

        match result {
            Ok((adapter, token, url)) => {
                let max_age = self.states.ttl().num_seconds();
                ctx.set_cookie(SetCookie::http_only(
                    CsrfStateStore::cookie_name(adapter.id()),
                    token,
                    max_age,
                ));
                let mode_cookie = ResponseMode::cookie_name(adapter.id());
                match mode {
                    ResponseMode::Popup => {
                        ctx.set_cookie(SetCookie::http_only(mode_cookie, "popup", max_age))
                    }
                    ResponseMode::Redirect => ctx.clear_cookie(&mode_cookie),
                }
                debug!("Redirecting to provider");
                HttpResponse::redirect(url).with_cookies(ctx)
            }
            Err(e) => {
                log_abort(&e);
                self.failure_response(ctx, provider_id, &e, mode)
            }
        }
    }

    /// Run one callback through every stage.
    #[instrument(skip(self, ctx, query), fields(provider = %provider_id))]
    pub async fn run(
        &self,
        ctx: &mut RequestContext,
        provider_id: &str,
        query: &CallbackQuery,
    ) -> Result<LoginSuccess, LoginAborted> {
        let mut stages = vec![LoginStage::Received];

        let adapter = self
            .registry
            .get(provider_id)
            .map_err(|e| LoginAborted::new(LoginStage::Received, e))?;
        let provider = adapter.id().to_string();

        let return_path = self.consume_state(ctx, &provider, query).await;

        if let Some(ref provider_error) = query.error {
            debug!(error = %provider_error, "Provider refused authorization");
            return Err(LoginAborted::new(
                LoginStage::Received,
                AuthError::TokenExchangeFailed { status: None },
            ));
        }
        let code = query.code.as_deref().filter(|c| !c.is_empty()).ok_or_else(|| {
            LoginAborted::new(LoginStage::Received, AuthError::TokenExchangeFailed { status: None })
        })?;

        let tokens = adapter
            .exchange_code(code)
            .await
            .map_err(|e| LoginAborted::new(LoginStage::Received, e))?;
        stages.push(LoginStage::CodeExchanged);

        let profile = adapter
            .fetch_profile(&tokens.access_token)
            .await
            .map_err(|e| LoginAborted::new(LoginStage::CodeExchanged, e))?;
        stages.push(LoginStage::ProfileFetched);

        adapter
            .check_policy(&profile)
            .map_err(|e| LoginAborted::new(LoginStage::ProfileFetched, e))?;
        let resolved = adapter
            .resolve_or_create_identity(&profile)
            .await
            .map_err(|e| LoginAborted::new(LoginStage::ProfileFetched, e))?;
        stages.push(LoginStage::IdentityResolved);

        let session_token = self
            .sessions
            .issue(&resolved.identity)
            .map_err(|e| LoginAborted::new(LoginStage::IdentityResolved, e))?;
        ctx.set_cookie(SetCookie::http_only(
            SESSION_COOKIE,
            session_token.clone(),
            self.sessions.config().ttl.num_seconds(),
        ));
        stages.push(LoginStage::SessionIssued);

        if let Some(user) = forum_user(&resolved.identity) {
            let event = if resolved.created {
                AccountEvent::Created(user)
            } else {
                AccountEvent::LoggedIn(user)
            };
            let _ = self.events.emit(event);
        }

        let account_bootstrapped = match self.bootstrap_account(&session_token).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Account bootstrap failed; continuing login");
                false
            }
        };
        stages.push(LoginStage::AccountBootstrapped);
        stages.push(LoginStage::Completed);

        info!(
            identity_id = %resolved.identity.id,
            created = resolved.created,
            "Login completed"
        );

        Ok(LoginSuccess {
            provider,
            identity: resolved.identity,
            created: resolved.created,
            session_token,
            return_path,
            account_bootstrapped,
            stages,
        })
    }

    /// Handle a provider callback and build the browser response.
    pub async fn handle_callback(
        &self,
        ctx: &mut RequestContext,
        provider_id: &str,
        query: &CallbackQuery,
    ) -> HttpResponse {
        let mode = ResponseMode::from_context(ctx, provider_id);
        if mode == ResponseMode::Popup {
            ctx.clear_cookie(&ResponseMode::cookie_name(provider_id));
        }

        match self.run(ctx, provider_id, query).await {
            Ok(success) => match mode {
                ResponseMode::Redirect => {
                    HttpResponse::redirect(success.return_path).with_cookies(ctx)
                }
                ResponseMode::Popup => {
                    let token = self.popup_token.then_some(success.session_token);
                    let message =
                        PopupMessage::success(&success.provider, success.return_path, token);
                    HttpResponse::html(200, render_popup(&message, &self.site_origin))
                        .with_cookies(ctx)
                }
            },
            Err(aborted) => {
                log_abort(&aborted.error);
                self.failure_response(ctx, provider_id, &aborted.error, mode)
            }
        }
    }

    /// End the storefront session.
    ///
    /// Always succeeds locally. The forum is only told about sessions whose
    /// token carries our signature, expired ones included.
    #[instrument(skip_all)]
    pub async fn logout(&self, ctx: &mut RequestContext) -> HttpResponse {
        let claims = session_token(ctx)
            .and_then(|token| self.sessions.validate_for_logout(token));
        match claims {
            Ok(claims) => {
                let _ = self.events.emit(AccountEvent::LoggedOut {
                    external_id: claims.sub,
                });
                info!("Logged out");
            }
            Err(e) => debug!(error = %e, "Logout without a valid session"),
        }

        ctx.clear_cookie(SESSION_COOKIE);
        HttpResponse::redirect(self.states.default_path()).with_cookies(ctx)
    }

    /// Answer a forum login request for the signed-in customer.
    #[instrument(skip_all)]
    pub fn forum_sso(&self, ctx: &RequestContext, sso: &str, sig: &str) -> HttpResponse {
        let Some(bridge) = self.forum.as_ref() else {
            return HttpResponse::html(404, render_failure_page("Community", "The forum is not available."));
        };

        let claims = match self.session_claims(ctx) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Forum login without a storefront session");
                return HttpResponse::redirect(self.states.default_path());
            }
        };

        let Some(email) = claims.email.clone().filter(|_| claims.email_verified) else {
            let error = AuthError::PolicyViolation(
                "a verified email address is required to join the community".to_string(),
            );
            return HttpResponse::html(
                error.status_code(),
                render_failure_page("Community", &error.user_message()),
            );
        };

        let mut user = ForumUser::new(claims.sub.clone(), email);
        if let Some(name) = claims.name.clone() {
            user = user.with_name(name);
        }

        match bridge.complete_login(sso, sig, user) {
            Ok(redirect) => HttpResponse::redirect(redirect),
            Err(e) => {
                warn!(error = %e, "Rejected forum login request");
                HttpResponse::html(
                    e.status_code(),
                    render_failure_page("Community", "The forum sign-in request was not valid."),
                )
            }
        }
    }

    /// Verified claims of the caller's session.
    pub fn session_claims(&self, ctx: &RequestContext) -> AuthResult<SessionClaims> {
        self.sessions.validate(session_token(ctx)?)
    }

    async fn consume_state(
        &self,
        ctx: &mut RequestContext,
        provider: &str,
        query: &CallbackQuery,
    ) -> String {
        let cookie_name = CsrfStateStore::cookie_name(provider);
        let cookie = ctx.cookie(&cookie_name).map(String::from);
        ctx.clear_cookie(&cookie_name);

        let Some(state) = query.state.as_deref() else {
            return self.states.default_path().to_string();
        };
        if cookie.as_deref().is_some_and(|c| c != state) {
            warn!("OAuth state does not match this browser; ignoring it");
            return self.states.default_path().to_string();
        }

        self.states
            .consume(provider, state)
            .await
            .unwrap_or_else(|| self.states.default_path().to_string())
    }

    async fn bootstrap_account(&self, session_token: &str) -> AuthResult<()> {
        match self.commerce.retrieve_customer(session_token).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_missing_customer() => {
                let hint = self
                    .sessions
                    .decode_unverified(session_token)
                    .map_err(|e| AuthError::AccountBootstrapFailed(e.to_string()))?;
                let email = hint.email.filter(|_| hint.email_verified).ok_or_else(|| {
                    AuthError::AccountBootstrapFailed(
                        "session carries no verified email".to_string(),
                    )
                })?;
                self.commerce
                    .create_customer(session_token, &email)
                    .await
                    .map_err(|e| AuthError::AccountBootstrapFailed(e.to_string()))?;
                debug!("Created commerce customer");
                Ok(())
            }
            Err(e) => Err(AuthError::AccountBootstrapFailed(e.to_string())),
        }
    }

    fn failure_response(
        &self,
        ctx: &RequestContext,
        provider_id: &str,
        error: &AuthError,
        mode: ResponseMode,
    ) -> HttpResponse {
        let response = match mode {
            ResponseMode::Redirect => {
                let name = self.display_name(provider_id);
                HttpResponse::html(
                    error.status_code(),
                    render_failure_page(&name, &error.user_message()),
                )
            }
            ResponseMode::Popup => {
                let message = PopupMessage::failure(provider_id, error.user_message());
                HttpResponse::html(error.status_code(), render_popup(&message, &self.site_origin))
            }
        };
        response.with_cookies(ctx)
    }

    fn display_name(&self, provider_id: &str) -> String {
        match self.registry.get(provider_id) {
            Ok(adapter) => adapter.config().display_name.clone(),
            Err(AuthError::DisabledProvider(id)) => id,
            Err(_) => "Sign-in".to_string(),
        }
    }
}

fn session_token(ctx: &RequestContext) -> AuthResult<&str> {
    ctx.cookie(SESSION_COOKIE)
        .or_else(|| ctx.bearer_token())
        .ok_or_else(|| AuthError::InvalidToken("No session".to_string()))
}

/// Forum profile for an identity; the forum links accounts by email, so
/// only verified addresses are sent.
fn forum_user(identity: &AuthIdentity) -> Option<ForumUser> {
    if !identity.user_metadata.email_verified {
        return None;
    }
    let email = identity.user_metadata.email.clone()?;
    let mut user = ForumUser::new(identity.id.to_string(), email);
    if let Some(ref name) = identity.user_metadata.name {
        user = user.with_name(name.clone());
    }
    if let Some(ref avatar_url) = identity.user_metadata.avatar_url {
        user = user.with_avatar_url(avatar_url.clone());
    }
    Some(user)
}

fn log_abort(error: &AuthError) {
    if error.is_server_error() {
        error!(code = error.error_code(), error = %error, "Login aborted");
    } else {
        warn!(code = error.error_code(), error = %error, "Login aborted");
    }
}
