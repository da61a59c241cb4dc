//! Account lifecycle events delivered to the forum in the background.
//!
//! Storefront signup, login and logout must not wait on the forum. Callers
//! hand events to [`AccountEventDispatcher::emit`], which spawns a task per
//! event; failures are logged there and never returned to the caller.

use crate::client::ForumBridge;
use crate::error::BridgeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::payload::ForumUser;

/// Account lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountEvent {
    /// A storefront account was created
    Created(ForumUser),
    /// An existing account logged in
    LoggedIn(ForumUser),
    /// An account logged out
    LoggedOut {
        /// Stable storefront identifier
        external_id: String,
    },
}

impl AccountEvent {
    /// Event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            AccountEvent::Created(_) => "account.created",
            AccountEvent::LoggedIn(_) => "account.logged_in",
            AccountEvent::LoggedOut { .. } => "account.logged_out",
        }
    }

    /// External id the event concerns.
    pub fn external_id(&self) -> &str {
        match self {
            AccountEvent::Created(user) | AccountEvent::LoggedIn(user) => &user.external_id,
            AccountEvent::LoggedOut { external_id } => external_id,
        }
    }
}

/// Receiver of account events.
#[async_trait]
pub trait AccountEventHandler: Send + Sync {
    /// Handle one event. Errors are logged by the dispatcher.
    async fn handle(&self, event: AccountEvent) -> BridgeResult<()>;
}

#[async_trait]
impl AccountEventHandler for ForumBridge {
    async fn handle(&self, event: AccountEvent) -> BridgeResult<()> {
        match event {
            AccountEvent::Created(user) | AccountEvent::LoggedIn(user) => {
                self.sync_user(&user).await
            }
            AccountEvent::LoggedOut { external_id } => {
                self.logout_remote_user(&external_id).await.map(|_| ())
            }
        }
    }
}

/// Fire-and-forget delivery of account events.
#[derive(Clone)]
pub struct AccountEventDispatcher {
    handler: Option<Arc<dyn AccountEventHandler>>,
}

impl std::fmt::Debug for AccountEventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountEventDispatcher")
            .field("enabled", &self.handler.is_some())
            .finish()
    }
}

impl AccountEventDispatcher {
    /// Dispatch events to a handler.
    pub fn new(handler: Arc<dyn AccountEventHandler>) -> Self {
        Self {
            handler: Some(handler),
        }
    }

    /// A dispatcher that drops every event, for deployments without a forum.
    pub fn disabled() -> Self {
        Self { handler: None }
    }

    /// Whether events go anywhere.
    pub fn is_enabled(&self) -> bool {
        self.handler.is_some()
    }

    /// Emit an event without waiting for delivery.
    ///
    /// The returned handle resolves once the handler finished; callers on
    /// the request path drop it. Must be called inside a tokio runtime.
    pub fn emit(&self, event: AccountEvent) -> Option<JoinHandle<()>> {
        let handler = self.handler.clone()?;
        debug!(event = event.name(), "Dispatching account event");

        Some(tokio::spawn(async move {
            let name = event.name();
            let external_id = event.external_id().to_string();
            if let Err(e) = handler.handle(event).await {
                warn!(event = name, external_id = %external_id, error = %e, "Account event delivery failed");
            }
        }))
    }
}
