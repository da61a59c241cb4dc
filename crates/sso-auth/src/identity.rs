//! Identity resolution.
//!
//! An [`AuthIdentity`] records that an external account maps to a customer
//! of this storefront. Identities are keyed by `(provider, entity_id)`,
//! created at most once per key and never deleted here.

use crate::error::{AuthError, AuthResult};
use crate::oauth::ExternalProfile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Profile attributes copied from the provider at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    /// Email address
    pub email: Option<String>,

    /// Whether the provider verified the email
    pub email_verified: bool,

    /// Display name
    pub name: Option<String>,

    /// Avatar URL
    pub avatar_url: Option<String>,
}

/// What the provider granted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Scopes requested from the provider
    pub scope: Vec<String>,
}

/// Durable mapping of an external account to the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    /// Local identifier
    pub id: Uuid,

    /// Provider id
    pub provider: String,

    /// Provider-stable external id
    pub entity_id: String,

    /// User metadata
    pub user_metadata: UserMetadata,

    /// Provider metadata
    pub provider_metadata: ProviderMetadata,

    /// When the identity was created
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl AuthIdentity {
    /// Create a new identity record.
    pub fn new(
        provider: impl Into<String>,
        entity_id: impl Into<String>,
        user_metadata: UserMetadata,
        provider_metadata: ProviderMetadata,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            provider: provider.into(),
            entity_id: entity_id.into(),
            user_metadata,
            provider_metadata,
            created_at: Utc::now(),
        }
    }
}

/// Result of a resolve-or-create.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    /// The identity
    pub identity: AuthIdentity,

    /// Whether this call created it
    pub created: bool,
}

/// Storage for identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find an identity by provider and external id.
    async fn find(&self, provider: &str, entity_id: &str) -> AuthResult<Option<AuthIdentity>>;

    /// Insert unless one already exists for the same key.
    ///
    /// Returns the stored identity and whether this call inserted it. The
    /// check and insert must be atomic.
    async fn insert_if_absent(&self, identity: AuthIdentity) -> AuthResult<(AuthIdentity, bool)>;
}

/// In-memory identity store.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<(String, String), AuthIdentity>>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find(&self, provider: &str, entity_id: &str) -> AuthResult<Option<AuthIdentity>> {
        let identities = self.identities.read().await;
        Ok(identities
            .get(&(provider.to_string(), entity_id.to_string()))
            .cloned())
    }

    async fn insert_if_absent(&self, identity: AuthIdentity) -> AuthResult<(AuthIdentity, bool)> {
        let mut identities = self.identities.write().await;
        let key = (identity.provider.clone(), identity.entity_id.clone());
        if let Some(existing) = identities.get(&key) {
            return Ok((existing.clone(), false));
        }
        identities.insert(key, identity.clone());
        Ok((identity, true))
    }
}

/// Finds or creates identities for verified profiles.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Create a resolver over a store.
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Look up the identity for `profile`, creating it on first login.
    ///
    /// A profile without a usable external id never creates a record.
    pub async fn resolve_or_create(
        &self,
        provider: &str,
        profile: &ExternalProfile,
        scope: &[String],
    ) -> AuthResult<ResolvedIdentity> {
        let entity_id = profile
            .entity_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AuthError::InvalidProfileData("profile has no external id".to_string())
            })?;

        if let Some(identity) = self.store.find(provider, entity_id).await? {
            debug!(provider, identity_id = %identity.id, "Resolved existing identity");
            return Ok(ResolvedIdentity {
                identity,
                created: false,
            });
        }

        let candidate = AuthIdentity::new(
            provider,
            entity_id,
            UserMetadata {
                email: profile.email.clone(),
                email_verified: profile.email_verified,
                name: profile.name.clone(),
                avatar_url: profile.avatar_url.clone(),
            },
            ProviderMetadata {
                scope: scope.to_vec(),
            },
        );

        let (identity, created) = self.store.insert_if_absent(candidate).await?;
        if created {
            info!(provider, identity_id = %identity.id, "Created identity");
        }
        Ok(ResolvedIdentity { identity, created })
    }
}
