//! Per owner synchronization with the remote API
//!
//! Each job fetches one kind of data for one owner, stores it and records
//! the outcome with the [`SyncHealthTracker`].

pub mod health;
mod notifications;
mod structures;

pub use health::SyncHealthTracker;
pub use notifications::NotificationSync;
pub use structures::StructureSync;

use crate::esi::{FetchError, RefreshingToken, TokenSource};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use structwatch_common::config::SsoConfig;
use structwatch_common::types::{OwnerId, SyncError};
use structwatch_storage::{Owner, OwnerRepository};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Failure of a sync job
#[derive(Debug, Error)]
pub enum SyncJobError {
    #[error("{}", .0.description())]
    Token(SyncError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] structwatch_common::Error),
}

impl SyncJobError {
    /// Code stored in the sync state
    pub fn sync_error(&self) -> SyncError {
        match self {
            SyncJobError::Token(error) => *error,
            SyncJobError::Fetch(e) => e.sync_error(),
            SyncJobError::Storage(_) => SyncError::Unknown,
        }
    }
}

/// Totals of one sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Items received from the remote API
    pub received: usize,
    /// Items not seen before
    pub created: usize,
    /// Local items removed because the remote API no longer lists them
    pub removed: u64,
    /// Received items that could not be decoded
    pub skipped: usize,
}

/// Sink for short reports to administrators
pub trait AdminNotifier: Send + Sync {
    fn notify(&self, success: bool, message: &str);
}

/// Writes admin reports to the log
pub struct LogAdminNotifier;

impl AdminNotifier for LogAdminNotifier {
    fn notify(&self, success: bool, message: &str) {
        if success {
            info!(report = message, "Sync report");
        } else {
            warn!(report = message, "Sync report");
        }
    }
}

/// Supplies the token used for an owner's authenticated requests
#[async_trait]
pub trait OwnerTokens: Send + Sync {
    async fn token_for(&self, owner: &Owner) -> Result<Arc<dyn TokenSource>, SyncError>;

    /// Called after every sync run of the owner
    async fn after_sync(&self, _owner: &Owner) -> structwatch_common::Result<()> {
        Ok(())
    }
}

struct CachedToken {
    token: Arc<RefreshingToken>,
    /// Refresh token as last stored with the owner
    persisted: String,
}

/// Tokens of owners' characters, refreshed through SSO.
///
/// Refresh tokens rotated by SSO are written back to the owner.
pub struct SsoTokens {
    http: Client,
    sso: SsoConfig,
    owners: Arc<dyn OwnerRepository>,
    tokens: Mutex<HashMap<OwnerId, CachedToken>>,
}

impl SsoTokens {
    pub fn new(http: Client, sso: SsoConfig, owners: Arc<dyn OwnerRepository>) -> Self {
        Self {
            http,
            sso,
            owners,
            tokens: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl OwnerTokens for SsoTokens {
    async fn token_for(&self, owner: &Owner) -> Result<Arc<dyn TokenSource>, SyncError> {
        if owner.character_id.is_none() {
            return Err(SyncError::NoCharacter);
        }
        let Some(refresh_token) = owner.refresh_token.as_deref() else {
            return Err(SyncError::TokenInvalid);
        };

        let mut tokens = self.tokens.lock().await;
        if let Some(cached) = tokens.get(&owner.corporation_id) {
            if cached.persisted == refresh_token {
                return Ok(cached.token.clone());
            }
        }
        let token = Arc::new(RefreshingToken::new(
            self.http.clone(),
            &self.sso,
            refresh_token,
        ));
        tokens.insert(
            owner.corporation_id,
            CachedToken {
                token: token.clone(),
                persisted: refresh_token.to_string(),
            },
        );
        Ok(token)
    }

    async fn after_sync(&self, owner: &Owner) -> structwatch_common::Result<()> {
        let mut tokens = self.tokens.lock().await;
        let Some(cached) = tokens.get_mut(&owner.corporation_id) else {
            return Ok(());
        };
        let current = cached.token.refresh_token().await;
        if current != cached.persisted {
            self.owners
                .update_refresh_token(owner.corporation_id, &current)
                .await?;
            info!(owner_id = owner.corporation_id, "Stored rotated refresh token");
            cached.persisted = current;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::esi::StaticToken;
    use crate::testing::owner;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use structwatch_storage::MemoryStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// The same static token for every owner
    pub(crate) struct FixedTokens;

    #[async_trait]
    impl OwnerTokens for FixedTokens {
        async fn token_for(&self, _owner: &Owner) -> Result<Arc<dyn TokenSource>, SyncError> {
            Ok(Arc::new(StaticToken::new("access-token")))
        }
    }

    #[tokio::test]
    async fn test_owner_without_character_or_token() {
        let tokens = SsoTokens::new(
            Client::new(),
            SsoConfig::default(),
            Arc::new(MemoryStore::new()),
        );

        let mut no_character = owner();
        no_character.character_id = None;
        assert_eq!(
            tokens.token_for(&no_character).await.err(),
            Some(SyncError::NoCharacter)
        );

        let mut no_token = owner();
        no_token.refresh_token = None;
        assert_eq!(
            tokens.token_for(&no_token).await.err(),
            Some(SyncError::TokenInvalid)
        );
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-1",
                "expires_in": 1199,
                "token_type": "Bearer",
                "refresh_token": "refresh-2",
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        OwnerRepository::upsert(store.as_ref(), &owner()).await.unwrap();
        let sso = SsoConfig {
            token_url: format!("{}/v2/oauth/token", server.uri()),
            ..SsoConfig::default()
        };
        let tokens = SsoTokens::new(Client::new(), sso, store.clone());

        let token = tokens.token_for(&owner()).await.unwrap();
        assert_eq!(token.access_token().await.unwrap(), "access-1");
        tokens.after_sync(&owner()).await.unwrap();

        let stored = OwnerRepository::get(store.as_ref(), 2001)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-2"));

        let again = tokens.token_for(&stored).await.unwrap();
        assert_eq!(again.access_token().await.unwrap(), "access-1");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn test_job_error_codes() {
        assert_eq!(
            SyncJobError::Token(SyncError::NoCharacter).sync_error(),
            SyncError::NoCharacter
        );
        assert_eq!(
            SyncJobError::Fetch(FetchError::Transient("down".into())).sync_error(),
            SyncError::RemoteUnavailable
        );
        assert_eq!(
            SyncJobError::Storage(structwatch_common::Error::Database("gone".into()))
                .sync_error(),
            SyncError::Unknown
        );
    }
}
