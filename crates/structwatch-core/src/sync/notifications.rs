//! Fetching an owner's notifications into stored alerts

use super::{AdminNotifier, OwnerTokens, SyncHealthTracker, SyncJobError, SyncReport};
use crate::esi::EsiClient;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use structwatch_common::types::{EveId, NotificationId, Subsystem, SyncError};
use structwatch_storage::{NewAlert, Owner, Repositories};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct RemoteNotification {
    notification_id: NotificationId,
    #[serde(rename = "type")]
    notif_type: String,
    timestamp: DateTime<Utc>,
    sender_id: Option<EveId>,
    sender_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_read: Option<bool>,
}

impl RemoteNotification {
    fn into_alert(self, owner_id: i64) -> NewAlert {
        NewAlert {
            owner_id,
            notification_id: self.notification_id,
            notif_type: self.notif_type,
            timestamp: self.timestamp,
            sender_id: self.sender_id,
            sender_type: self.sender_type,
            text: self.text.unwrap_or_default(),
            is_read: self.is_read.unwrap_or(false),
        }
    }
}

/// Stores new notifications of an owner's character as alerts
pub struct NotificationSync {
    client: Arc<EsiClient>,
    tokens: Arc<dyn OwnerTokens>,
    repos: Repositories,
    health: SyncHealthTracker,
    admin: Arc<dyn AdminNotifier>,
}

impl NotificationSync {
    pub fn new(
        client: Arc<EsiClient>,
        tokens: Arc<dyn OwnerTokens>,
        repos: Repositories,
        health: SyncHealthTracker,
        admin: Arc<dyn AdminNotifier>,
    ) -> Self {
        Self {
            client,
            tokens,
            repos,
            health,
            admin,
        }
    }

    /// Fetch and store notifications, recording the outcome
    pub async fn run(&self, owner: &Owner) -> Result<SyncReport, SyncJobError> {
        let result = self.fetch_and_store(owner).await;
        self.tokens.after_sync(owner).await?;

        match &result {
            Ok(report) => {
                self.health
                    .record_success(owner.corporation_id, Subsystem::Notifications)
                    .await?;
                self.admin.notify(
                    true,
                    &format!(
                        "{}: {} notifications received, {} new, {} skipped",
                        owner.corporation_name, report.received, report.created, report.skipped
                    ),
                );
            }
            Err(e) => {
                self.health
                    .record_error(owner.corporation_id, Subsystem::Notifications, e.sync_error())
                    .await?;
                self.admin.notify(
                    false,
                    &format!(
                        "{}: failed to fetch notifications: {}",
                        owner.corporation_name, e
                    ),
                );
            }
        }
        result
    }

    async fn fetch_and_store(&self, owner: &Owner) -> Result<SyncReport, SyncJobError> {
        let character_id = owner
            .character_id
            .ok_or(SyncJobError::Token(SyncError::NoCharacter))?;
        let token = self
            .tokens
            .token_for(owner)
            .await
            .map_err(SyncJobError::Token)?;

        let items: Vec<serde_json::Value> = self
            .client
            .fetch(
                &format!("/characters/{}/notifications/", character_id),
                &[],
                Some(token.as_ref()),
            )
            .await?;

        let mut report = SyncReport {
            received: items.len(),
            ..SyncReport::default()
        };
        for item in items {
            let notification = match serde_json::from_value::<RemoteNotification>(item) {
                Ok(notification) => notification,
                Err(e) => {
                    warn!(
                        owner_id = owner.corporation_id,
                        error = %e,
                        "Skipping undecodable notification"
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            let alert = notification.into_alert(owner.corporation_id);
            if self.repos.alerts.insert_if_absent(&alert).await? {
                debug!(
                    owner_id = owner.corporation_id,
                    notification_id = alert.notification_id,
                    notif_type = %alert.notif_type,
                    "New notification"
                );
                report.created += 1;
            }
        }

        if report.created > 0 {
            info!(
                owner_id = owner.corporation_id,
                new = report.created,
                "Received new notifications"
            );
        } else {
            debug!(owner_id = owner.corporation_id, "No new notifications");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::tests::FixedTokens;
    use crate::sync::LogAdminNotifier;
    use crate::testing::owner;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use structwatch_common::config::{EsiConfig, SyncConfig};
    use structwatch_storage::{AlertRepository, MemoryStore};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job(server: &MockServer, store: Arc<MemoryStore>) -> (NotificationSync, SyncHealthTracker) {
        let config = EsiConfig {
            base_url: server.uri(),
            max_retries: 0,
            ..EsiConfig::default()
        };
        let repos = Repositories::memory(store);
        let health = SyncHealthTracker::new(repos.sync_states.clone(), SyncConfig::default());
        let job = NotificationSync::new(
            Arc::new(EsiClient::new(&config).unwrap()),
            Arc::new(FixedTokens),
            repos,
            health.clone(),
            Arc::new(LogAdminNotifier),
        );
        (job, health)
    }

    #[tokio::test]
    async fn test_notifications_are_stored_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/characters/1001/notifications/"))
            .and(header("authorization", "Bearer access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "notification_id": 1000000403,
                    "type": "StructureDestroyed",
                    "timestamp": "2023-07-28T10:00:00Z",
                    "sender_id": 1000137,
                    "sender_type": "corporation",
                    "text": "solarsystemID: 30002537\nstructureID: 1001\nstructureTypeID: 35832\n",
                    "is_read": true
                },
                {
                    "notification_id": 1000000404,
                    "type": "SomethingNew",
                    "timestamp": "2023-07-28T10:05:00Z",
                    "sender_id": 1000137,
                    "sender_type": "corporation"
                }
            ])))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let (job, health) = job(&server, store.clone());

        let first = job.run(&owner()).await.unwrap();
        assert_eq!(first.received, 2);
        assert_eq!(first.created, 2);

        let second = job.run(&owner()).await.unwrap();
        assert_eq!(second.created, 0);

        let alert = AlertRepository::get(store.as_ref(), 2001, 1000000403)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.notif_type, "StructureDestroyed");
        assert!(alert.is_read);
        assert!(!alert.is_sent);
        let unknown = AlertRepository::get(store.as_ref(), 2001, 1000000404)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unknown.text, "");

        assert!(health
            .is_fresh(2001, Subsystem::Notifications, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_malformed_notification_does_not_abort_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/characters/1001/notifications/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "notification_id": 1,
                    "type": "StructureDestroyed",
                    "timestamp": "2023-07-28T10:00:00Z",
                    "sender_id": 1000137,
                    "sender_type": "corporation",
                    "text": "solarsystemID: 30002537\nstructureID: 1001\n"
                },
                {
                    "notification_id": 2,
                    "type": "StructureDestroyed",
                    "timestamp": "not-a-date",
                    "sender_id": 1000137,
                    "sender_type": "corporation"
                }
            ])))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let (job, health) = job(&server, store.clone());

        let report = job.run(&owner()).await.unwrap();
        assert_eq!(report.received, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);

        assert!(AlertRepository::get(store.as_ref(), 2001, 1)
            .await
            .unwrap()
            .is_some());
        assert!(AlertRepository::get(store.as_ref(), 2001, 2)
            .await
            .unwrap()
            .is_none());
        assert!(health
            .is_fresh(2001, Subsystem::Notifications, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_forbidden_is_recorded_as_missing_permissions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/characters/1001/notifications/"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "forbidden"})))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let (job, health) = job(&server, store.clone());

        let result = job.run(&owner()).await;
        assert!(matches!(result, Err(SyncJobError::Fetch(_))));

        let state = structwatch_storage::SyncStateRepository::get(
            store.as_ref(),
            2001,
            Subsystem::Notifications,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(state.error_enum(), SyncError::InsufficientPermissions);
        assert!(!health
            .is_fresh(2001, Subsystem::Notifications, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_owner_without_character() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let (job, _) = job(&server, store);
        let mut owner = owner();
        owner.character_id = None;

        let result = job.run(&owner).await;
        assert!(matches!(
            result,
            Err(SyncJobError::Token(SyncError::NoCharacter))
        ));
    }
}
