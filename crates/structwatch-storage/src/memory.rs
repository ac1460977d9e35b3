//! In-memory implementation of all repositories
//!
//! Mirrors the semantics of the PostgreSQL repositories, including the
//! unique constraints the pipeline relies on for idempotency.

use crate::models::{
    Alert, AlertConfigKind, FuelAlertConfig, FuelAlertRecord, JumpFuelAlertConfig, NewAlert,
    NewWebhook, Owner, QueueEntry, QueueList, Structure, SyncState, Webhook,
};
use crate::repository::alert_configs::check_no_overlap;
use crate::repository::{
    AlertConfigRepository, AlertRepository, FuelAlertRepository, OwnerRepository,
    QueueRepository, StructureRepository, SyncStateRepository, WebhookRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use structwatch_common::types::{
    AlertConfigId, EveId, NotificationId, OwnerId, StructureId, Subsystem, SyncError, WebhookId,
};
use structwatch_common::{Error, Result};
use uuid::Uuid;

type RecordKey = (StructureId, AlertConfigKind, AlertConfigId, i64);

#[derive(Default)]
struct Inner {
    owners: BTreeMap<OwnerId, Owner>,
    structures: BTreeMap<StructureId, Structure>,
    alerts: Vec<Alert>,
    fuel_configs: BTreeMap<AlertConfigId, FuelAlertConfig>,
    jump_fuel_configs: BTreeMap<AlertConfigId, JumpFuelAlertConfig>,
    records: BTreeMap<RecordKey, FuelAlertRecord>,
    webhooks: BTreeMap<WebhookId, Webhook>,
    owner_webhooks: BTreeSet<(OwnerId, WebhookId)>,
    structure_webhooks: BTreeSet<(StructureId, WebhookId)>,
    queue: Vec<QueueEntry>,
    sync_states: BTreeMap<(OwnerId, Subsystem), SyncState>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared in-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    /// All entries of a webhook list in queue order
    pub fn queue_snapshot(&self, webhook_id: WebhookId, list: QueueList) -> Result<Vec<QueueEntry>> {
        let inner = self.lock()?;
        let mut entries: Vec<QueueEntry> = inner
            .queue
            .iter()
            .filter(|e| e.webhook_id == webhook_id && e.list == list.as_str())
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.position);
        Ok(entries)
    }
}

#[async_trait]
impl OwnerRepository for MemoryStore {
    async fn get(&self, id: OwnerId) -> Result<Option<Owner>> {
        Ok(self.lock()?.owners.get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Owner>> {
        Ok(self
            .lock()?
            .owners
            .values()
            .filter(|o| o.is_active)
            .cloned()
            .collect())
    }

    async fn upsert(&self, owner: &Owner) -> Result<()> {
        self.lock()?.owners.insert(owner.corporation_id, owner.clone());
        Ok(())
    }

    async fn update_refresh_token(&self, id: OwnerId, refresh_token: &str) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(owner) = inner.owners.get_mut(&id) {
            owner.refresh_token = Some(refresh_token.to_string());
            owner.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl StructureRepository for MemoryStore {
    async fn get(&self, id: StructureId) -> Result<Option<Structure>> {
        Ok(self.lock()?.structures.get(&id).cloned())
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Structure>> {
        let mut structures: Vec<Structure> = self
            .lock()?
            .structures
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        structures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(structures)
    }

    async fn list_with_fuel_expiry(&self) -> Result<Vec<Structure>> {
        Ok(self
            .lock()?
            .structures
            .values()
            .filter(|s| s.fuel_expires_at.is_some())
            .cloned()
            .collect())
    }

    async fn list_jump_gates(&self) -> Result<Vec<Structure>> {
        Ok(self
            .lock()?
            .structures
            .values()
            .filter(|s| s.is_jump_gate())
            .cloned()
            .collect())
    }

    async fn find_by_moon(&self, moon_id: EveId) -> Result<Option<Structure>> {
        Ok(self
            .lock()?
            .structures
            .values()
            .find(|s| s.eve_moon_id == Some(moon_id))
            .cloned())
    }

    async fn find_by_planet(&self, planet_id: EveId) -> Result<Option<Structure>> {
        Ok(self
            .lock()?
            .structures
            .values()
            .find(|s| s.eve_planet_id == Some(planet_id))
            .cloned())
    }

    async fn upsert(&self, structure: &Structure) -> Result<Option<Structure>> {
        Ok(self
            .lock()?
            .structures
            .insert(structure.id, structure.clone()))
    }

    async fn delete_missing(&self, owner_id: OwnerId, keep: &[StructureId]) -> Result<u64> {
        let mut inner = self.lock()?;
        let doomed: Vec<StructureId> = inner
            .structures
            .values()
            .filter(|s| s.owner_id == owner_id && !keep.contains(&s.id))
            .map(|s| s.id)
            .collect();
        for id in &doomed {
            inner.structures.remove(id);
            inner.records.retain(|k, _| k.0 != *id);
            inner.structure_webhooks.retain(|(s, _)| s != id);
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl AlertRepository for MemoryStore {
    async fn insert_if_absent(&self, input: &NewAlert) -> Result<bool> {
        let mut inner = self.lock()?;
        let exists = inner.alerts.iter().any(|a| {
            a.owner_id == input.owner_id && a.notification_id == input.notification_id
        });
        if exists {
            return Ok(false);
        }
        let id = inner.next_id();
        inner.alerts.push(Alert {
            id,
            owner_id: input.owner_id,
            notification_id: input.notification_id,
            notif_type: input.notif_type.clone(),
            timestamp: input.timestamp,
            sender_id: input.sender_id,
            sender_type: input.sender_type.clone(),
            text: input.text.clone(),
            is_read: input.is_read,
            is_sent: false,
            is_timer_added: false,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn get(
        &self,
        owner_id: OwnerId,
        notification_id: NotificationId,
    ) -> Result<Option<Alert>> {
        Ok(self
            .lock()?
            .alerts
            .iter()
            .find(|a| a.owner_id == owner_id && a.notification_id == notification_id)
            .cloned())
    }

    async fn list_unsent(&self, owner_id: OwnerId, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .lock()?
            .alerts
            .iter()
            .filter(|a| a.owner_id == owner_id && !a.is_sent && a.timestamp > since)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| (a.timestamp, a.notification_id));
        Ok(alerts)
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        if let Some(alert) = self.lock()?.alerts.iter_mut().find(|a| a.id == id) {
            alert.is_sent = true;
        }
        Ok(())
    }

    async fn list_timer_pending(
        &self,
        owner_id: OwnerId,
        notif_types: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .lock()?
            .alerts
            .iter()
            .filter(|a| {
                a.owner_id == owner_id
                    && !a.is_timer_added
                    && a.timestamp > since
                    && notif_types.contains(&a.notif_type)
            })
            .cloned()
            .collect();
        alerts.sort_by_key(|a| (a.timestamp, a.notification_id));
        Ok(alerts)
    }

    async fn mark_timer_added(&self, id: i64) -> Result<()> {
        if let Some(alert) = self.lock()?.alerts.iter_mut().find(|a| a.id == id) {
            alert.is_timer_added = true;
        }
        Ok(())
    }
}

#[async_trait]
impl AlertConfigRepository for MemoryStore {
    async fn list_fuel_configs(&self) -> Result<Vec<FuelAlertConfig>> {
        Ok(self.lock()?.fuel_configs.values().cloned().collect())
    }

    async fn list_jump_fuel_configs(&self) -> Result<Vec<JumpFuelAlertConfig>> {
        Ok(self.lock()?.jump_fuel_configs.values().cloned().collect())
    }

    async fn create_fuel_config(&self, config: &FuelAlertConfig) -> Result<FuelAlertConfig> {
        let mut inner = self.lock()?;
        let existing: Vec<FuelAlertConfig> = inner.fuel_configs.values().cloned().collect();
        let mut created = config.clone();
        created.id = 0;
        check_no_overlap(&created, &existing)?;
        created.id = inner.next_id();
        inner.fuel_configs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_fuel_config(&self, config: &FuelAlertConfig) -> Result<()> {
        let mut inner = self.lock()?;
        let existing: Vec<FuelAlertConfig> = inner.fuel_configs.values().cloned().collect();
        check_no_overlap(config, &existing)?;
        let old = inner
            .fuel_configs
            .get(&config.id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("fuel alert config {}", config.id)))?;
        if old.start_hours != config.start_hours
            || old.end_hours != config.end_hours
            || old.repeat_hours != config.repeat_hours
        {
            inner
                .records
                .retain(|k, _| !(k.1 == AlertConfigKind::Fuel && k.2 == config.id));
        }
        inner.fuel_configs.insert(config.id, config.clone());
        Ok(())
    }

    async fn create_jump_fuel_config(
        &self,
        config: &JumpFuelAlertConfig,
    ) -> Result<JumpFuelAlertConfig> {
        if config.threshold < 0 {
            return Err(Error::Validation(
                "Threshold must not be negative".to_string(),
            ));
        }
        let mut inner = self.lock()?;
        let mut created = config.clone();
        created.id = inner.next_id();
        inner.jump_fuel_configs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_jump_fuel_config(&self, config: &JumpFuelAlertConfig) -> Result<()> {
        let mut inner = self.lock()?;
        let old = inner
            .jump_fuel_configs
            .get(&config.id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("jump fuel alert config {}", config.id)))?;
        if old.threshold != config.threshold {
            inner
                .records
                .retain(|k, _| !(k.1 == AlertConfigKind::JumpFuel && k.2 == config.id));
        }
        inner.jump_fuel_configs.insert(config.id, config.clone());
        Ok(())
    }
}

#[async_trait]
impl FuelAlertRepository for MemoryStore {
    async fn try_record(
        &self,
        structure_id: StructureId,
        kind: AlertConfigKind,
        config_id: AlertConfigId,
        bucket: i64,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        let key = (structure_id, kind, config_id, bucket);
        if inner.records.contains_key(&key) {
            return Ok(false);
        }
        inner.records.insert(
            key,
            FuelAlertRecord {
                structure_id,
                config_kind: kind.as_str().to_string(),
                config_id,
                bucket,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn list_for_structure(&self, structure_id: StructureId) -> Result<Vec<FuelAlertRecord>> {
        Ok(self
            .lock()?
            .records
            .iter()
            .filter(|(k, _)| k.0 == structure_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn clear_for_structure(
        &self,
        structure_id: StructureId,
        kind: AlertConfigKind,
    ) -> Result<u64> {
        let mut inner = self.lock()?;
        let before = inner.records.len();
        inner
            .records
            .retain(|k, _| !(k.0 == structure_id && k.1 == kind));
        Ok((before - inner.records.len()) as u64)
    }

    async fn clear_jump_below(&self, structure_id: StructureId, quantity: i64) -> Result<u64> {
        let mut inner = self.lock()?;
        let below: BTreeSet<AlertConfigId> = inner
            .jump_fuel_configs
            .values()
            .filter(|c| c.threshold < quantity)
            .map(|c| c.id)
            .collect();
        let before = inner.records.len();
        inner.records.retain(|k, _| {
            !(k.0 == structure_id && k.1 == AlertConfigKind::JumpFuel && below.contains(&k.2))
        });
        Ok((before - inner.records.len()) as u64)
    }
}

#[async_trait]
impl WebhookRepository for MemoryStore {
    async fn create(&self, input: NewWebhook) -> Result<Webhook> {
        let mut inner = self.lock()?;
        if inner
            .webhooks
            .values()
            .any(|w| w.name == input.name || w.url == input.url)
        {
            return Err(Error::Database(format!(
                "duplicate webhook: {}",
                input.name
            )));
        }
        let webhook = Webhook {
            id: inner.next_id(),
            name: input.name,
            url: input.url,
            is_active: true,
            notification_types: input
                .notification_types
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            ping_groups: input.ping_groups,
            has_default_pings_enabled: input.has_default_pings_enabled,
            language_code: input.language_code,
            created_at: Utc::now(),
        };
        inner.webhooks.insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    async fn get(&self, id: WebhookId) -> Result<Option<Webhook>> {
        Ok(self.lock()?.webhooks.get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Webhook>> {
        Ok(self
            .lock()?
            .webhooks
            .values()
            .filter(|w| w.is_active)
            .cloned()
            .collect())
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Webhook>> {
        let inner = self.lock()?;
        Ok(inner
            .owner_webhooks
            .iter()
            .filter(|(o, _)| *o == owner_id)
            .filter_map(|(_, w)| inner.webhooks.get(w).cloned())
            .collect())
    }

    async fn list_for_structure(&self, structure_id: StructureId) -> Result<Vec<Webhook>> {
        let inner = self.lock()?;
        Ok(inner
            .structure_webhooks
            .iter()
            .filter(|(s, _)| *s == structure_id)
            .filter_map(|(_, w)| inner.webhooks.get(w).cloned())
            .collect())
    }

    async fn link_owner(&self, owner_id: OwnerId, webhook_id: WebhookId) -> Result<()> {
        self.lock()?.owner_webhooks.insert((owner_id, webhook_id));
        Ok(())
    }

    async fn link_structure(
        &self,
        structure_id: StructureId,
        webhook_id: WebhookId,
    ) -> Result<()> {
        self.lock()?
            .structure_webhooks
            .insert((structure_id, webhook_id));
        Ok(())
    }

    async fn set_active(&self, id: WebhookId, is_active: bool) -> Result<()> {
        if let Some(webhook) = self.lock()?.webhooks.get_mut(&id) {
            webhook.is_active = is_active;
        }
        Ok(())
    }
}

#[async_trait]
impl QueueRepository for MemoryStore {
    async fn push(
        &self,
        webhook_id: WebhookId,
        list: QueueList,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let mut inner = self.lock()?;
        let position = inner.next_id();
        inner.queue.push(QueueEntry {
            id: Uuid::now_v7(),
            webhook_id,
            list: list.as_str().to_string(),
            payload,
            position,
            created_at: Utc::now(),
        });
        Ok(inner
            .queue
            .iter()
            .filter(|e| e.webhook_id == webhook_id && e.list == list.as_str())
            .count() as i64)
    }

    async fn push_all(
        &self,
        list: QueueList,
        entries: Vec<(WebhookId, serde_json::Value)>,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        for (webhook_id, payload) in entries {
            let position = inner.next_id();
            inner.queue.push(QueueEntry {
                id: Uuid::now_v7(),
                webhook_id,
                list: list.as_str().to_string(),
                payload,
                position,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn peek_front(
        &self,
        webhook_id: WebhookId,
        list: QueueList,
    ) -> Result<Option<QueueEntry>> {
        Ok(self
            .lock()?
            .queue
            .iter()
            .filter(|e| e.webhook_id == webhook_id && e.list == list.as_str())
            .min_by_key(|e| e.position)
            .cloned())
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.lock()?;
        let before = inner.queue.len();
        inner.queue.retain(|e| e.id != id);
        Ok(inner.queue.len() < before)
    }

    async fn move_to_error(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock()?;
        let position = inner.next_id();
        if let Some(entry) = inner.queue.iter_mut().find(|e| e.id == id) {
            entry.list = QueueList::Error.as_str().to_string();
            entry.position = position;
        }
        Ok(())
    }

    async fn requeue_errors(&self, webhook_id: WebhookId) -> Result<u64> {
        let mut inner = self.lock()?;
        let mut ids: Vec<(i64, Uuid)> = inner
            .queue
            .iter()
            .filter(|e| e.webhook_id == webhook_id && e.list == QueueList::Error.as_str())
            .map(|e| (e.position, e.id))
            .collect();
        ids.sort();
        for (_, id) in &ids {
            let position = inner.next_id();
            if let Some(entry) = inner.queue.iter_mut().find(|e| e.id == *id) {
                entry.list = QueueList::Main.as_str().to_string();
                entry.position = position;
            }
        }
        Ok(ids.len() as u64)
    }

    async fn len(&self, webhook_id: WebhookId, list: QueueList) -> Result<i64> {
        Ok(self
            .lock()?
            .queue
            .iter()
            .filter(|e| e.webhook_id == webhook_id && e.list == list.as_str())
            .count() as i64)
    }

    async fn clear(&self, webhook_id: WebhookId) -> Result<u64> {
        let mut inner = self.lock()?;
        let before = inner.queue.len();
        inner.queue.retain(|e| e.webhook_id != webhook_id);
        Ok((before - inner.queue.len()) as u64)
    }

    async fn webhooks_with_entries(&self) -> Result<Vec<WebhookId>> {
        let ids: BTreeSet<WebhookId> = self.lock()?.queue.iter().map(|e| e.webhook_id).collect();
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl SyncStateRepository for MemoryStore {
    async fn record(
        &self,
        owner_id: OwnerId,
        subsystem: Subsystem,
        at: DateTime<Utc>,
        error: SyncError,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        let key = (owner_id, subsystem);
        if let Some(current) = inner.sync_states.get(&key) {
            if current.last_sync > at {
                return Ok(false);
            }
        }
        inner.sync_states.insert(
            key,
            SyncState {
                owner_id,
                subsystem: subsystem.as_str().to_string(),
                last_sync: at,
                last_error: error.code(),
            },
        );
        Ok(true)
    }

    async fn get(&self, owner_id: OwnerId, subsystem: Subsystem) -> Result<Option<SyncState>> {
        Ok(self.lock()?.sync_states.get(&(owner_id, subsystem)).cloned())
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<SyncState>> {
        Ok(self
            .lock()?
            .sync_states
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
