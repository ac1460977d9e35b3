//! Routing of notifications to webhook queues

use crate::alerts::Notification;
use crate::metrics::PipelineMetrics;
use crate::render::{NotificationRenderer, RenderError, RenderedEmbed};
use crate::sync::SyncHealthTracker;
use crate::webhook::{Embed, WebhookMessage, WebhookQueue};
use chrono::{Duration, Utc};
use serde_yaml::Value;
use std::collections::BTreeSet;
use structwatch_common::config::{AlertsConfig, DeliveryConfig};
use structwatch_common::types::{EveId, NotificationType, PingType, StructureId, Subsystem, SyncError};
use structwatch_common::Result;
use structwatch_storage::{Owner, Repositories, Webhook};
use tracing::{debug, error, info, warn};

/// NPC corporations that player characters start in
const STARTER_CORPORATIONS: [EveId; 12] = [
    1000165, 1000166, 1000077, 1000044, 1000045, 1000167, 1000169, 1000168, 1000115, 1000172,
    1000170, 1000171,
];

/// Whether an ID belongs to an NPC corporation other than a starter corporation
pub fn is_npc_corporation(id: EveId) -> bool {
    (1_000_000..2_000_000).contains(&id) && !STARTER_CORPORATIONS.contains(&id)
}

/// Whether the notification reports an attack by an NPC corporation
pub fn is_npc_attack(notification: &Notification) -> bool {
    let Ok(notif_type) = notification.notif_type_enum() else {
        return false;
    };
    let Ok(payload) = serde_yaml::from_str::<Value>(&notification.text) else {
        return false;
    };
    let corporation_id = match notif_type {
        NotificationType::StructureUnderAttack => payload
            .get("corpLinkData")
            .and_then(Value::as_sequence)
            .and_then(|data| data.get(2))
            .and_then(Value::as_i64),
        NotificationType::OrbitalAttacked => {
            payload.get("aggressorCorpID").and_then(Value::as_i64)
        }
        _ => None,
    };
    corporation_id.map(is_npc_corporation).unwrap_or(false)
}

/// What happened to a notification handed to the forwarder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for this many webhooks
    Queued { webhooks: usize },
    /// No active webhook is subscribed to the type
    NoWebhooks,
    /// Skipped by the alliance or NPC attack rules
    Filtered,
    /// No renderer for the type tag
    Unsupported,
    /// The payload could not be decoded
    InvalidPayload,
    /// A name lookup failed, try again later
    Deferred,
}

/// Totals of forwarding one owner's new alerts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardReport {
    pub queued: usize,
    pub skipped: usize,
    pub deferred: usize,
}

/// Renders notifications and queues them on the webhooks that want them
pub struct Forwarder {
    repos: Repositories,
    renderer: NotificationRenderer,
    queue: WebhookQueue,
    health: SyncHealthTracker,
    alerts: AlertsConfig,
    delivery: DeliveryConfig,
    metrics: PipelineMetrics,
}

impl Forwarder {
    pub fn new(
        repos: Repositories,
        renderer: NotificationRenderer,
        queue: WebhookQueue,
        health: SyncHealthTracker,
        alerts: AlertsConfig,
        delivery: DeliveryConfig,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            repos,
            renderer,
            queue,
            health,
            alerts,
            delivery,
            metrics,
        }
    }

    /// Render a notification once and queue it on every relevant webhook
    pub async fn send_notification(
        &self,
        notification: &Notification,
        owner: &Owner,
    ) -> Result<SendOutcome> {
        let notif_type = match notification.notif_type_enum() {
            Ok(t) => t,
            Err(_) => {
                self.unsupported(notification);
                return Ok(SendOutcome::Unsupported);
            }
        };

        if notif_type.is_alliance_level() && owner.alliance_id.is_some() && !owner.is_alliance_main
        {
            debug!(
                owner_id = owner.corporation_id,
                notif_type = %notif_type,
                "Alliance level notification left to the alliance's main owner"
            );
            return Ok(SendOutcome::Filtered);
        }
        if !self.alerts.report_npc_attacks && is_npc_attack(notification) {
            debug!(
                notification_id = notification.notification_id,
                "Not forwarding NPC attack"
            );
            return Ok(SendOutcome::Filtered);
        }

        let webhooks = self.relevant_webhooks(notification, notif_type, owner).await?;
        if webhooks.is_empty() {
            debug!(
                owner_id = owner.corporation_id,
                notif_type = %notif_type,
                "No webhook subscribed to notification type"
            );
            return Ok(SendOutcome::NoWebhooks);
        }

        let embed = match self.renderer.render(notification, owner).await {
            Ok(embed) => embed,
            Err(RenderError::UnsupportedType(_)) => {
                self.unsupported(notification);
                return Ok(SendOutcome::Unsupported);
            }
            Err(RenderError::InvalidPayload { notif_type, message }) => {
                error!(
                    notification_id = notification.notification_id,
                    notif_type = %notif_type,
                    error = %message,
                    "Dropping notification with invalid payload"
                );
                self.metrics
                    .invalid_payloads
                    .with_label_values(&[notif_type.as_str()])
                    .inc();
                return Ok(SendOutcome::InvalidPayload);
            }
            Err(RenderError::Lookup(e)) => {
                warn!(
                    notification_id = notification.notification_id,
                    error = %e,
                    "Name lookup failed, rendering later"
                );
                return Ok(SendOutcome::Deferred);
            }
        };

        let messages: Vec<_> = webhooks
            .iter()
            .map(|webhook| (webhook.id, self.message_for(&embed, webhook, owner)))
            .collect();
        self.queue.enqueue_all(&messages).await?;
        debug!(
            notification_id = notification.notification_id,
            notif_type = %notif_type,
            webhooks = webhooks.len(),
            "Notification queued"
        );
        Ok(SendOutcome::Queued {
            webhooks: webhooks.len(),
        })
    }

    /// Forward an owner's unsent, non-stale alerts oldest first
    pub async fn forward_owner(&self, owner: &Owner) -> Result<ForwardReport> {
        let result = self.forward_owner_alerts(owner).await;
        match &result {
            Ok(_) => {
                self.health
                    .record_success(owner.corporation_id, Subsystem::Forwarding)
                    .await?
            }
            Err(e) => {
                error!(owner_id = owner.corporation_id, error = %e, "Forwarding failed");
                self.health
                    .record_error(owner.corporation_id, Subsystem::Forwarding, SyncError::Unknown)
                    .await?
            }
        }
        result
    }

    async fn forward_owner_alerts(&self, owner: &Owner) -> Result<ForwardReport> {
        let since = Utc::now() - Duration::hours(self.alerts.hours_until_stale);
        let alerts = self
            .repos
            .alerts
            .list_unsent(owner.corporation_id, since)
            .await?;

        let mut report = ForwardReport::default();
        for alert in &alerts {
            let notification = Notification::from_alert(alert);
            let outcome = self.send_notification(&notification, owner).await?;
            let done = match outcome {
                SendOutcome::Queued { .. } => {
                    report.queued += 1;
                    true
                }
                SendOutcome::Filtered | SendOutcome::Unsupported | SendOutcome::InvalidPayload => {
                    report.skipped += 1;
                    true
                }
                SendOutcome::NoWebhooks => {
                    report.skipped += 1;
                    false
                }
                SendOutcome::Deferred => {
                    report.deferred += 1;
                    false
                }
            };
            if done && !notification.is_temporary() {
                self.repos.alerts.mark_sent(alert.id).await?;
            }
        }

        if report.queued > 0 {
            info!(
                owner_id = owner.corporation_id,
                queued = report.queued,
                skipped = report.skipped,
                deferred = report.deferred,
                "Forwarded new notifications"
            );
        }
        Ok(report)
    }

    fn unsupported(&self, notification: &Notification) {
        warn!(
            notification_id = notification.notification_id,
            notif_type = %notification.notif_type,
            "No renderer for notification type, dropping it"
        );
        self.metrics
            .unsupported_types
            .with_label_values(&[notification.notif_type.as_str()])
            .inc();
    }

    /// Webhooks of the single related structure that has its own webhooks,
    /// otherwise the owner's, in both cases only those accepting the type
    async fn relevant_webhooks(
        &self,
        notification: &Notification,
        notif_type: NotificationType,
        owner: &Owner,
    ) -> Result<Vec<Webhook>> {
        let mut webhooks = None;
        if notif_type.is_structure_related() {
            let mut with_webhooks = Vec::new();
            for structure_id in self.related_structures(notification, notif_type).await? {
                let linked = self.repos.webhooks.list_for_structure(structure_id).await?;
                if !linked.is_empty() {
                    with_webhooks.push(linked);
                }
            }
            if with_webhooks.len() == 1 {
                webhooks = with_webhooks.pop();
            }
        }
        let webhooks = match webhooks {
            Some(w) => w,
            None => self.repos.webhooks.list_for_owner(owner.corporation_id).await?,
        };
        Ok(webhooks
            .into_iter()
            .filter(|w| w.accepts(notif_type))
            .collect())
    }

    /// IDs of the tracked structures a notification is about
    async fn related_structures(
        &self,
        notification: &Notification,
        notif_type: NotificationType,
    ) -> Result<BTreeSet<StructureId>> {
        let mut ids = BTreeSet::new();
        let Ok(payload) = serde_yaml::from_str::<Value>(&notification.text) else {
            return Ok(ids);
        };
        let field = |name: &str| payload.get(name).and_then(Value::as_i64);

        match notif_type {
            NotificationType::StructureReinforceChanged => {
                if let Some(infos) = payload.get("allStructureInfo").and_then(Value::as_sequence) {
                    ids.extend(
                        infos
                            .iter()
                            .filter_map(|info| info.get(0).and_then(Value::as_i64)),
                    );
                }
            }
            NotificationType::OrbitalAttacked | NotificationType::OrbitalReinforced => {
                if let Some(planet_id) = field("planetID") {
                    if let Some(structure) = self.repos.structures.find_by_planet(planet_id).await? {
                        ids.insert(structure.id);
                    }
                }
            }
            NotificationType::TowerAlertMsg
            | NotificationType::TowerResourceAlertMsg
            | NotificationType::TowerRefueledExtra
            | NotificationType::TowerReinforcedExtra => {
                if let Some(moon_id) = field("moonID") {
                    if let Some(structure) = self.repos.structures.find_by_moon(moon_id).await? {
                        ids.insert(structure.id);
                    }
                }
            }
            _ => {
                if let Some(structure_id) = field("structureID") {
                    ids.insert(structure_id);
                }
            }
        }
        Ok(ids)
    }

    fn message_for(&self, embed: &RenderedEmbed, webhook: &Webhook, owner: &Owner) -> WebhookMessage {
        let mut mentions = Vec::new();
        if embed.ping_type != PingType::None
            && webhook.has_default_pings_enabled
            && owner.has_default_pings_enabled
        {
            mentions.push(embed.ping_type.content().to_string());
        }
        let groups: BTreeSet<&String> = owner
            .ping_groups
            .iter()
            .chain(webhook.ping_groups.iter())
            .collect();
        mentions.extend(groups.into_iter().map(|role| format!("<@&{}>", role)));

        let (username, avatar_url) = if self.delivery.set_avatar {
            (
                Some(self.delivery.username.clone()),
                self.delivery.avatar_url.clone(),
            )
        } else {
            (None, None)
        };

        WebhookMessage {
            content: (!mentions.is_empty()).then(|| mentions.join(" ")),
            embeds: vec![Embed::from(embed)],
            username,
            avatar_url,
        }
    }
}
