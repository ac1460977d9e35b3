//! Queue draining and delivery

use super::message::WebhookMessage;
use super::queue::WebhookQueue;
use super::transport::{TransportResponse, WebhookTransport};
use crate::metrics::PipelineMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use structwatch_common::config::DeliveryConfig;
use structwatch_common::types::WebhookId;
use structwatch_storage::{QueueList, Webhook, WebhookRepository};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Why a single send failed
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("still rate limited after {0} retries")]
    RateLimited(u32),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Totals of one drain of a webhook queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub sent: usize,
    pub failed: usize,
    /// Entries that could not be decoded and were deleted
    pub dropped: usize,
    /// Failed entries moved back to the main list for the next drain
    pub requeued: u64,
}

/// Delivers queued messages, one drain at a time per webhook
pub struct DeliveryWorker {
    queue: WebhookQueue,
    webhooks: Arc<dyn WebhookRepository>,
    transport: Arc<dyn WebhookTransport>,
    config: DeliveryConfig,
    metrics: PipelineMetrics,
    locks: Mutex<HashMap<WebhookId, Arc<Mutex<()>>>>,
}

impl DeliveryWorker {
    pub fn new(
        queue: WebhookQueue,
        webhooks: Arc<dyn WebhookRepository>,
        transport: Arc<dyn WebhookTransport>,
        config: DeliveryConfig,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            queue,
            webhooks,
            transport,
            config,
            metrics,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, webhook_id: WebhookId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(webhook_id).or_default().clone()
    }

    /// Forget the locks of webhooks without queued messages that no drain
    /// is holding
    async fn prune_locks(&self, queued: &[WebhookId]) {
        let mut locks = self.locks.lock().await;
        locks.retain(|id, lock| queued.contains(id) || Arc::strong_count(lock) > 1);
    }

    /// Send queued messages oldest first until the main list is empty.
    ///
    /// A message is removed only after the webhook confirmed it. Failed
    /// messages are parked on the error list and put back on the main list
    /// once the drain is done, so they are retried on the next drain.
    pub async fn drain(&self, webhook: &Webhook) -> structwatch_common::Result<DrainReport> {
        let lock = self.lock_for(webhook.id).await;
        let _guard = lock.lock().await;

        let mut report = DrainReport::default();
        if !webhook.is_active {
            debug!(webhook_id = webhook.id, "Webhook inactive, not draining");
            return Ok(report);
        }

        let repo = self.queue.repository();
        let mut first = true;
        while let Some(entry) = repo.peek_front(webhook.id, QueueList::Main).await? {
            let message: WebhookMessage = match serde_json::from_value(entry.payload.clone()) {
                Ok(message) => message,
                Err(e) => {
                    error!(
                        webhook_id = webhook.id,
                        entry_id = %entry.id,
                        error = %e,
                        "Dropping queued message that cannot be decoded"
                    );
                    repo.remove(entry.id).await?;
                    self.metrics.messages_dropped.inc();
                    report.dropped += 1;
                    continue;
                }
            };

            if !first {
                tokio::time::sleep(self.config.send_delay()).await;
            }
            first = false;

            match self.send(webhook, &message).await {
                Ok(()) => {
                    repo.remove(entry.id).await?;
                    self.metrics.messages_sent.inc();
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(
                        webhook_id = webhook.id,
                        webhook = %webhook.name,
                        error = %e,
                        "Failed to send message, parking it on the error list"
                    );
                    repo.move_to_error(entry.id).await?;
                    self.metrics.messages_failed.inc();
                    report.failed += 1;
                }
            }
        }

        report.requeued = repo.requeue_errors(webhook.id).await?;
        if report.sent > 0 || report.failed > 0 || report.dropped > 0 {
            info!(
                webhook_id = webhook.id,
                sent = report.sent,
                failed = report.failed,
                dropped = report.dropped,
                requeued = report.requeued,
                "Webhook queue drained"
            );
        }
        Ok(report)
    }

    /// Drain every active webhook that has queued messages, concurrently
    pub async fn drain_all(self: &Arc<Self>) -> structwatch_common::Result<DrainReport> {
        let ids = self.queue.repository().webhooks_with_entries().await?;
        self.prune_locks(&ids).await;
        let mut tasks = JoinSet::new();
        for id in ids {
            let Some(webhook) = self.webhooks.get(id).await? else {
                continue;
            };
            if !webhook.is_active {
                continue;
            }
            let worker = Arc::clone(self);
            tasks.spawn(async move { worker.drain(&webhook).await });
        }

        let mut total = DrainReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(report)) => {
                    total.sent += report.sent;
                    total.failed += report.failed;
                    total.dropped += report.dropped;
                    total.requeued += report.requeued;
                }
                Ok(Err(e)) => error!(error = %e, "Failed to drain webhook queue"),
                Err(e) => error!(error = %e, "Drain task panicked"),
            }
        }
        Ok(total)
    }

    /// Post one message, waiting out rate limits up to the configured
    /// number of retries
    pub async fn send(&self, webhook: &Webhook, message: &WebhookMessage) -> Result<(), DeliveryError> {
        let mut retries = 0;
        loop {
            let response = self
                .transport
                .post(&webhook.url, message)
                .await
                .map_err(|e| DeliveryError::Transport(e.0))?;

            match response {
                TransportResponse::Delivered => return Ok(()),
                TransportResponse::Rejected { status, body } => {
                    return Err(DeliveryError::Rejected { status, body })
                }
                TransportResponse::RateLimited(wait) => {
                    self.metrics.messages_rate_limited.inc();
                    if retries >= self.config.max_rate_limit_retries {
                        return Err(DeliveryError::RateLimited(retries));
                    }
                    retries += 1;
                    let wait = wait
                        .unwrap_or_else(|| self.config.default_retry_after())
                        .min(self.config.max_retry_after());
                    debug!(
                        webhook_id = webhook.id,
                        wait_ms = wait.as_millis() as u64,
                        retries,
                        "Rate limited by webhook"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Send a test message right away, bypassing the queue
    pub async fn send_test_message(&self, webhook: &Webhook, app_title: &str) -> Result<(), DeliveryError> {
        let message = WebhookMessage {
            content: Some(format!("Test message for webhook **{}**", webhook.name)),
            username: Some(app_title.to_string()),
            ..WebhookMessage::default()
        };
        self.send(webhook, &message).await
    }
}
