//! Persistent per-webhook message queue

use super::message::WebhookMessage;
use std::sync::Arc;
use structwatch_common::types::WebhookId;
use structwatch_common::{Error, Result};
use structwatch_storage::{QueueList, QueueRepository};
use tracing::{debug, info};

/// FIFO of messages waiting to be delivered to each webhook
#[derive(Clone)]
pub struct WebhookQueue {
    queue: Arc<dyn QueueRepository>,
}

impl WebhookQueue {
    pub fn new(queue: Arc<dyn QueueRepository>) -> Self {
        Self { queue }
    }

    /// Append a message to the main list. Returns the new queue length.
    pub async fn enqueue(&self, webhook_id: WebhookId, message: &WebhookMessage) -> Result<i64> {
        if message.is_empty() {
            return Err(Error::Validation(
                "message needs content or at least one embed".to_string(),
            ));
        }
        let payload = serde_json::to_value(message)?;
        let len = self.queue.push(webhook_id, QueueList::Main, payload).await?;
        debug!(webhook_id, queue_size = len, "Message enqueued");
        Ok(len)
    }

    /// Append one message to each webhook's main list, all or nothing
    pub async fn enqueue_all(&self, messages: &[(WebhookId, WebhookMessage)]) -> Result<()> {
        let mut entries = Vec::with_capacity(messages.len());
        for (webhook_id, message) in messages {
            if message.is_empty() {
                return Err(Error::Validation(
                    "message needs content or at least one embed".to_string(),
                ));
            }
            entries.push((*webhook_id, serde_json::to_value(message)?));
        }
        self.queue.push_all(QueueList::Main, entries).await?;
        debug!(webhooks = messages.len(), "Message enqueued");
        Ok(())
    }

    /// Number of messages waiting on the main list
    pub async fn queue_size(&self, webhook_id: WebhookId) -> Result<i64> {
        self.queue.len(webhook_id, QueueList::Main).await
    }

    /// Number of messages parked after failed sends
    pub async fn error_queue_size(&self, webhook_id: WebhookId) -> Result<i64> {
        self.queue.len(webhook_id, QueueList::Error).await
    }

    /// Drop everything queued for a webhook
    pub async fn clear_queue(&self, webhook_id: WebhookId) -> Result<u64> {
        let deleted = self.queue.clear(webhook_id).await?;
        info!(webhook_id, deleted, "Webhook queue cleared");
        Ok(deleted)
    }

    pub(crate) fn repository(&self) -> &Arc<dyn QueueRepository> {
        &self.queue
    }
}
