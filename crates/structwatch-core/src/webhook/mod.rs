//! Webhook queues and delivery
//!
//! Rendered notifications are converted to [`WebhookMessage`]s and appended
//! to a persistent queue per webhook. The [`DeliveryWorker`] drains those
//! queues, honoring rate limits and keeping failed messages for a retry.

mod message;
mod queue;
mod transport;
mod worker;

pub use message::{Embed, EmbedAuthor, EmbedFooter, EmbedThumbnail, WebhookMessage};
pub use queue::WebhookQueue;
pub use transport::{retry_after, HttpTransport, TransportError, TransportResponse, WebhookTransport};
pub use worker::{DeliveryError, DeliveryWorker, DrainReport};
