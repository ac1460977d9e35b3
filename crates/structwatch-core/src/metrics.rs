//! Pipeline counters

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Counters of the delivery pipeline, registered on an injected registry
#[derive(Clone)]
pub struct PipelineMetrics {
    /// Events dropped because their type tag has no renderer
    pub unsupported_types: IntCounterVec,
    /// Events dropped because their payload failed to decode
    pub invalid_payloads: IntCounterVec,
    /// Fuel alerts not sent because their bucket had already fired
    pub suppressed_duplicates: IntCounter,
    pub messages_sent: IntCounter,
    pub messages_failed: IntCounter,
    pub messages_rate_limited: IntCounter,
    /// Queue entries whose payload could not be decoded
    pub messages_dropped: IntCounter,
}

impl PipelineMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            unsupported_types: IntCounterVec::new(
                Opts::new(
                    "structwatch_unsupported_notification_types_total",
                    "Events dropped because no renderer exists for their type",
                ),
                &["notif_type"],
            )?,
            invalid_payloads: IntCounterVec::new(
                Opts::new(
                    "structwatch_invalid_payloads_total",
                    "Events dropped because their payload is malformed",
                ),
                &["notif_type"],
            )?,
            suppressed_duplicates: IntCounter::new(
                "structwatch_fuel_alerts_suppressed_total",
                "Fuel alerts suppressed because they already fired",
            )?,
            messages_sent: IntCounter::new(
                "structwatch_webhook_messages_sent_total",
                "Messages delivered to webhooks",
            )?,
            messages_failed: IntCounter::new(
                "structwatch_webhook_messages_failed_total",
                "Message sends that failed and were parked on the error list",
            )?,
            messages_rate_limited: IntCounter::new(
                "structwatch_webhook_rate_limited_total",
                "Rate limited responses received from webhooks",
            )?,
            messages_dropped: IntCounter::new(
                "structwatch_webhook_messages_dropped_total",
                "Queued messages dropped because they could not be decoded",
            )?,
        };

        registry.register(Box::new(metrics.unsupported_types.clone()))?;
        registry.register(Box::new(metrics.invalid_payloads.clone()))?;
        registry.register(Box::new(metrics.suppressed_duplicates.clone()))?;
        registry.register(Box::new(metrics.messages_sent.clone()))?;
        registry.register(Box::new(metrics.messages_failed.clone()))?;
        registry.register(Box::new(metrics.messages_rate_limited.clone()))?;
        registry.register(Box::new(metrics.messages_dropped.clone()))?;

        Ok(metrics)
    }
}
