//! StructWatch Core - Notification pipeline
//!
//! This crate fetches structure data and notifications from the remote API,
//! generates fuel alerts, renders everything into webhook messages and
//! delivers them through durable per-webhook queues.

pub mod alerts;
pub mod esi;
pub mod forwarding;
pub mod metrics;
pub mod render;
pub mod sync;
pub mod timers;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use alerts::{AlertScheduler, Notification, SchedulerRun};
pub use esi::{EsiClient, FetchError};
pub use forwarding::{ForwardReport, Forwarder, SendOutcome};
pub use metrics::PipelineMetrics;
pub use render::{CachedResolver, EsiEntityResolver, NotificationRenderer, RenderError};
pub use sync::{
    AdminNotifier, LogAdminNotifier, NotificationSync, SsoTokens, StructureSync,
    SyncHealthTracker, SyncJobError,
};
pub use timers::{LogTimerSink, TimerProcessor, TimerSink};
pub use webhook::{DeliveryWorker, HttpTransport, WebhookQueue};
