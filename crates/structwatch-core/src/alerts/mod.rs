//! Alerts and the fuel alert scheduler
//!
//! A [`Notification`] is what the renderer and forwarder work on. It is
//! either built from a stored remote event or generated locally from a
//! structure's timers, in which case it is temporary and never persisted.

pub mod generated;
mod scheduler;

pub use scheduler::{fuel_alert_fires, AlertScheduler, FuelAlertOutcome, SchedulerRun};

use chrono::{DateTime, Utc};
use structwatch_common::types::{
    Color, EveId, NotificationId, NotificationType, OwnerId, PingType, UnknownNotificationType,
    TEMPORARY_NOTIFICATION_ID,
};
use structwatch_storage::Alert;

/// Sender of generated alerts (DED)
pub const GENERATED_SENDER_ID: EveId = 1_000_137;

/// An event ready to be rendered and forwarded
#[derive(Debug, Clone)]
pub struct Notification {
    /// Row ID of the stored alert, `None` for temporary alerts
    pub alert_id: Option<i64>,
    pub notification_id: NotificationId,
    pub owner_id: OwnerId,
    /// Type tag as received, may be unknown
    pub notif_type: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: Option<EveId>,
    /// YAML payload
    pub text: String,
    pub color_override: Option<Color>,
    pub ping_type_override: Option<PingType>,
}

impl Notification {
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            alert_id: Some(alert.id),
            notification_id: alert.notification_id,
            owner_id: alert.owner_id,
            notif_type: alert.notif_type.clone(),
            timestamp: alert.timestamp,
            sender_id: alert.sender_id,
            text: alert.text.clone(),
            color_override: None,
            ping_type_override: None,
        }
    }

    /// A temporary alert produced locally
    pub fn temporary(
        owner_id: OwnerId,
        notif_type: NotificationType,
        text: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id: None,
            notification_id: TEMPORARY_NOTIFICATION_ID,
            owner_id,
            notif_type: notif_type.as_str().to_string(),
            timestamp,
            sender_id: Some(GENERATED_SENDER_ID),
            text,
            color_override: None,
            ping_type_override: None,
        }
    }

    pub fn with_overrides(mut self, color: Option<Color>, ping_type: Option<PingType>) -> Self {
        self.color_override = color;
        self.ping_type_override = ping_type;
        self
    }

    pub fn notif_type_enum(&self) -> Result<NotificationType, UnknownNotificationType> {
        self.notif_type.parse()
    }

    pub fn is_temporary(&self) -> bool {
        self.notification_id == TEMPORARY_NOTIFICATION_ID
    }
}
