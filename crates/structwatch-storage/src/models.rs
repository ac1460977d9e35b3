//! Database models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use structwatch_common::types::{
    AlertConfigId, Color, EveId, NotificationId, NotificationType, OwnerId, PingType,
    StructureId, StructureKind, Subsystem, SyncError, UnknownNotificationType, WebhookId,
};
use structwatch_common::{Error, Result};
use uuid::Uuid;

/// Owner model: a corporation whose structures are tracked
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Owner {
    pub corporation_id: OwnerId,
    pub corporation_name: String,
    pub alliance_id: Option<EveId>,
    pub alliance_name: Option<String>,
    /// Character whose token is used for remote API requests
    pub character_id: Option<EveId>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub is_active: bool,
    /// Whether this owner forwards alliance level notifications
    pub is_alliance_main: bool,
    pub has_default_pings_enabled: bool,
    pub ping_groups: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Owner {
    /// Name shown as author of rendered messages
    pub fn display_name(&self, alliance_level: bool) -> &str {
        match (&self.alliance_name, alliance_level) {
            (Some(alliance), true) => alliance,
            _ => &self.corporation_name,
        }
    }
}

/// Structure model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Structure {
    pub id: StructureId,
    pub owner_id: OwnerId,
    pub kind: String,
    pub name: String,
    pub eve_type_id: EveId,
    pub eve_solar_system_id: EveId,
    pub eve_moon_id: Option<EveId>,
    pub eve_planet_id: Option<EveId>,
    pub fuel_expires_at: Option<DateTime<Utc>>,
    pub jump_fuel_quantity: Option<i64>,
    /// Names of the structure's online services
    pub services: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Structure {
    /// Get the structure kind as enum
    pub fn kind_enum(&self) -> Option<StructureKind> {
        self.kind.parse().ok()
    }

    pub fn is_starbase(&self) -> bool {
        self.kind_enum() == Some(StructureKind::Starbase)
    }

    pub fn is_jump_gate(&self) -> bool {
        self.kind_enum() == Some(StructureKind::JumpGate)
    }

    /// Whether the structure currently consumes fuel
    pub fn is_burning_fuel(&self, now: DateTime<Utc>) -> bool {
        let burns = self.kind_enum().map(|k| k.burns_fuel()).unwrap_or(false);
        burns && self.fuel_expires_at.map(|at| at > now).unwrap_or(false)
    }

    /// Whole hours until the fuel runs out, rounded down
    pub fn hours_fuel_expires(&self, now: DateTime<Utc>) -> Option<i64> {
        self.fuel_expires_at
            .map(|at| (at - now).num_seconds().div_euclid(3600))
    }
}

/// Alert model: a remote event stored for one owner
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub owner_id: OwnerId,
    pub notification_id: NotificationId,
    pub notif_type: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: Option<EveId>,
    pub sender_type: Option<String>,
    /// YAML payload as delivered by the remote API
    pub text: String,
    pub is_read: bool,
    pub is_sent: bool,
    pub is_timer_added: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Get the type tag as enum
    pub fn notif_type_enum(&self) -> std::result::Result<NotificationType, UnknownNotificationType> {
        self.notif_type.parse()
    }

    /// Whether the alert is too old to be forwarded
    pub fn is_stale(&self, now: DateTime<Utc>, hours_until_stale: i64) -> bool {
        now - self.timestamp > Duration::hours(hours_until_stale)
    }
}

/// Input for storing a remote event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub owner_id: OwnerId,
    pub notification_id: NotificationId,
    pub notif_type: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: Option<EveId>,
    pub sender_type: Option<String>,
    pub text: String,
    pub is_read: bool,
}

/// Kind of an alert config, part of the dedup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertConfigKind {
    Fuel,
    JumpFuel,
}

impl AlertConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertConfigKind::Fuel => "fuel",
            AlertConfigKind::JumpFuel => "jump_fuel",
        }
    }
}

impl std::fmt::Display for AlertConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structure fuel alert config
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FuelAlertConfig {
    pub id: AlertConfigId,
    /// Start of alerts in hours before fuel expires
    pub start_hours: i32,
    /// End of alerts in hours before fuel expires
    pub end_hours: i32,
    /// Repeat every x hours, 0 = only once at start
    pub repeat_hours: i32,
    pub channel_ping_type: String,
    pub color: Option<i32>,
    pub is_enabled: bool,
}

impl FuelAlertConfig {
    /// Check the window and repeat settings
    pub fn validate(&self) -> Result<()> {
        if self.end_hours < 0 || self.repeat_hours < 0 {
            return Err(Error::Validation(
                "Hours must not be negative".to_string(),
            ));
        }
        if self.start_hours <= self.end_hours {
            return Err(Error::Validation(
                "Start must be before end, i.e. have a larger value".to_string(),
            ));
        }
        if self.repeat_hours >= self.start_hours - self.end_hours {
            return Err(Error::Validation(
                "Repeat can not be larger than the interval size".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether both configs alert on at least one common hour
    pub fn overlaps(&self, other: &FuelAlertConfig) -> bool {
        self.end_hours < other.start_hours && other.end_hours < self.start_hours
    }

    pub fn ping_type_enum(&self) -> PingType {
        self.channel_ping_type.parse().unwrap_or_default()
    }

    pub fn color_enum(&self) -> Option<Color> {
        self.color.and_then(|c| Color::from_value(c as u32))
    }
}

/// Jump gate fuel alert config
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JumpFuelAlertConfig {
    pub id: AlertConfigId,
    /// Alert once the jump fuel quantity drops to this many units
    pub threshold: i64,
    pub channel_ping_type: String,
    pub color: Option<i32>,
    pub is_enabled: bool,
}

impl JumpFuelAlertConfig {
    pub fn ping_type_enum(&self) -> PingType {
        self.channel_ping_type.parse().unwrap_or_default()
    }

    pub fn color_enum(&self) -> Option<Color> {
        self.color.and_then(|c| Color::from_value(c as u32))
    }
}

/// Dedup ledger entry: this (structure, config, bucket) has fired
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FuelAlertRecord {
    pub structure_id: StructureId,
    pub config_kind: String,
    pub config_id: AlertConfigId,
    pub bucket: i64,
    pub created_at: DateTime<Utc>,
}

/// Webhook model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub name: String,
    pub url: String,
    pub is_active: bool,
    pub notification_types: Vec<String>,
    /// Role IDs pinged on every message
    pub ping_groups: Vec<String>,
    pub has_default_pings_enabled: bool,
    pub language_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Whether this webhook is active and subscribed to the type
    pub fn accepts(&self, notif_type: NotificationType) -> bool {
        self.is_active
            && self
                .notification_types
                .iter()
                .any(|t| t == notif_type.as_str())
    }
}

/// Input for creating a webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    pub notification_types: Vec<NotificationType>,
    pub ping_groups: Vec<String>,
    pub has_default_pings_enabled: bool,
    pub language_code: Option<String>,
}

impl NewWebhook {
    /// A webhook subscribed to the default types
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            notification_types: NotificationType::webhook_defaults(),
            ping_groups: Vec::new(),
            has_default_pings_enabled: true,
            language_code: None,
        }
    }
}

/// Which of a webhook's two lists a queued message is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueList {
    Main,
    Error,
}

impl QueueList {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueList::Main => "main",
            QueueList::Error => "error",
        }
    }
}

/// A message waiting in a webhook queue
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub webhook_id: WebhookId,
    pub list: String,
    pub payload: serde_json::Value,
    /// Global ordering key, lower is older
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Sync state of one subsystem of one owner
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncState {
    pub owner_id: OwnerId,
    pub subsystem: String,
    pub last_sync: DateTime<Utc>,
    pub last_error: i32,
}

impl SyncState {
    pub fn subsystem_enum(&self) -> Option<Subsystem> {
        self.subsystem.parse().ok()
    }

    pub fn error_enum(&self) -> SyncError {
        SyncError::from_code(self.last_error)
    }
}
