//! Timers for notifications that announce a future event
//!
//! Reinforcements and moon mining extractions end at a known time. Each
//! such alert is turned into a [`TimerEvent`] once and handed to a
//! [`TimerSink`], after which the alert is flagged so it is not handed
//! over again.

use crate::render::format::{ldap_duration, ldap_time};
use crate::render::{IHUB_TYPE_ID, TCU_TYPE_ID};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use structwatch_common::config::AlertsConfig;
use structwatch_common::types::{EveId, NotificationId, NotificationType, OwnerId, StructureId};
use structwatch_common::Result;
use structwatch_storage::{Alert, Owner, Repositories};
use tracing::{debug, info, warn};

/// Types that carry a timer
pub const TIMER_TYPES: [NotificationType; 6] = [
    NotificationType::StructureLostShield,
    NotificationType::StructureLostArmor,
    NotificationType::SovStructureReinforced,
    NotificationType::OrbitalReinforced,
    NotificationType::MoonminingExtractionStarted,
    NotificationType::MoonminingExtractionCancelled,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Armor,
    Hull,
    Final,
    MoonMining,
}

impl TimerKind {
    pub fn details(&self) -> &'static str {
        match self {
            TimerKind::Armor => "Armor timer",
            TimerKind::Hull => "Hull timer",
            TimerKind::Final => "Final timer",
            TimerKind::MoonMining => "Extraction ready",
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.details())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    pub kind: TimerKind,
    pub owner_id: OwnerId,
    pub notification_id: NotificationId,
    pub solar_system_id: EveId,
    pub structure_id: Option<StructureId>,
    pub structure_type_id: Option<EveId>,
    pub structure_name: Option<String>,
    /// Planet or moon
    pub location_id: Option<EveId>,
    pub eve_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    Added(Timer),
    /// Removes the moon mining timers of an extraction
    ExtractionCancelled {
        owner_id: OwnerId,
        structure_id: Option<StructureId>,
        moon_id: Option<EveId>,
    },
}

/// Receives timers, e.g. a timerboard
#[async_trait]
pub trait TimerSink: Send + Sync {
    async fn apply(&self, event: &TimerEvent) -> Result<()>;
}

/// Writes timers to the log
pub struct LogTimerSink;

#[async_trait]
impl TimerSink for LogTimerSink {
    async fn apply(&self, event: &TimerEvent) -> Result<()> {
        match event {
            TimerEvent::Added(timer) => info!(
                owner_id = timer.owner_id,
                notification_id = timer.notification_id,
                kind = %timer.kind,
                solar_system_id = timer.solar_system_id,
                eve_time = %timer.eve_time,
                "Timer added"
            ),
            TimerEvent::ExtractionCancelled {
                owner_id,
                structure_id,
                moon_id,
            } => info!(
                owner_id,
                structure_id = ?structure_id,
                moon_id = ?moon_id,
                "Extraction timers removed"
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TimerPayload {
    #[serde(rename = "solarSystemID", alias = "solarsystemID")]
    solar_system_id: Option<EveId>,
    #[serde(rename = "structureID")]
    structure_id: Option<StructureId>,
    #[serde(rename = "structureTypeID")]
    structure_type_id: Option<EveId>,
    #[serde(rename = "structureName")]
    structure_name: Option<String>,
    #[serde(rename = "typeID")]
    type_id: Option<EveId>,
    #[serde(rename = "planetID")]
    planet_id: Option<EveId>,
    #[serde(rename = "moonID")]
    moon_id: Option<EveId>,
    #[serde(rename = "campaignEventType")]
    campaign_event_type: Option<i64>,
    #[serde(rename = "timeLeft")]
    time_left: Option<i64>,
    #[serde(rename = "decloakTime")]
    decloak_time: Option<i64>,
    #[serde(rename = "reinforceExitTime")]
    reinforce_exit_time: Option<i64>,
    #[serde(rename = "readyTime")]
    ready_time: Option<i64>,
}

fn required<T>(value: Option<T>, field: &str) -> std::result::Result<T, String> {
    value.ok_or_else(|| format!("missing field {}", field))
}

fn ldap_field(ticks: Option<i64>, field: &str) -> std::result::Result<DateTime<Utc>, String> {
    ldap_time(required(ticks, field)?).ok_or_else(|| format!("{} out of range", field))
}

/// The timer event of an alert, `None` when the alert does not produce one
/// for this owner
pub fn timer_event(
    alert: &Alert,
    owner: &Owner,
) -> std::result::Result<Option<TimerEvent>, String> {
    let notif_type: NotificationType = alert.notif_type.parse::<NotificationType>().map_err(|e| e.to_string())?;
    let payload: TimerPayload = serde_yaml::from_str(&alert.text).map_err(|e| e.to_string())?;

    let timer = |kind: TimerKind, solar_system_id: EveId, eve_time: DateTime<Utc>| Timer {
        kind,
        owner_id: alert.owner_id,
        notification_id: alert.notification_id,
        solar_system_id,
        structure_id: payload.structure_id,
        structure_type_id: payload.structure_type_id,
        structure_name: payload.structure_name.clone(),
        location_id: None,
        eve_time,
    };

    let event = match notif_type {
        NotificationType::StructureLostShield | NotificationType::StructureLostArmor => {
            let kind = if notif_type == NotificationType::StructureLostShield {
                TimerKind::Armor
            } else {
                TimerKind::Hull
            };
            let time_left = ldap_duration(required(payload.time_left, "timeLeft")?);
            let solar_system_id = required(payload.solar_system_id, "solarsystemID")?;
            TimerEvent::Added(timer(kind, solar_system_id, alert.timestamp + time_left))
        }
        NotificationType::SovStructureReinforced => {
            if !owner.is_alliance_main {
                return Ok(None);
            }
            let solar_system_id = required(payload.solar_system_id, "solarSystemID")?;
            let eve_time = ldap_field(payload.decloak_time, "decloakTime")?;
            let structure_type_id = match payload.campaign_event_type {
                Some(1) => Some(TCU_TYPE_ID),
                Some(2) => Some(IHUB_TYPE_ID),
                _ => None,
            };
            TimerEvent::Added(Timer {
                structure_type_id,
                ..timer(TimerKind::Final, solar_system_id, eve_time)
            })
        }
        NotificationType::OrbitalReinforced => {
            let solar_system_id = required(payload.solar_system_id, "solarSystemID")?;
            let eve_time = ldap_field(payload.reinforce_exit_time, "reinforceExitTime")?;
            TimerEvent::Added(Timer {
                structure_type_id: payload.type_id,
                location_id: payload.planet_id,
                ..timer(TimerKind::Final, solar_system_id, eve_time)
            })
        }
        NotificationType::MoonminingExtractionStarted => {
            let solar_system_id = required(payload.solar_system_id, "solarSystemID")?;
            let eve_time = ldap_field(payload.ready_time, "readyTime")?;
            TimerEvent::Added(Timer {
                location_id: payload.moon_id,
                ..timer(TimerKind::MoonMining, solar_system_id, eve_time)
            })
        }
        NotificationType::MoonminingExtractionCancelled => TimerEvent::ExtractionCancelled {
            owner_id: alert.owner_id,
            structure_id: payload.structure_id,
            moon_id: payload.moon_id,
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Totals of one owner's timer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerReport {
    pub added: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// Hands the timers of an owner's new alerts to the sink
pub struct TimerProcessor {
    repos: Repositories,
    sink: Arc<dyn TimerSink>,
    alerts: AlertsConfig,
}

impl TimerProcessor {
    pub fn new(repos: Repositories, sink: Arc<dyn TimerSink>, alerts: AlertsConfig) -> Self {
        Self {
            repos,
            sink,
            alerts,
        }
    }

    fn notif_types(&self) -> Vec<String> {
        TIMER_TYPES
            .iter()
            .filter(|t| {
                self.alerts.moon_extraction_timers
                    || !matches!(
                        t,
                        NotificationType::MoonminingExtractionStarted
                            | NotificationType::MoonminingExtractionCancelled
                    )
            })
            .map(|t| t.as_str().to_string())
            .collect()
    }

    /// Process an owner's non-stale alerts that still need their timer,
    /// oldest first. Alerts are flagged only after the sink accepted them.
    pub async fn process_owner(&self, owner: &Owner) -> Result<TimerReport> {
        let mut report = TimerReport::default();
        if !self.alerts.add_timers {
            return Ok(report);
        }

        let since = Utc::now() - Duration::hours(self.alerts.hours_until_stale);
        let alerts = self
            .repos
            .alerts
            .list_timer_pending(owner.corporation_id, &self.notif_types(), since)
            .await?;

        for alert in alerts {
            let event = match timer_event(&alert, owner) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(
                        notification_id = alert.notification_id,
                        notif_type = %alert.notif_type,
                        "No timer for notification"
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        notification_id = alert.notification_id,
                        notif_type = %alert.notif_type,
                        error = %e,
                        "Invalid timer payload"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            self.sink.apply(&event).await?;
            self.repos.alerts.mark_timer_added(alert.id).await?;
            match event {
                TimerEvent::Added(_) => report.added += 1,
                TimerEvent::ExtractionCancelled { .. } => report.removed += 1,
            }
        }

        if report.added + report.removed > 0 {
            info!(
                owner_id = owner.corporation_id,
                added = report.added,
                removed = report.removed,
                "Processed timers"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::owner;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use structwatch_common::Error;
    use structwatch_storage::{AlertRepository, MemoryStore, NewAlert};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<TimerEvent>>,
        fail: bool,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<TimerEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TimerSink for RecordingSink {
        async fn apply(&self, event: &TimerEvent) -> Result<()> {
            if self.fail {
                return Err(Error::Internal("timerboard unavailable".to_string()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn timestamp() -> DateTime<Utc> {
        Utc::now() - Duration::hours(1)
    }

    fn new_alert(notification_id: i64, notif_type: &str, text: &str) -> NewAlert {
        NewAlert {
            owner_id: 2001,
            notification_id,
            notif_type: notif_type.to_string(),
            timestamp: timestamp(),
            sender_id: Some(1000137),
            sender_type: Some("corporation".to_string()),
            text: text.to_string(),
            is_read: false,
        }
    }

    fn processor(
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        alerts: AlertsConfig,
    ) -> TimerProcessor {
        TimerProcessor::new(Repositories::memory(store), sink, alerts)
    }

    async fn store_with(alerts: &[NewAlert]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for alert in alerts {
            store.insert_if_absent(alert).await.unwrap();
        }
        store
    }

    async fn timer_added(store: &MemoryStore, notification_id: i64) -> bool {
        AlertRepository::get(store, 2001, notification_id)
            .await
            .unwrap()
            .unwrap()
            .is_timer_added
    }

    const LOST_SHIELD: &str = "solarsystemID: 30002537\nstructureID: 1000000000001\nstructureTypeID: 35832\ntimeLeft: 864000000000\n";

    #[tokio::test]
    async fn test_lost_shield_adds_armor_timer_once() {
        let store = store_with(&[new_alert(1, "StructureLostShields", LOST_SHIELD)]).await;
        let sink = Arc::new(RecordingSink::default());
        let processor = processor(store.clone(), sink.clone(), AlertsConfig::default());

        let report = processor.process_owner(&owner()).await.unwrap();
        assert_eq!(report.added, 1);

        let events = sink.events();
        let TimerEvent::Added(timer) = &events[0] else {
            panic!("expected an added timer, got {:?}", events[0]);
        };
        assert_eq!(timer.kind, TimerKind::Armor);
        assert_eq!(timer.solar_system_id, 30002537);
        assert_eq!(timer.structure_id, Some(1000000000001));
        assert_eq!(timer.structure_type_id, Some(35832));
        let alert = AlertRepository::get(store.as_ref(), 2001, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(timer.eve_time, alert.timestamp + Duration::days(1));
        assert!(alert.is_timer_added);

        let again = processor.process_owner(&owner()).await.unwrap();
        assert_eq!(again, TimerReport::default());
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_timer_kinds_and_times() {
        let store = store_with(&[
            new_alert(
                1,
                "StructureLostArmor",
                "solarsystemID: 30002537\nstructureID: 1000000000001\ntimeLeft: 36000000000\n",
            ),
            new_alert(
                2,
                "OrbitalReinforced",
                "planetID: 40161466\nreinforceExitTime: 133355238000000000\nsolarSystemID: 30002537\ntypeID: 2233\n",
            ),
            new_alert(
                3,
                "SovStructureReinforced",
                "campaignEventType: 2\ndecloakTime: 133356000000000000\nsolarSystemID: 30004751\n",
            ),
            new_alert(
                4,
                "MoonminingExtractionStarted",
                "moonID: 40161469\nreadyTime: 133355238000000000\nsolarSystemID: 30002537\nstructureID: 1000000000002\nstructureName: Dominion Tower\nstructureTypeID: 35835\n",
            ),
        ])
        .await;
        let sink = Arc::new(RecordingSink::default());
        let report = processor(store, sink.clone(), AlertsConfig::default())
            .process_owner(&owner())
            .await
            .unwrap();
        assert_eq!(report.added, 4);

        let timers: Vec<Timer> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TimerEvent::Added(timer) => Some(timer),
                _ => None,
            })
            .collect();
        let kinds: Vec<TimerKind> = timers.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TimerKind::Hull,
                TimerKind::Final,
                TimerKind::Final,
                TimerKind::MoonMining
            ]
        );

        let ready = Utc.with_ymd_and_hms(2023, 8, 3, 8, 10, 0).unwrap();
        assert_eq!(timers[1].eve_time, ready);
        assert_eq!(timers[1].location_id, Some(40161466));
        assert_eq!(timers[1].structure_type_id, Some(2233));
        assert_eq!(
            timers[2].eve_time,
            Utc.with_ymd_and_hms(2023, 8, 4, 5, 20, 0).unwrap()
        );
        assert_eq!(timers[2].structure_type_id, Some(IHUB_TYPE_ID));
        assert_eq!(timers[3].eve_time, ready);
        assert_eq!(timers[3].location_id, Some(40161469));
        assert_eq!(timers[3].structure_name.as_deref(), Some("Dominion Tower"));
    }

    #[tokio::test]
    async fn test_extraction_cancel_removes_timers() {
        let store = store_with(&[new_alert(
            1,
            "MoonminingExtractionCancelled",
            "cancelledBy: 1001\nmoonID: 40161469\nsolarSystemID: 30002537\nstructureID: 1000000000002\nstructureName: Dominion Tower\nstructureTypeID: 35835\n",
        )])
        .await;
        let sink = Arc::new(RecordingSink::default());
        let report = processor(store.clone(), sink.clone(), AlertsConfig::default())
            .process_owner(&owner())
            .await
            .unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(
            sink.events(),
            vec![TimerEvent::ExtractionCancelled {
                owner_id: 2001,
                structure_id: Some(1000000000002),
                moon_id: Some(40161469),
            }]
        );
        assert!(timer_added(&store, 1).await);
    }

    #[tokio::test]
    async fn test_sov_timer_needs_alliance_main() {
        let store = store_with(&[new_alert(
            1,
            "SovStructureReinforced",
            "campaignEventType: 1\ndecloakTime: 133356000000000000\nsolarSystemID: 30004751\n",
        )])
        .await;
        let sink = Arc::new(RecordingSink::default());
        let processor = processor(store.clone(), sink.clone(), AlertsConfig::default());
        let mut secondary = owner();
        secondary.is_alliance_main = false;

        let report = processor.process_owner(&secondary).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(sink.events().is_empty());
        assert!(!timer_added(&store, 1).await);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_skipped_and_left_pending() {
        let store = store_with(&[
            new_alert(1, "StructureLostArmor", "solarsystemID: 30002537\n"),
            new_alert(2, "StructureLostShields", LOST_SHIELD),
        ])
        .await;
        let sink = Arc::new(RecordingSink::default());
        let report = processor(store.clone(), sink.clone(), AlertsConfig::default())
            .process_owner(&owner())
            .await
            .unwrap();

        assert_eq!(report.added, 1);
        assert_eq!(report.skipped, 1);
        assert!(!timer_added(&store, 1).await);
        assert!(timer_added(&store, 2).await);
    }

    #[tokio::test]
    async fn test_sink_failure_leaves_alert_pending() {
        let store = store_with(&[new_alert(1, "StructureLostShields", LOST_SHIELD)]).await;
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let result = processor(store.clone(), sink, AlertsConfig::default())
            .process_owner(&owner())
            .await;

        assert!(result.is_err());
        assert!(!timer_added(&store, 1).await);
    }

    #[tokio::test]
    async fn test_disabled_timers_and_moon_switch() {
        let moon = new_alert(
            1,
            "MoonminingExtractionStarted",
            "moonID: 40161469\nreadyTime: 133355238000000000\nsolarSystemID: 30002537\n",
        );
        let store = store_with(&[moon, new_alert(2, "StructureLostShields", LOST_SHIELD)]).await;
        let sink = Arc::new(RecordingSink::default());

        let off = AlertsConfig {
            add_timers: false,
            ..AlertsConfig::default()
        };
        let report = processor(store.clone(), sink.clone(), off)
            .process_owner(&owner())
            .await
            .unwrap();
        assert_eq!(report, TimerReport::default());

        let no_moons = AlertsConfig {
            moon_extraction_timers: false,
            ..AlertsConfig::default()
        };
        let report = processor(store.clone(), sink.clone(), no_moons)
            .process_owner(&owner())
            .await
            .unwrap();
        assert_eq!(report.added, 1);
        assert!(!timer_added(&store, 1).await);
        assert!(timer_added(&store, 2).await);
    }

    #[tokio::test]
    async fn test_stale_alerts_get_no_timer() {
        let mut stale = new_alert(1, "StructureLostShields", LOST_SHIELD);
        stale.timestamp = Utc::now() - Duration::hours(25);
        let store = store_with(&[stale]).await;
        let sink = Arc::new(RecordingSink::default());

        let report = processor(store, sink.clone(), AlertsConfig::default())
            .process_owner(&owner())
            .await
            .unwrap();
        assert_eq!(report, TimerReport::default());
        assert!(sink.events().is_empty());
    }
}
