//! Fuel alert scheduler

use super::generated;
use crate::forwarding::{Forwarder, SendOutcome};
use crate::metrics::PipelineMetrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use structwatch_common::Result;
use structwatch_storage::{
    AlertConfigKind, FuelAlertConfig, JumpFuelAlertConfig, Repositories, Structure,
};
use tracing::{debug, info, warn};

/// Whether a fuel alert config fires at `hours_remaining`
pub fn fuel_alert_fires(config: &FuelAlertConfig, hours_remaining: i64) -> bool {
    let start = i64::from(config.start_hours);
    let end = i64::from(config.end_hours);
    let repeat = i64::from(config.repeat_hours);

    if hours_remaining < end || hours_remaining > start {
        return false;
    }
    if repeat == 0 {
        hours_remaining == start
    } else {
        (hours_remaining - end) % repeat == 0
    }
}

/// Outcome of one (structure, config) check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelAlertOutcome {
    /// Not inside the window or not on a repeat hour
    NotDue,
    /// Already fired for this bucket
    Suppressed,
    Sent,
}

/// Totals of one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerRun {
    pub sent: usize,
    pub suppressed: usize,
}

impl SchedulerRun {
    fn add(&mut self, outcome: FuelAlertOutcome) {
        match outcome {
            FuelAlertOutcome::Sent => self.sent += 1,
            FuelAlertOutcome::Suppressed => self.suppressed += 1,
            FuelAlertOutcome::NotDue => {}
        }
    }
}

/// Generates deduplicated fuel alerts from structure timers and thresholds
pub struct AlertScheduler {
    repos: Repositories,
    forwarder: Arc<Forwarder>,
    metrics: PipelineMetrics,
}

impl AlertScheduler {
    pub fn new(repos: Repositories, forwarder: Arc<Forwarder>, metrics: PipelineMetrics) -> Self {
        Self {
            repos,
            forwarder,
            metrics,
        }
    }

    /// Check every enabled fuel config against every burning structure.
    /// With `force` alerts are sent again even if their bucket already fired.
    pub async fn run_fuel_alerts(&self, force: bool) -> Result<SchedulerRun> {
        let now = Utc::now();
        let configs = self.repos.alert_configs.list_fuel_configs().await?;
        let structures = self.repos.structures.list_with_fuel_expiry().await?;
        let mut run = SchedulerRun::default();

        for config in configs.iter().filter(|c| c.is_enabled) {
            for structure in &structures {
                let outcome = self.check_fuel(structure, config, now, force).await?;
                run.add(outcome);
            }
        }

        info!(
            sent = run.sent,
            suppressed = run.suppressed,
            "Fuel alert run finished"
        );
        Ok(run)
    }

    /// Check every enabled jump fuel config against every jump gate
    pub async fn run_jump_fuel_alerts(&self, force: bool) -> Result<SchedulerRun> {
        let now = Utc::now();
        let configs = self.repos.alert_configs.list_jump_fuel_configs().await?;
        let gates = self.repos.structures.list_jump_gates().await?;
        let mut run = SchedulerRun::default();

        for config in configs.iter().filter(|c| c.is_enabled) {
            for gate in &gates {
                let outcome = self.check_jump_fuel(gate, config, now, force).await?;
                run.add(outcome);
            }
        }

        info!(
            sent = run.sent,
            suppressed = run.suppressed,
            "Jump fuel alert run finished"
        );
        Ok(run)
    }

    pub async fn check_fuel(
        &self,
        structure: &Structure,
        config: &FuelAlertConfig,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<FuelAlertOutcome> {
        if !structure.is_burning_fuel(now) {
            return Ok(FuelAlertOutcome::NotDue);
        }
        let Some(hours) = structure.hours_fuel_expires(now) else {
            return Ok(FuelAlertOutcome::NotDue);
        };
        if !fuel_alert_fires(config, hours) {
            return Ok(FuelAlertOutcome::NotDue);
        }

        if !self
            .claim(structure, AlertConfigKind::Fuel, config.id, hours, force)
            .await?
        {
            return Ok(FuelAlertOutcome::Suppressed);
        }

        debug!(
            structure_id = structure.id,
            config_id = config.id,
            hours,
            "Sending fuel alert"
        );
        let notification = generated::fuel_alert(structure, config, now)?;
        self.send(structure, notification).await
    }

    pub async fn check_jump_fuel(
        &self,
        structure: &Structure,
        config: &JumpFuelAlertConfig,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<FuelAlertOutcome> {
        let Some(quantity) = structure.jump_fuel_quantity else {
            return Ok(FuelAlertOutcome::NotDue);
        };
        if quantity > config.threshold {
            return Ok(FuelAlertOutcome::NotDue);
        }

        if !self
            .claim(
                structure,
                AlertConfigKind::JumpFuel,
                config.id,
                config.threshold,
                force,
            )
            .await?
        {
            return Ok(FuelAlertOutcome::Suppressed);
        }

        debug!(
            structure_id = structure.id,
            config_id = config.id,
            quantity,
            threshold = config.threshold,
            "Sending jump fuel alert"
        );
        let notification = generated::jump_fuel_alert(structure, config, now)?;
        self.send(structure, notification).await
    }

    /// Write the ledger record before anything is sent.
    /// Returns false when the bucket already fired and `force` is not set.
    async fn claim(
        &self,
        structure: &Structure,
        kind: AlertConfigKind,
        config_id: i64,
        bucket: i64,
        force: bool,
    ) -> Result<bool> {
        let created = self
            .repos
            .fuel_alerts
            .try_record(structure.id, kind, config_id, bucket)
            .await?;
        if !created && !force {
            self.metrics.suppressed_duplicates.inc();
            debug!(
                structure_id = structure.id,
                kind = %kind,
                config_id,
                bucket,
                "Alert already fired for this bucket"
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn send(
        &self,
        structure: &Structure,
        notification: super::Notification,
    ) -> Result<FuelAlertOutcome> {
        let Some(owner) = self.repos.owners.get(structure.owner_id).await? else {
            warn!(
                structure_id = structure.id,
                owner_id = structure.owner_id,
                "Structure has no known owner, alert not sent"
            );
            return Ok(FuelAlertOutcome::NotDue);
        };
        match self.forwarder.send_notification(&notification, &owner).await? {
            SendOutcome::Queued { .. } => {}
            other => debug!(
                structure_id = structure.id,
                outcome = ?other,
                "Generated alert was not queued"
            ),
        }
        Ok(FuelAlertOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fuel_config, jump_config, jump_gate, upwell, Pipeline};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use structwatch_common::types::NotificationType;
    use structwatch_storage::{
        AlertConfigRepository, FuelAlertRepository, QueueList, StructureRepository,
    };

    fn window(start: i32, end: i32, repeat: i32) -> FuelAlertConfig {
        fuel_config(1, start, end, repeat)
    }

    #[test]
    fn test_fires_on_repeat_hours_inside_window() {
        let config = window(48, 0, 12);
        let firing: Vec<i64> = (-2..=50).filter(|h| fuel_alert_fires(&config, *h)).collect();
        assert_eq!(firing, vec![0, 12, 24, 36, 48]);
    }

    #[test]
    fn test_repeat_zero_fires_only_at_start() {
        let config = window(48, 0, 0);
        assert!(fuel_alert_fires(&config, 48));
        assert!(!fuel_alert_fires(&config, 47));
        assert!(!fuel_alert_fires(&config, 0));
        assert!(!fuel_alert_fires(&config, 49));

        let narrow = window(36, 24, 0);
        assert!(fuel_alert_fires(&narrow, 36));
        assert!(!fuel_alert_fires(&narrow, 24));
    }

    #[test]
    fn test_repeat_is_counted_from_end() {
        let config = window(50, 5, 10);
        let firing: Vec<i64> = (0..=60).filter(|h| fuel_alert_fires(&config, *h)).collect();
        assert_eq!(firing, vec![5, 15, 25, 35, 45]);
    }

    #[tokio::test]
    async fn test_fuel_alert_fires_once_per_bucket() {
        let pipeline = Pipeline::new().await;
        let now = Utc::now();
        let structure = upwell(1001, now + Duration::hours(36) + Duration::minutes(30));
        StructureRepository::upsert(pipeline.store.as_ref(), &structure)
            .await
            .unwrap();
        pipeline
            .store
            .create_fuel_config(&window(48, 0, 12))
            .await
            .unwrap();
        let webhook = pipeline.owner_webhook(NotificationType::StructureFuelAlert).await;

        let first = pipeline.scheduler.run_fuel_alerts(false).await.unwrap();
        assert_eq!(first, SchedulerRun { sent: 1, suppressed: 0 });

        let second = pipeline.scheduler.run_fuel_alerts(false).await.unwrap();
        assert_eq!(second, SchedulerRun { sent: 0, suppressed: 1 });

        let records = FuelAlertRepository::list_for_structure(pipeline.store.as_ref(), 1001)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bucket, 36);

        let queued = pipeline.store.queue_snapshot(webhook.id, QueueList::Main).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(pipeline.metrics.suppressed_duplicates.get(), 1);
    }

    #[tokio::test]
    async fn test_force_resends_fired_bucket() {
        let pipeline = Pipeline::new().await;
        let now = Utc::now();
        let structure = upwell(1001, now + Duration::hours(36) + Duration::minutes(30));
        StructureRepository::upsert(pipeline.store.as_ref(), &structure)
            .await
            .unwrap();
        pipeline
            .store
            .create_fuel_config(&window(48, 0, 12))
            .await
            .unwrap();
        let webhook = pipeline.owner_webhook(NotificationType::StructureFuelAlert).await;

        pipeline.scheduler.run_fuel_alerts(false).await.unwrap();
        let forced = pipeline.scheduler.run_fuel_alerts(true).await.unwrap();
        assert_eq!(forced.sent, 1);

        let queued = pipeline.store.queue_snapshot(webhook.id, QueueList::Main).unwrap();
        assert_eq!(queued.len(), 2);
    }

    #[tokio::test]
    async fn test_hours_between_repeats_do_not_fire() {
        let pipeline = Pipeline::new().await;
        let now = Utc::now();
        let structure = upwell(1001, now + Duration::hours(30) + Duration::minutes(30));
        let outcome = pipeline
            .scheduler
            .check_fuel(&structure, &window(48, 0, 12), now, false)
            .await
            .unwrap();
        assert_eq!(outcome, FuelAlertOutcome::NotDue);
    }

    #[tokio::test]
    async fn test_disabled_config_produces_nothing() {
        let pipeline = Pipeline::new().await;
        let now = Utc::now();
        let structure = upwell(1001, now + Duration::hours(36) + Duration::minutes(30));
        StructureRepository::upsert(pipeline.store.as_ref(), &structure)
            .await
            .unwrap();
        let mut disabled = window(48, 0, 12);
        disabled.is_enabled = false;
        pipeline.store.create_fuel_config(&disabled).await.unwrap();

        let run = pipeline.scheduler.run_fuel_alerts(false).await.unwrap();
        assert_eq!(run, SchedulerRun::default());
    }

    #[tokio::test]
    async fn test_jump_fuel_alert_fires_once_below_threshold() {
        let pipeline = Pipeline::new().await;
        StructureRepository::upsert(pipeline.store.as_ref(), &jump_gate(1003, Some(950)))
            .await
            .unwrap();
        pipeline
            .store
            .create_jump_fuel_config(&jump_config(1, 1000))
            .await
            .unwrap();
        let webhook = pipeline
            .owner_webhook(NotificationType::StructureJumpFuelAlert)
            .await;

        let first = pipeline.scheduler.run_jump_fuel_alerts(false).await.unwrap();
        assert_eq!(first.sent, 1);

        StructureRepository::upsert(pipeline.store.as_ref(), &jump_gate(1003, Some(900)))
            .await
            .unwrap();
        let second = pipeline.scheduler.run_jump_fuel_alerts(false).await.unwrap();
        assert_eq!(second, SchedulerRun { sent: 0, suppressed: 1 });

        let queued = pipeline.store.queue_snapshot(webhook.id, QueueList::Main).unwrap();
        assert_eq!(queued.len(), 1);
    }

    #[tokio::test]
    async fn test_jump_fuel_above_threshold_or_unknown_is_not_due() {
        let pipeline = Pipeline::new().await;
        let now = Utc::now();
        let config = jump_config(1, 1000);

        let above = pipeline
            .scheduler
            .check_jump_fuel(&jump_gate(1003, Some(1001)), &config, now, false)
            .await
            .unwrap();
        assert_eq!(above, FuelAlertOutcome::NotDue);

        let unknown = pipeline
            .scheduler
            .check_jump_fuel(&jump_gate(1003, None), &config, now, false)
            .await
            .unwrap();
        assert_eq!(unknown, FuelAlertOutcome::NotDue);

        let at = pipeline
            .scheduler
            .check_jump_fuel(&jump_gate(1003, Some(1000)), &config, now, false)
            .await
            .unwrap();
        assert_eq!(at, FuelAlertOutcome::Sent);
    }
}
