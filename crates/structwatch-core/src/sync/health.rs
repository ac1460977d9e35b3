//! Per owner sync health

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use structwatch_common::config::SyncConfig;
use structwatch_common::types::{OwnerId, Subsystem, SyncError};
use structwatch_common::Result;
use structwatch_storage::{SyncState, SyncStateRepository};
use tracing::{debug, warn};

/// Records sync outcomes and answers whether an owner's data is fresh
#[derive(Clone)]
pub struct SyncHealthTracker {
    states: Arc<dyn SyncStateRepository>,
    config: SyncConfig,
}

impl SyncHealthTracker {
    pub fn new(states: Arc<dyn SyncStateRepository>, config: SyncConfig) -> Self {
        Self { states, config }
    }

    pub fn grace_period(&self, subsystem: Subsystem) -> Duration {
        let minutes = match subsystem {
            Subsystem::Structures => self.config.structures_grace_minutes,
            Subsystem::Notifications => self.config.notifications_grace_minutes,
            Subsystem::Forwarding => self.config.forwarding_grace_minutes,
        };
        Duration::minutes(minutes)
    }

    /// Record the outcome of a sync run finished at `at`
    pub async fn record(
        &self,
        owner_id: OwnerId,
        subsystem: Subsystem,
        at: DateTime<Utc>,
        error: SyncError,
    ) -> Result<()> {
        if error.is_error() {
            warn!(
                owner_id,
                subsystem = %subsystem,
                error = error.description(),
                "Sync failed"
            );
        }
        let applied = self.states.record(owner_id, subsystem, at, error).await?;
        if !applied {
            debug!(
                owner_id,
                subsystem = %subsystem,
                "Ignored sync outcome older than the stored one"
            );
        }
        Ok(())
    }

    pub async fn record_success(&self, owner_id: OwnerId, subsystem: Subsystem) -> Result<()> {
        self.record(owner_id, subsystem, Utc::now(), SyncError::None)
            .await
    }

    pub async fn record_error(
        &self,
        owner_id: OwnerId,
        subsystem: Subsystem,
        error: SyncError,
    ) -> Result<()> {
        self.record(owner_id, subsystem, Utc::now(), error).await
    }

    /// Whether the last sync of a subsystem succeeded within its grace period
    pub async fn is_fresh(
        &self,
        owner_id: OwnerId,
        subsystem: Subsystem,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let state = self.states.get(owner_id, subsystem).await?;
        Ok(state
            .map(|s| self.state_is_fresh(&s, subsystem, now))
            .unwrap_or(false))
    }

    /// Whether every tracked subsystem of the owner is fresh and error free
    pub async fn all_ok(&self, owner_id: OwnerId, now: DateTime<Utc>) -> Result<bool> {
        for subsystem in Subsystem::ALL {
            if !self.is_fresh(owner_id, subsystem, now).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn state_is_fresh(&self, state: &SyncState, subsystem: Subsystem, now: DateTime<Utc>) -> bool {
        !state.error_enum().is_error() && now - state.last_sync < self.grace_period(subsystem)
    }
}
