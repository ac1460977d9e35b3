//! Repository layer for data access

pub mod alert_configs;
pub mod alerts;
pub mod fuel_alerts;
pub mod owners;
pub mod queue;
pub mod structures;
pub mod sync_states;
pub mod webhooks;

// Re-export concrete repository implementations
pub use alert_configs::DbAlertConfigRepository;
pub use alerts::DbAlertRepository;
pub use fuel_alerts::DbFuelAlertRepository;
pub use owners::DbOwnerRepository;
pub use queue::DbQueueRepository;
pub use structures::DbStructureRepository;
pub use sync_states::DbSyncStateRepository;
pub use webhooks::DbWebhookRepository;

// Re-export repository traits
pub use alert_configs::AlertConfigRepository;
pub use alerts::AlertRepository;
pub use fuel_alerts::FuelAlertRepository;
pub use owners::OwnerRepository;
pub use queue::QueueRepository;
pub use structures::StructureRepository;
pub use sync_states::SyncStateRepository;
pub use webhooks::WebhookRepository;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use std::sync::Arc;

/// All repositories behind trait objects, shared by the pipeline services
#[derive(Clone)]
pub struct Repositories {
    pub owners: Arc<dyn OwnerRepository>,
    pub structures: Arc<dyn StructureRepository>,
    pub alerts: Arc<dyn AlertRepository>,
    pub alert_configs: Arc<dyn AlertConfigRepository>,
    pub fuel_alerts: Arc<dyn FuelAlertRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub queue: Arc<dyn QueueRepository>,
    pub sync_states: Arc<dyn SyncStateRepository>,
}

impl Repositories {
    /// PostgreSQL backed repositories sharing one pool
    pub fn database(pool: DatabasePool) -> Self {
        Self {
            owners: Arc::new(DbOwnerRepository::new(pool.clone())),
            structures: Arc::new(DbStructureRepository::new(pool.clone())),
            alerts: Arc::new(DbAlertRepository::new(pool.clone())),
            alert_configs: Arc::new(DbAlertConfigRepository::new(pool.clone())),
            fuel_alerts: Arc::new(DbFuelAlertRepository::new(pool.clone())),
            webhooks: Arc::new(DbWebhookRepository::new(pool.clone())),
            queue: Arc::new(DbQueueRepository::new(pool.clone())),
            sync_states: Arc::new(DbSyncStateRepository::new(pool)),
        }
    }

    /// Repositories backed by a single in-memory store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            owners: store.clone(),
            structures: store.clone(),
            alerts: store.clone(),
            alert_configs: store.clone(),
            fuel_alerts: store.clone(),
            webhooks: store.clone(),
            queue: store.clone(),
            sync_states: store,
        }
    }
}
