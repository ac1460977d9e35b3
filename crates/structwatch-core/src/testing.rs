//! Fixtures shared by the unit tests

use crate::alerts::{AlertScheduler, Notification};
use crate::esi::FetchError;
use crate::forwarding::Forwarder;
use crate::metrics::PipelineMetrics;
use crate::render::{
    EntityCategory, EntityResolver, EveEntity, EveType, NotificationRenderer, SolarSystem,
};
use crate::sync::SyncHealthTracker;
use crate::webhook::WebhookQueue;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use prometheus::Registry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use structwatch_common::config::{AlertsConfig, DeliveryConfig, SyncConfig};
use structwatch_common::types::{Color, EveId, NotificationType, StructureKind};
use structwatch_storage::{
    FuelAlertConfig, JumpFuelAlertConfig, MemoryStore, NewWebhook, Owner, OwnerRepository,
    QueueRepository, Repositories, Structure, Webhook, WebhookRepository,
};

/// Fixed clock used by rendering tests
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 7, 28, 11, 0, 0).unwrap()
}

pub fn notification(notif_type: &str, text: &str) -> Notification {
    Notification {
        alert_id: Some(1),
        notification_id: 1_000_000_001,
        owner_id: 2001,
        notif_type: notif_type.to_string(),
        timestamp: now(),
        sender_id: None,
        text: text.to_string(),
        color_override: None,
        ping_type_override: None,
    }
}

pub fn notification_from(notif_type: &str, text: &str, sender_id: EveId) -> Notification {
    Notification {
        sender_id: Some(sender_id),
        ..notification(notif_type, text)
    }
}

pub fn owner() -> Owner {
    Owner {
        corporation_id: 2001,
        corporation_name: "Wayne Enterprises".to_string(),
        alliance_id: Some(3001),
        alliance_name: Some("Wayne Foundation".to_string()),
        character_id: Some(1001),
        refresh_token: Some("refresh-token".to_string()),
        is_active: true,
        is_alliance_main: true,
        has_default_pings_enabled: true,
        ping_groups: Vec::new(),
        created_at: now(),
        updated_at: now(),
    }
}

fn structure(id: i64, kind: StructureKind, name: &str, type_id: EveId) -> Structure {
    Structure {
        id,
        owner_id: 2001,
        kind: kind.as_str().to_string(),
        name: name.to_string(),
        eve_type_id: type_id,
        eve_solar_system_id: 30002537,
        eve_moon_id: None,
        eve_planet_id: None,
        fuel_expires_at: None,
        jump_fuel_quantity: None,
        services: Vec::new(),
        updated_at: now(),
    }
}

/// Astrahus "Batcave" in Amamake
pub fn upwell(id: i64, fuel_expires_at: DateTime<Utc>) -> Structure {
    Structure {
        fuel_expires_at: Some(fuel_expires_at),
        ..structure(id, StructureKind::Upwell, "Batcave", 35832)
    }
}

/// Control tower anchored at Amamake IV - Moon 1
pub fn starbase(id: i64, fuel_expires_at: DateTime<Utc>) -> Structure {
    Structure {
        eve_moon_id: Some(40161469),
        fuel_expires_at: Some(fuel_expires_at),
        ..structure(id, StructureKind::Starbase, "Wayne Tower", 16213)
    }
}

pub fn jump_gate(id: i64, jump_fuel_quantity: Option<i64>) -> Structure {
    Structure {
        jump_fuel_quantity,
        ..structure(id, StructureKind::JumpGate, "Amamake » Phoenix Sun", 35841)
    }
}

pub fn fuel_config(id: i64, start: i32, end: i32, repeat: i32) -> FuelAlertConfig {
    FuelAlertConfig {
        id,
        start_hours: start,
        end_hours: end,
        repeat_hours: repeat,
        channel_ping_type: "here".to_string(),
        color: Some(Color::Warning.value() as i32),
        is_enabled: true,
    }
}

pub fn jump_config(id: i64, threshold: i64) -> JumpFuelAlertConfig {
    JumpFuelAlertConfig {
        id,
        threshold,
        channel_ping_type: "here".to_string(),
        color: Some(Color::Warning.value() as i32),
        is_enabled: true,
    }
}

/// Number of lookups a [`MapResolver`] has answered
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Resolver answering from in-memory maps
#[derive(Clone, Default)]
pub struct MapResolver {
    entities: HashMap<EveId, EveEntity>,
    systems: HashMap<EveId, SolarSystem>,
    types: HashMap<EveId, EveType>,
    moons: HashMap<EveId, String>,
    planets: HashMap<EveId, String>,
    failing: bool,
    calls: Calls,
}

impl MapResolver {
    pub fn with_entity(mut self, id: EveId, name: &str, category: EntityCategory) -> Self {
        self.entities.insert(
            id,
            EveEntity {
                id,
                name: name.to_string(),
                category,
            },
        );
        self
    }

    pub fn with_system(mut self, id: EveId, name: &str, constellation: &str, region: &str) -> Self {
        self.systems.insert(
            id,
            SolarSystem {
                id,
                name: name.to_string(),
                constellation_name: constellation.to_string(),
                region_name: region.to_string(),
            },
        );
        self
    }

    pub fn with_type(mut self, id: EveId, name: &str, group: &str) -> Self {
        self.types.insert(
            id,
            EveType {
                id,
                name: name.to_string(),
                group_name: group.to_string(),
            },
        );
        self
    }

    pub fn with_moon(mut self, id: EveId, name: &str) -> Self {
        self.moons.insert(id, name.to_string());
        self
    }

    pub fn with_planet(mut self, id: EveId, name: &str) -> Self {
        self.planets.insert(id, name.to_string());
        self
    }

    /// Every lookup fails as if the remote API was down
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }

    fn lookup<T: Clone>(&self, map: &HashMap<EveId, T>, id: EveId) -> Result<Option<T>, FetchError> {
        self.calls.hit();
        if self.failing {
            return Err(FetchError::Transient("remote API unavailable".to_string()));
        }
        Ok(map.get(&id).cloned())
    }
}

#[async_trait]
impl EntityResolver for MapResolver {
    async fn entity(&self, id: EveId) -> Result<Option<EveEntity>, FetchError> {
        self.lookup(&self.entities, id)
    }

    async fn solar_system(&self, id: EveId) -> Result<Option<SolarSystem>, FetchError> {
        self.lookup(&self.systems, id)
    }

    async fn type_info(&self, id: EveId) -> Result<Option<EveType>, FetchError> {
        self.lookup(&self.types, id)
    }

    async fn moon(&self, id: EveId) -> Result<Option<String>, FetchError> {
        self.lookup(&self.moons, id)
    }

    async fn planet(&self, id: EveId) -> Result<Option<String>, FetchError> {
        self.lookup(&self.planets, id)
    }
}

/// The few corners of New Eden the tests talk about
pub fn universe() -> MapResolver {
    MapResolver::default()
        .with_entity(1001, "Bruce Wayne", EntityCategory::Character)
        .with_entity(1002, "Lex Luthor", EntityCategory::Character)
        .with_entity(2001, "Wayne Enterprises", EntityCategory::Corporation)
        .with_entity(2002, "Lexcorp", EntityCategory::Corporation)
        .with_entity(3001, "Wayne Foundation", EntityCategory::Alliance)
        .with_entity(3002, "Legion of Doom", EntityCategory::Alliance)
        .with_system(30002537, "Amamake", "Hed", "Heimatar")
        .with_system(30004751, "Phoenix Sun", "Y-4CFK", "Feythabolis")
        .with_type(35832, "Astrahus", "Citadel")
        .with_type(35835, "Athanor", "Refinery")
        .with_type(16213, "Caldari Control Tower", "Control Tower")
        .with_type(2233, "Customs Office", "Orbital Infrastructure")
        .with_type(35841, "Ansiblex Jump Gate", "Jump Bridge")
        .with_type(32226, "Territorial Claim Unit", "Sovereignty Structures")
        .with_type(32458, "Infrastructure Hub", "Infrastructure Hubs")
        .with_type(35892, "Standup Market Hub I", "Structure Citadel Service Module")
        .with_type(35894, "Standup Cloning Center I", "Structure Citadel Service Module")
        .with_type(45506, "Cobaltite", "Ubiquitous Moon Asteroids")
        .with_type(46676, "Euxenite", "Ubiquitous Moon Asteroids")
        .with_moon(40161469, "Amamake IV - Moon 1")
        .with_planet(40161466, "Amamake IV")
}

/// Renderer over a fresh in-memory store
pub async fn renderer(resolver: MapResolver) -> (NotificationRenderer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let renderer = NotificationRenderer::new(Arc::new(resolver), store.clone(), "StructWatch");
    (renderer, store)
}

/// Forwarder and scheduler wired to one in-memory store with owner 2001
pub struct Pipeline {
    pub store: Arc<MemoryStore>,
    pub metrics: PipelineMetrics,
    pub health: SyncHealthTracker,
    pub queue: WebhookQueue,
    pub forwarder: Arc<Forwarder>,
    pub scheduler: AlertScheduler,
}

impl Pipeline {
    pub async fn new() -> Self {
        Self::build(universe(), AlertsConfig::default()).await
    }

    pub async fn build(resolver: MapResolver, alerts: AlertsConfig) -> Self {
        Self::assemble(resolver, alerts, Arc::new(MemoryStore::new()), None).await
    }

    /// Pipeline whose messages go through `queue` instead of `store`
    pub async fn with_queue(store: Arc<MemoryStore>, queue: Arc<dyn QueueRepository>) -> Self {
        Self::assemble(universe(), AlertsConfig::default(), store, Some(queue)).await
    }

    async fn assemble(
        resolver: MapResolver,
        alerts: AlertsConfig,
        store: Arc<MemoryStore>,
        queue: Option<Arc<dyn QueueRepository>>,
    ) -> Self {
        let mut repos = Repositories::memory(store.clone());
        if let Some(queue) = queue {
            repos.queue = queue;
        }
        let metrics = PipelineMetrics::new(&Registry::new()).unwrap();
        let health = SyncHealthTracker::new(repos.sync_states.clone(), SyncConfig::default());
        let queue = WebhookQueue::new(repos.queue.clone());
        let renderer = NotificationRenderer::new(
            Arc::new(resolver),
            repos.structures.clone(),
            alerts.app_title.clone(),
        );
        let forwarder = Arc::new(Forwarder::new(
            repos.clone(),
            renderer,
            queue.clone(),
            health.clone(),
            alerts,
            DeliveryConfig::default(),
            metrics.clone(),
        ));
        let scheduler = AlertScheduler::new(repos, forwarder.clone(), metrics.clone());

        OwnerRepository::upsert(store.as_ref(), &owner()).await.unwrap();

        Self {
            store,
            metrics,
            health,
            queue,
            forwarder,
            scheduler,
        }
    }

    /// Active webhook of owner 2001 subscribed to one type
    pub async fn owner_webhook(&self, notif_type: NotificationType) -> Webhook {
        let mut input = NewWebhook::new("Alerts", "http://localhost/hook");
        input.notification_types = vec![notif_type];
        let webhook = self.store.create(input).await.unwrap();
        self.store.link_owner(2001, webhook.id).await.unwrap();
        webhook
    }
}
