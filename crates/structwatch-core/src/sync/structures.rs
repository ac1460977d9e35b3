//! Fetching an owner's structures

use super::{AdminNotifier, OwnerTokens, SyncHealthTracker, SyncJobError, SyncReport};
use crate::alerts::generated;
use crate::esi::{EsiClient, TokenSource, DEFAULT_LANGUAGE};
use crate::forwarding::Forwarder;
use crate::render::{fuel_duration, EntityResolver};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use structwatch_common::config::AlertsConfig;
use structwatch_common::types::{EveId, StructureId, StructureKind, Subsystem, SyncError};
use structwatch_common::Result;
use structwatch_storage::{AlertConfigKind, Owner, Repositories, Structure};
use tracing::{debug, info, warn};

const JUMP_GATE_TYPE_ID: EveId = 35841;
const CUSTOMS_OFFICE_TYPE_ID: EveId = 2233;
const LIQUID_OZONE_TYPE_ID: EveId = 16273;
const FUEL_BLOCK_TYPE_IDS: [EveId; 4] = [4051, 4246, 4247, 4312];

/// Fuel expiry changes up to this size are treated as noise
fn fuel_change_threshold(structure: &Structure) -> Duration {
    if structure.is_starbase() {
        // starbase expiry is estimated in whole hours from cached fuel bay data
        Duration::hours(2)
    } else {
        Duration::minutes(30)
    }
}

#[derive(Debug, Deserialize)]
struct RemoteService {
    name: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct RemoteStructure {
    structure_id: StructureId,
    type_id: EveId,
    system_id: EveId,
    fuel_expires: Option<DateTime<Utc>>,
    #[serde(default)]
    services: Vec<RemoteService>,
}

#[derive(Debug, Deserialize)]
struct StructureInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RemoteStarbase {
    starbase_id: StructureId,
    type_id: EveId,
    system_id: EveId,
    moon_id: Option<EveId>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StarbaseFuel {
    type_id: EveId,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct StarbaseDetail {
    #[serde(default)]
    fuels: Vec<StarbaseFuel>,
}

#[derive(Debug, Deserialize)]
struct AssetName {
    item_id: EveId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RemoteCustomsOffice {
    office_id: StructureId,
    system_id: EveId,
}

#[derive(Debug, Deserialize)]
struct Asset {
    location_id: EveId,
    location_flag: String,
    type_id: EveId,
    quantity: i64,
}

/// Drop the solar system prefix the remote API puts in front of names
fn structure_name(remote_name: &str) -> &str {
    match remote_name.split_once(" - ") {
        Some((prefix, name)) if !prefix.contains(char::is_whitespace) && !name.is_empty() => name,
        _ => remote_name,
    }
}

/// Stores an owner's Upwell structures, starbases and customs offices
pub struct StructureSync {
    client: Arc<EsiClient>,
    tokens: Arc<dyn OwnerTokens>,
    resolver: Arc<dyn EntityResolver>,
    repos: Repositories,
    health: SyncHealthTracker,
    forwarder: Arc<Forwarder>,
    admin: Arc<dyn AdminNotifier>,
    alerts: AlertsConfig,
    languages: Vec<String>,
}

impl StructureSync {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<EsiClient>,
        tokens: Arc<dyn OwnerTokens>,
        resolver: Arc<dyn EntityResolver>,
        repos: Repositories,
        health: SyncHealthTracker,
        forwarder: Arc<Forwarder>,
        admin: Arc<dyn AdminNotifier>,
        alerts: AlertsConfig,
        languages: Vec<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            resolver,
            repos,
            health,
            forwarder,
            admin,
            alerts,
            languages,
        }
    }

    /// Fetch and store structures, recording the outcome
    pub async fn run(&self, owner: &Owner) -> std::result::Result<SyncReport, SyncJobError> {
        let result = self.fetch_and_store(owner).await;
        self.tokens.after_sync(owner).await?;

        match &result {
            Ok(report) => {
                self.health
                    .record_success(owner.corporation_id, Subsystem::Structures)
                    .await?;
                self.admin.notify(
                    true,
                    &format!(
                        "{}: {} structures synced, {} new, {} removed",
                        owner.corporation_name, report.received, report.created, report.removed
                    ),
                );
            }
            Err(e) => {
                self.health
                    .record_error(owner.corporation_id, Subsystem::Structures, e.sync_error())
                    .await?;
                self.admin.notify(
                    false,
                    &format!("{}: failed to sync structures: {}", owner.corporation_name, e),
                );
            }
        }
        result
    }

    async fn fetch_and_store(&self, owner: &Owner) -> std::result::Result<SyncReport, SyncJobError> {
        if owner.character_id.is_none() {
            return Err(SyncJobError::Token(SyncError::NoCharacter));
        }
        let token = self
            .tokens
            .token_for(owner)
            .await
            .map_err(SyncJobError::Token)?;
        let token = token.as_ref();
        let now = Utc::now();

        let mut structures = self.fetch_upwell(owner, token, now).await?;
        structures.extend(self.fetch_starbases(owner, token, now).await?);
        structures.extend(self.fetch_customs_offices(owner, token, now).await?);

        if structures.is_empty() {
            info!(owner_id = owner.corporation_id, "Owner has no structures");
        } else {
            info!(
                owner_id = owner.corporation_id,
                count = structures.len(),
                "Storing structures"
            );
        }

        let mut report = SyncReport {
            received: structures.len(),
            ..SyncReport::default()
        };
        for structure in &structures {
            match self.repos.structures.upsert(structure).await? {
                Some(previous) => self.apply_changes(owner, &previous, structure, now).await?,
                None => report.created += 1,
            }
        }

        let keep: Vec<StructureId> = structures.iter().map(|s| s.id).collect();
        report.removed = self
            .repos
            .structures
            .delete_missing(owner.corporation_id, &keep)
            .await?;
        if report.removed > 0 {
            info!(
                owner_id = owner.corporation_id,
                removed = report.removed,
                "Removed structures which no longer exist"
            );
        }
        Ok(report)
    }

    /// Re-arm alerts after the fuel level changed
    async fn apply_changes(
        &self,
        owner: &Owner,
        previous: &Structure,
        current: &Structure,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let (Some(before), Some(after)) = (previous.fuel_expires_at, current.fuel_expires_at) {
            if (after - before).abs() > fuel_change_threshold(current) {
                let cleared = self
                    .repos
                    .fuel_alerts
                    .clear_for_structure(current.id, AlertConfigKind::Fuel)
                    .await?;
                info!(
                    structure_id = current.id,
                    fuel_expires_at = %after,
                    cleared,
                    "Fuel level changed, fuel alerts re-armed"
                );
                if after > before && self.alerts.refueled_notifications {
                    let notification = generated::refueled(current, now)?;
                    let outcome = self.forwarder.send_notification(&notification, owner).await?;
                    debug!(structure_id = current.id, ?outcome, "Refueled alert");
                }
            }
        }

        if let Some(quantity) = current.jump_fuel_quantity {
            if previous.jump_fuel_quantity.map_or(true, |q| quantity > q) {
                let cleared = self
                    .repos
                    .fuel_alerts
                    .clear_jump_below(current.id, quantity)
                    .await?;
                if cleared > 0 {
                    info!(
                        structure_id = current.id,
                        quantity, cleared, "Jump fuel topped up"
                    );
                }
            }
        }
        Ok(())
    }

    async fn fetch_upwell(
        &self,
        owner: &Owner,
        token: &dyn TokenSource,
        now: DateTime<Utc>,
    ) -> std::result::Result<Vec<Structure>, SyncJobError> {
        let corporation_id = owner.corporation_id;
        let mut by_language: BTreeMap<String, Vec<RemoteStructure>> = self
            .client
            .fetch_localized(
                &format!("/corporations/{}/structures/", corporation_id),
                &[],
                &self.languages,
                true,
                Some(token),
            )
            .await?;
        let remote = match by_language.remove(DEFAULT_LANGUAGE) {
            Some(list) => list,
            None => by_language.into_values().next().unwrap_or_default(),
        };
        if remote.is_empty() {
            return Ok(Vec::new());
        }

        let jump_fuel = if remote.iter().any(|s| s.type_id == JUMP_GATE_TYPE_ID) {
            self.jump_fuel_quantities(corporation_id, token).await?
        } else {
            HashMap::new()
        };

        let mut structures = Vec::with_capacity(remote.len());
        for item in remote {
            let name = match self
                .client
                .fetch::<StructureInfo>(
                    &format!("/universe/structures/{}/", item.structure_id),
                    &[],
                    Some(token),
                )
                .await
            {
                Ok(info) => structure_name(&info.name).to_string(),
                Err(e) => {
                    warn!(
                        structure_id = item.structure_id,
                        error = %e,
                        "Failed to load structure details"
                    );
                    "(no data)".to_string()
                }
            };

            let is_jump_gate = item.type_id == JUMP_GATE_TYPE_ID;
            let kind = if is_jump_gate {
                StructureKind::JumpGate
            } else {
                StructureKind::Upwell
            };
            let mut services: Vec<String> = item
                .services
                .into_iter()
                .filter(|s| s.state == "online")
                .map(|s| s.name)
                .collect();
            services.sort();

            structures.push(Structure {
                id: item.structure_id,
                owner_id: corporation_id,
                kind: kind.as_str().to_string(),
                name,
                eve_type_id: item.type_id,
                eve_solar_system_id: item.system_id,
                eve_moon_id: None,
                eve_planet_id: None,
                fuel_expires_at: item.fuel_expires,
                jump_fuel_quantity: is_jump_gate
                    .then(|| jump_fuel.get(&item.structure_id).copied().unwrap_or(0)),
                services,
                updated_at: now,
            });
        }
        Ok(structures)
    }

    /// Liquid ozone in the fuel bay of each jump gate
    async fn jump_fuel_quantities(
        &self,
        corporation_id: i64,
        token: &dyn TokenSource,
    ) -> std::result::Result<HashMap<StructureId, i64>, SyncJobError> {
        let assets: Vec<Asset> = self
            .client
            .fetch_paged(
                &format!("/corporations/{}/assets/", corporation_id),
                &[],
                Some(token),
            )
            .await?;
        let mut quantities = HashMap::new();
        for asset in assets
            .into_iter()
            .filter(|a| a.type_id == LIQUID_OZONE_TYPE_ID && a.location_flag == "StructureFuel")
        {
            *quantities.entry(asset.location_id).or_insert(0) += asset.quantity;
        }
        Ok(quantities)
    }

    async fn fetch_starbases(
        &self,
        owner: &Owner,
        token: &dyn TokenSource,
        now: DateTime<Utc>,
    ) -> std::result::Result<Vec<Structure>, SyncJobError> {
        let corporation_id = owner.corporation_id;
        let starbases: Vec<RemoteStarbase> = self
            .client
            .fetch_paged(
                &format!("/corporations/{}/starbases/", corporation_id),
                &[],
                Some(token),
            )
            .await?;
        if starbases.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<StructureId> = starbases.iter().map(|s| s.starbase_id).collect();
        let names: HashMap<EveId, String> = match self
            .client
            .post::<_, Vec<AssetName>>(
                &format!("/corporations/{}/assets/names/", corporation_id),
                &ids,
                Some(token),
            )
            .await
        {
            Ok(names) => names.into_iter().map(|n| (n.item_id, n.name)).collect(),
            Err(e) => {
                warn!(owner_id = corporation_id, error = %e, "Failed to load starbase names");
                HashMap::new()
            }
        };

        let mut structures = Vec::with_capacity(starbases.len());
        for starbase in starbases {
            let fuel_expires_at = if starbase.state.as_deref() == Some("offline") {
                None
            } else {
                self.starbase_fuel_expires(corporation_id, &starbase, token, now)
                    .await?
            };
            structures.push(Structure {
                id: starbase.starbase_id,
                owner_id: corporation_id,
                kind: StructureKind::Starbase.as_str().to_string(),
                name: names
                    .get(&starbase.starbase_id)
                    .cloned()
                    .unwrap_or_else(|| "Starbase".to_string()),
                eve_type_id: starbase.type_id,
                eve_solar_system_id: starbase.system_id,
                eve_moon_id: starbase.moon_id,
                eve_planet_id: None,
                fuel_expires_at,
                jump_fuel_quantity: None,
                services: Vec::new(),
                updated_at: now,
            });
        }
        Ok(structures)
    }

    /// Estimate from the fuel blocks left and the tower's burn rate
    async fn starbase_fuel_expires(
        &self,
        corporation_id: i64,
        starbase: &RemoteStarbase,
        token: &dyn TokenSource,
        now: DateTime<Utc>,
    ) -> std::result::Result<Option<DateTime<Utc>>, SyncJobError> {
        let detail: StarbaseDetail = self
            .client
            .fetch(
                &format!(
                    "/corporations/{}/starbases/{}/",
                    corporation_id, starbase.starbase_id
                ),
                &[("system_id", starbase.system_id.to_string())],
                Some(token),
            )
            .await?;
        let blocks: i64 = detail
            .fuels
            .iter()
            .filter(|f| FUEL_BLOCK_TYPE_IDS.contains(&f.type_id))
            .map(|f| f.quantity)
            .sum();
        if blocks == 0 {
            return Ok(None);
        }

        let type_name = self
            .resolver
            .type_info(starbase.type_id)
            .await?
            .map(|t| t.name)
            .unwrap_or_default();
        let duration = fuel_duration(&type_name, blocks);
        let whole_hours = Duration::hours(duration.num_hours());
        Ok(Some(now + whole_hours))
    }

    async fn fetch_customs_offices(
        &self,
        owner: &Owner,
        token: &dyn TokenSource,
        now: DateTime<Utc>,
    ) -> std::result::Result<Vec<Structure>, SyncJobError> {
        let offices: Vec<RemoteCustomsOffice> = self
            .client
            .fetch_paged(
                &format!("/corporations/{}/customs_offices/", owner.corporation_id),
                &[],
                Some(token),
            )
            .await?;
        Ok(offices
            .into_iter()
            .map(|office| Structure {
                id: office.office_id,
                owner_id: owner.corporation_id,
                kind: StructureKind::CustomsOffice.as_str().to_string(),
                name: "Customs Office".to_string(),
                eve_type_id: CUSTOMS_OFFICE_TYPE_ID,
                eve_solar_system_id: office.system_id,
                eve_moon_id: None,
                eve_planet_id: None,
                fuel_expires_at: None,
                jump_fuel_quantity: None,
                services: Vec::new(),
                updated_at: now,
            })
            .collect())
    }
}
