//! Upwell structures

use super::format::{self, bold, UNKNOWN};
use super::{Body, RenderContext, RenderError};
use serde::Deserialize;
use structwatch_common::types::{Color, EveId, NotificationType};

#[derive(Debug, Default, Deserialize)]
struct StructurePayload {
    #[serde(rename = "structureID")]
    structure_id: Option<EveId>,
    #[serde(rename = "solarsystemID")]
    solarsystem_id: Option<EveId>,
    #[serde(rename = "structureTypeID")]
    structure_type_id: Option<EveId>,
    threshold: Option<i64>,
    #[serde(rename = "timeLeft")]
    time_left: Option<i64>,
    #[serde(rename = "listOfServiceModuleIDs", default)]
    service_module_ids: Vec<EveId>,
    #[serde(rename = "allianceName")]
    alliance_name: Option<String>,
    #[serde(rename = "corpName")]
    corp_name: Option<String>,
    #[serde(rename = "shieldPercentage")]
    shield_percentage: Option<f64>,
    #[serde(rename = "armorPercentage")]
    armor_percentage: Option<f64>,
    #[serde(rename = "hullPercentage")]
    hull_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwnershipPayload {
    #[serde(rename = "structureName")]
    structure_name: Option<String>,
    #[serde(rename = "structureTypeID")]
    structure_type_id: Option<EveId>,
    #[serde(rename = "solarSystemID")]
    solar_system_id: Option<EveId>,
    #[serde(rename = "oldOwnerCorpID")]
    old_owner_corp_id: Option<EveId>,
    #[serde(rename = "newOwnerCorpID")]
    new_owner_corp_id: Option<EveId>,
    #[serde(rename = "charID")]
    char_id: Option<EveId>,
}

#[derive(Debug, Deserialize)]
struct AnchoringPayload {
    #[serde(rename = "ownerCorpName")]
    owner_corp_name: Option<String>,
    #[serde(rename = "solarsystemID")]
    solarsystem_id: Option<EveId>,
    #[serde(rename = "structureTypeID")]
    structure_type_id: Option<EveId>,
}

/// `[structure ID, name, type ID]`
#[derive(Debug, Deserialize)]
struct StructureInfo(EveId, String, EveId);

#[derive(Debug, Deserialize)]
struct ReinforceChangedPayload {
    #[serde(rename = "allStructureInfo", default)]
    all_structure_info: Vec<StructureInfo>,
    hour: Option<i64>,
    timestamp: Option<i64>,
}

pub(super) async fn render(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    match ctx.notif_type {
        NotificationType::OwnershipTransferred => return ownership_transferred(ctx).await,
        NotificationType::StructureAnchoring => return anchoring(ctx).await,
        NotificationType::StructureReinforceChanged => return reinforce_changed(ctx).await,
        _ => {}
    }

    let payload: StructurePayload = ctx.payload()?;
    let structure = ctx.structure(payload.structure_id).await?;
    let type_id = structure
        .as_ref()
        .map(|s| s.eve_type_id)
        .or(payload.structure_type_id);

    let prefix = match &structure {
        Some(structure) => {
            let moon = match structure.eve_moon_id {
                Some(moon_id) => format!("at {} ", ctx.moon_name(Some(moon_id)).await?),
                None => String::new(),
            };
            format!(
                "The {} {} {}in {} belonging to {} ",
                ctx.type_name(Some(structure.eve_type_id)).await?,
                bold(&structure.name),
                moon,
                ctx.solar_system_text(Some(structure.eve_solar_system_id))
                    .await?,
                ctx.owner_link()
            )
        }
        None => format!(
            "The {} {} in {} belonging to {} ",
            ctx.type_name(payload.structure_type_id).await?,
            bold(UNKNOWN),
            ctx.solar_system_text(payload.solarsystem_id).await?,
            UNKNOWN
        ),
    };

    let (title, text, color) = match ctx.notif_type {
        NotificationType::StructureOnline => {
            ("Structure online", "is now online.".to_string(), Color::Success)
        }
        NotificationType::StructureFuelAlert => {
            let remaining = structure
                .as_ref()
                .and_then(|s| s.fuel_expires_at)
                .map(|at| format::time_until(at, ctx.now))
                .unwrap_or_else(|| "?".to_string());
            (
                "Structure fuel alert",
                format!("is running out of fuel in {}.", bold(&remaining)),
                Color::Warning,
            )
        }
        NotificationType::StructureJumpFuelAlert => {
            let threshold = ctx.require(payload.threshold, "threshold")?;
            let quantity = structure
                .as_ref()
                .and_then(|s| s.jump_fuel_quantity)
                .map(format::thousands)
                .unwrap_or_else(|| "?".to_string());
            (
                "Jump gate low on Liquid Ozone",
                format!(
                    "is below {} units on Liquid Ozone.\nRemaining units: {}.",
                    bold(&format::thousands(threshold)),
                    bold(&quantity)
                ),
                Color::Warning,
            )
        }
        NotificationType::StructureRefueledExtra => {
            let until = structure
                .as_ref()
                .and_then(|s| s.fuel_expires_at)
                .map(|at| ctx.target(at))
                .unwrap_or_else(|| "?".to_string());
            (
                "Structure refueled",
                format!("has been refueled. Fuel will last until {}.", until),
                Color::Info,
            )
        }
        NotificationType::StructureServicesOffline => {
            let mut services = Vec::with_capacity(payload.service_module_ids.len());
            for id in &payload.service_module_ids {
                services.push(ctx.type_name(Some(*id)).await?);
            }
            services.sort();
            (
                "Structure services off-line",
                format!("has all services off-lined.\n*{}*", services.join("\n")),
                Color::Danger,
            )
        }
        NotificationType::StructureWentLowPower => (
            "Structure low power",
            "went to low power mode.".to_string(),
            Color::Warning,
        ),
        NotificationType::StructureWentHighPower => (
            "Structure full power",
            "went to full power mode.".to_string(),
            Color::Success,
        ),
        NotificationType::StructureUnanchoring => (
            "Structure un-anchoring",
            format!(
                "has started un-anchoring. It will be fully un-anchored at: {}",
                ctx.ldap_target_after(payload.time_left)
            ),
            Color::Info,
        ),
        NotificationType::StructureUnderAttack => {
            let attacker = match (&payload.alliance_name, &payload.corp_name) {
                (Some(alliance), _) => format::alliance_link(alliance),
                (None, Some(corp)) => format::corporation_link(corp),
                (None, None) => UNKNOWN.to_string(),
            };
            (
                "Structure under attack",
                format!(
                    "is under attack by {}.\n{}",
                    attacker,
                    format::damage_text(
                        payload.shield_percentage,
                        payload.armor_percentage,
                        payload.hull_percentage,
                        1.0
                    )
                ),
                Color::Danger,
            )
        }
        NotificationType::StructureLostShield => (
            "Structure lost shield",
            format!(
                "has lost its shields. Armor timer end at: {}",
                ctx.ldap_target_after(payload.time_left)
            ),
            Color::Danger,
        ),
        NotificationType::StructureLostArmor => (
            "Structure lost armor",
            format!(
                "has lost its armor. Hull timer end at: {}",
                ctx.ldap_target_after(payload.time_left)
            ),
            Color::Danger,
        ),
        NotificationType::StructureDestroyed => (
            "Structure destroyed",
            "has been destroyed.".to_string(),
            Color::Danger,
        ),
        other => return Err(RenderError::UnsupportedType(other.to_string())),
    };

    Ok(Body::new(title, format!("{}{}", prefix, text), color)
        .with_thumbnail(type_id.map(format::type_icon_url)))
}

async fn ownership_transferred(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: OwnershipPayload = ctx.payload()?;
    let description = format!(
        "The {} {} in {} has been transferred from {} to {} by {}.",
        ctx.type_name(payload.structure_type_id).await?,
        bold(payload.structure_name.as_deref().unwrap_or(UNKNOWN)),
        ctx.solar_system_text(payload.solar_system_id).await?,
        ctx.entity_link(payload.old_owner_corp_id).await?,
        ctx.entity_link(payload.new_owner_corp_id).await?,
        ctx.entity_name(payload.char_id).await?,
    );
    Ok(
        Body::new("Ownership transferred", description, Color::Info)
            .with_thumbnail(payload.structure_type_id.map(format::type_icon_url)),
    )
}

async fn anchoring(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: AnchoringPayload = ctx.payload()?;
    let owner = payload
        .owner_corp_name
        .as_deref()
        .map(format::corporation_link)
        .unwrap_or_else(|| UNKNOWN.to_string());
    let description = format!(
        "A {} belonging to {} has started anchoring in {}. ",
        ctx.type_name(payload.structure_type_id).await?,
        owner,
        ctx.solar_system_text(payload.solarsystem_id).await?,
    );
    Ok(Body::new("Structure anchoring", description, Color::Info)
        .with_thumbnail(payload.structure_type_id.map(format::type_icon_url)))
}

async fn reinforce_changed(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: ReinforceChangedPayload = ctx.payload()?;
    let hour = ctx.require(payload.hour, "hour")?;

    let mut lines = Vec::with_capacity(payload.all_structure_info.len());
    for StructureInfo(id, name, type_id) in &payload.all_structure_info {
        let line = match ctx.structure(Some(*id)).await? {
            Some(structure) => format!(
                "- {} {} in {} belonging to {}",
                ctx.type_name(Some(structure.eve_type_id)).await?,
                bold(&structure.name),
                ctx.solar_system_text(Some(structure.eve_solar_system_id))
                    .await?,
                ctx.owner_link()
            ),
            None => format!(
                "- {} {} belonging to {}",
                ctx.type_name(Some(*type_id)).await?,
                bold(name),
                ctx.owner_link()
            ),
        };
        lines.push(line);
    }

    let effective = payload
        .timestamp
        .and_then(format::ldap_time)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let description = format!(
        "Reinforcement hour has been changed to {} for the following structures:\n{}\n\nChange becomes effective at {}.",
        bold(&hour.to_string()),
        lines.join("\n"),
        effective
    );
    Ok(Body::new(
        "Structure reinforcement time changed",
        description,
        Color::Info,
    ))
}

#[cfg(test)]
mod tests {
    use crate::testing::{notification, now, owner, renderer, universe, upwell};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use structwatch_common::types::Color;
    use structwatch_storage::StructureRepository;

    const AMAMAKE: &str = "[Amamake](https://evemaps.dotlan.net/system/Amamake) (Heimatar)";
    const WAYNE: &str = "[Wayne Enterprises](https://evemaps.dotlan.net/corporation/Wayne_Enterprises)";

    fn payload(extra: &str) -> String {
        format!(
            "solarsystemID: 30002537\nstructureID: 1001\nstructureTypeID: 35832\n{}",
            extra
        )
    }

    #[tokio::test]
    async fn test_structure_online() {
        let (renderer, store) = renderer(universe()).await;
        StructureRepository::upsert(store.as_ref(), &upwell(1001, now() + Duration::days(3)))
            .await
            .unwrap();

        let embed = renderer
            .render_at(&notification("StructureOnline", &payload("")), &owner(), now())
            .await
            .unwrap();

        assert_eq!(embed.title, "Structure online");
        assert_eq!(
            embed.description,
            format!(
                "The Astrahus **Batcave** in {} belonging to {} is now online.",
                AMAMAKE, WAYNE
            )
        );
        assert_eq!(embed.color, Color::Success);
        assert_eq!(
            embed.thumbnail_url.as_deref(),
            Some("https://images.evetech.net/types/35832/icon?size=64")
        );
    }

    #[tokio::test]
    async fn test_unknown_structure_uses_payload() {
        let (renderer, _) = renderer(universe()).await;
        let embed = renderer
            .render_at(&notification("StructureDestroyed", &payload("")), &owner(), now())
            .await
            .unwrap();
        assert_eq!(
            embed.description,
            format!(
                "The Astrahus **(unknown)** in {} belonging to (unknown) has been destroyed.",
                AMAMAKE
            )
        );
    }

    #[tokio::test]
    async fn test_fuel_alert_shows_time_left() {
        let (renderer, store) = renderer(universe()).await;
        let expires = now() + Duration::days(1) + Duration::hours(1);
        StructureRepository::upsert(store.as_ref(), &upwell(1001, expires))
            .await
            .unwrap();

        let embed = renderer
            .render_at(&notification("StructureFuelAlert", &payload("")), &owner(), now())
            .await
            .unwrap();
        assert!(embed
            .description
            .ends_with("is running out of fuel in **1 day, 1 hour**."));
        assert_eq!(embed.color, Color::Warning);
    }

    #[tokio::test]
    async fn test_jump_fuel_alert_shows_threshold_and_quantity() {
        let (renderer, store) = renderer(universe()).await;
        let mut gate = upwell(1001, now() + Duration::days(10));
        gate.jump_fuel_quantity = Some(950);
        StructureRepository::upsert(store.as_ref(), &gate).await.unwrap();

        let embed = renderer
            .render_at(
                &notification("StructureJumpFuelAlert", &payload("threshold: 1000\n")),
                &owner(),
                now(),
            )
            .await
            .unwrap();
        assert_eq!(embed.title, "Jump gate low on Liquid Ozone");
        assert!(embed
            .description
            .ends_with("is below **1,000** units on Liquid Ozone.\nRemaining units: **950**."));
    }

    #[tokio::test]
    async fn test_under_attack_shows_attacker_and_damage() {
        let (renderer, _) = renderer(universe()).await;
        let text = payload(
            "allianceName: Legion of Doom\ncorpName: Lexcorp\nshieldPercentage: 12.5\narmorPercentage: 100.0\nhullPercentage: 100.0\n",
        );
        let embed = renderer
            .render_at(&notification("StructureUnderAttack", &text), &owner(), now())
            .await
            .unwrap();
        assert!(embed.description.ends_with(
            "is under attack by [Legion of Doom](https://evemaps.dotlan.net/alliance/Legion_of_Doom).\nShield: 12.5% | Armor: 100.0% | Hull: 100.0%"
        ));
    }

    #[tokio::test]
    async fn test_lost_shield_timer() {
        let (renderer, _) = renderer(universe()).await;
        // one day in 100ns ticks
        let text = payload("timeLeft: 864000000000\n");
        let embed = renderer
            .render_at(&notification("StructureLostShields", &text), &owner(), now())
            .await
            .unwrap();
        assert!(embed
            .description
            .ends_with("Armor timer end at: **2023-07-29 11:00** (1 day)"));
    }

    #[tokio::test]
    async fn test_services_offline_lists_sorted_services() {
        let (renderer, _) = renderer(universe()).await;
        let text = payload("listOfServiceModuleIDs:\n- 35894\n- 35892\n");
        let embed = renderer
            .render_at(
                &notification("StructureServicesOffline", &text),
                &owner(),
                now(),
            )
            .await
            .unwrap();
        assert!(embed.description.ends_with(
            "has all services off-lined.\n*Standup Cloning Center I\nStandup Market Hub I*"
        ));
    }

    #[tokio::test]
    async fn test_ownership_transferred() {
        let (renderer, _) = renderer(universe()).await;
        let text = "charID: 1001\nnewOwnerCorpID: 2001\noldOwnerCorpID: 2002\nsolarSystemID: 30002537\nstructureID: 1001\nstructureName: Batcave\nstructureTypeID: 35832\n";
        let embed = renderer
            .render_at(&notification("OwnershipTransferred", text), &owner(), now())
            .await
            .unwrap();
        assert_eq!(
            embed.description,
            format!(
                "The Astrahus **Batcave** in {} has been transferred from [Lexcorp](https://evemaps.dotlan.net/corporation/Lexcorp) to {} by Bruce Wayne.",
                AMAMAKE, WAYNE
            )
        );
    }

    #[tokio::test]
    async fn test_reinforcement_changed_lists_structures() {
        let (renderer, store) = renderer(universe()).await;
        StructureRepository::upsert(store.as_ref(), &upwell(1001, now() + Duration::days(3)))
            .await
            .unwrap();
        let text = "allStructureInfo:\n- - 1001\n  - Batcave\n  - 35832\nhour: 19\nnumStructures: 1\ntimestamp: 132000000000000000\n";
        let embed = renderer
            .render_at(
                &notification("StructuresReinforcementChanged", text),
                &owner(),
                now(),
            )
            .await
            .unwrap();
        assert_eq!(
            embed.description,
            format!(
                "Reinforcement hour has been changed to **19** for the following structures:\n- Astrahus **Batcave** in {} belonging to {}\n\nChange becomes effective at 2019-04-17 18:40.",
                AMAMAKE, WAYNE
            )
        );
    }
}
