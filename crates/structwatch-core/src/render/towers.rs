//! Starbases

use super::format::{self, bold, UNKNOWN};
use super::{Body, RenderContext, RenderError};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use structwatch_common::types::{Color, EveId, NotificationType};

#[derive(Debug, Deserialize)]
struct Want {
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct TowerPayload {
    #[serde(rename = "moonID")]
    moon_id: Option<EveId>,
    #[serde(rename = "typeID")]
    type_id: Option<EveId>,
    #[serde(rename = "solarSystemID")]
    solar_system_id: Option<EveId>,
    #[serde(rename = "aggressorAllianceID")]
    aggressor_alliance_id: Option<EveId>,
    #[serde(rename = "aggressorCorpID")]
    aggressor_corp_id: Option<EveId>,
    #[serde(rename = "aggressorID")]
    aggressor_id: Option<EveId>,
    #[serde(rename = "shieldValue")]
    shield_value: Option<f64>,
    #[serde(rename = "armorValue")]
    armor_value: Option<f64>,
    #[serde(rename = "hullValue")]
    hull_value: Option<f64>,
    #[serde(default)]
    wants: Vec<Want>,
    reinforced_until: Option<DateTime<Utc>>,
}

/// Fuel blocks burned per hour by a starbase of the given type
pub fn fuel_blocks_per_hour(type_name: &str) -> i64 {
    if type_name.contains("Medium") {
        20
    } else if type_name.contains("Small") {
        10
    } else {
        40
    }
}

/// How long `quantity` fuel blocks last in a starbase of the given type
pub fn fuel_duration(type_name: &str, quantity: i64) -> Duration {
    let seconds = quantity.max(0) * 3600 / fuel_blocks_per_hour(type_name);
    Duration::seconds(seconds)
}

pub(super) async fn render(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: TowerPayload = ctx.payload()?;
    let structure = ctx.structure_by_moon(payload.moon_id).await?;
    let type_id = structure
        .as_ref()
        .map(|s| s.eve_type_id)
        .or(payload.type_id);
    let type_name = ctx.type_name(type_id).await?;
    let name = structure
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| type_name.clone());
    let system_id = structure
        .as_ref()
        .map(|s| s.eve_solar_system_id)
        .or(payload.solar_system_id);

    let prefix = format!(
        "The starbase {} at {} in {} belonging to {} ",
        bold(&name),
        ctx.moon_name(payload.moon_id).await?,
        ctx.solar_system_text(system_id).await?,
        ctx.owner_link()
    );

    let (title, text, color) = match ctx.notif_type {
        NotificationType::TowerAlertMsg => {
            let aggressor_id = payload
                .aggressor_alliance_id
                .or(payload.aggressor_corp_id)
                .or(payload.aggressor_id);
            (
                "Starbase under attack",
                format!(
                    "is under attack by {}.\n{}",
                    ctx.entity_link(aggressor_id).await?,
                    format::damage_text(
                        payload.shield_value,
                        payload.armor_value,
                        payload.hull_value,
                        100.0
                    )
                ),
                Color::Warning,
            )
        }
        NotificationType::TowerResourceAlertMsg => {
            let remaining = match payload.wants.first() {
                Some(want) => Some(
                    ctx.notification.timestamp + fuel_duration(&type_name, want.quantity),
                ),
                None => structure.as_ref().and_then(|s| s.fuel_expires_at),
            };
            let remaining = remaining
                .map(|at| format::time_until(at, ctx.now))
                .unwrap_or_else(|| "?".to_string());
            (
                "Starbase fuel alert",
                format!("is running out of fuel in {}.", bold(&remaining)),
                Color::Warning,
            )
        }
        NotificationType::TowerRefueledExtra => {
            let until = structure
                .as_ref()
                .and_then(|s| s.fuel_expires_at)
                .map(|at| ctx.target(at))
                .unwrap_or_else(|| "?".to_string());
            (
                "Starbase refueled",
                format!("has been refueled. Fuel will last until {}.", until),
                Color::Info,
            )
        }
        NotificationType::TowerReinforcedExtra => {
            let until = payload
                .reinforced_until
                .map(|at| ctx.target(at))
                .unwrap_or_else(|| UNKNOWN.to_string());
            (
                "Starbase reinforced",
                format!("has been reinforced and will come out at: {}.", until),
                Color::Danger,
            )
        }
        other => return Err(RenderError::UnsupportedType(other.to_string())),
    };

    Ok(Body::new(title, format!("{}{}", prefix, text), color)
        .with_thumbnail(type_id.map(format::type_icon_url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{notification, now, owner, renderer, starbase, universe};
    use pretty_assertions::assert_eq;
    use structwatch_storage::StructureRepository;

    #[test]
    fn test_fuel_duration_by_size() {
        assert_eq!(fuel_duration("Caldari Control Tower", 400), Duration::hours(10));
        assert_eq!(
            fuel_duration("Caldari Control Tower Medium", 400),
            Duration::hours(20)
        );
        assert_eq!(
            fuel_duration("Caldari Control Tower Small", 400),
            Duration::hours(40)
        );
    }

    #[tokio::test]
    async fn test_tower_attacked() {
        let (renderer, store) = renderer(universe()).await;
        StructureRepository::upsert(store.as_ref(), &starbase(1002, now() + Duration::days(2)))
            .await
            .unwrap();
        let text = "aggressorAllianceID: 3002\naggressorCorpID: 2002\naggressorID: 1002\narmorValue: 1.0\nhullValue: 1.0\nmoonID: 40161469\nshieldValue: 0.48\nsolarSystemID: 30002537\ntypeID: 16213\n";
        let embed = renderer
            .render_at(&notification("TowerAlertMsg", text), &owner(), now())
            .await
            .unwrap();

        assert_eq!(embed.title, "Starbase under attack");
        assert_eq!(
            embed.description,
            "The starbase **Wayne Tower** at Amamake IV - Moon 1 in [Amamake](https://evemaps.dotlan.net/system/Amamake) (Heimatar) belonging to [Wayne Enterprises](https://evemaps.dotlan.net/corporation/Wayne_Enterprises) is under attack by [Legion of Doom](https://evemaps.dotlan.net/alliance/Legion_of_Doom).\nShield: 48.0% | Armor: 100.0% | Hull: 100.0%"
        );
    }

    #[tokio::test]
    async fn test_resource_alert_uses_wanted_fuel() {
        let (renderer, _) = renderer(universe()).await;
        let text = "allianceID: 3001\ncorpID: 2001\nmoonID: 40161469\nsolarSystemID: 30002537\ntypeID: 16213\nwants:\n- quantity: 1000\n  typeID: 4051\n";
        let embed = renderer
            .render_at(&notification("TowerResourceAlertMsg", text), &owner(), now())
            .await
            .unwrap();

        assert!(embed
            .description
            .starts_with("The starbase **Caldari Control Tower** at Amamake IV - Moon 1"));
        assert!(embed
            .description
            .ends_with("is running out of fuel in **1 day, 1 hour**."));
    }

    #[tokio::test]
    async fn test_generated_resource_alert_uses_structure_expiry() {
        let (renderer, store) = renderer(universe()).await;
        StructureRepository::upsert(store.as_ref(), &starbase(1002, now() + Duration::hours(5)))
            .await
            .unwrap();
        let text = "moonID: 40161469\nstructureID: 1002\nsolarSystemID: 30002537\ntypeID: 16213\n";
        let embed = renderer
            .render_at(&notification("TowerResourceAlertMsg", text), &owner(), now())
            .await
            .unwrap();
        assert!(embed
            .description
            .ends_with("is running out of fuel in **5 hours**."));
    }

    #[tokio::test]
    async fn test_reinforced_until() {
        let (renderer, _) = renderer(universe()).await;
        let text = "moonID: 40161469\nsolarSystemID: 30002537\ntypeID: 16213\nreinforced_until: 2023-07-29T11:00:00Z\n";
        let embed = renderer
            .render_at(&notification("TowerReinforcedExtra", text), &owner(), now())
            .await
            .unwrap();
        assert!(embed
            .description
            .ends_with("has been reinforced and will come out at: **2023-07-29 11:00** (1 day)."));
        assert_eq!(embed.color, Color::Danger);
    }
}
