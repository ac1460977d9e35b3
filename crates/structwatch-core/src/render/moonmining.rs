//! Moon mining extractions

use super::format::{self, bold, UNKNOWN};
use super::{Body, RenderContext, RenderError};
use serde::Deserialize;
use std::collections::BTreeMap;
use structwatch_common::types::{Color, EveId, NotificationType};

#[derive(Debug, Deserialize)]
struct MoonminingPayload {
    #[serde(rename = "moonID")]
    moon_id: Option<EveId>,
    #[serde(rename = "solarSystemID")]
    solar_system_id: Option<EveId>,
    #[serde(rename = "structureName")]
    structure_name: Option<String>,
    #[serde(rename = "structureTypeID")]
    structure_type_id: Option<EveId>,
    #[serde(rename = "oreVolumeByType", default)]
    ore_volume_by_type: BTreeMap<EveId, f64>,
    #[serde(rename = "readyTime")]
    ready_time: Option<i64>,
    #[serde(rename = "autoTime")]
    auto_time: Option<i64>,
    #[serde(rename = "startedBy")]
    started_by: Option<EveId>,
    #[serde(rename = "cancelledBy")]
    cancelled_by: Option<EveId>,
    #[serde(rename = "firedBy")]
    fired_by: Option<EveId>,
}

async fn ore_composition(
    ctx: &RenderContext<'_>,
    volumes: &BTreeMap<EveId, f64>,
) -> Result<String, RenderError> {
    let mut ores = Vec::with_capacity(volumes.len());
    for (type_id, volume) in volumes {
        ores.push((ctx.type_name(Some(*type_id)).await?, *volume));
    }
    ores.sort_by(|a, b| a.0.cmp(&b.0));

    let mut text = String::from("Estimated ore composition: ");
    for (name, volume) in ores {
        text.push_str(&format!("\n- {}: {} m³", name, format::thousands_f64(volume, 0)));
    }
    Ok(text)
}

pub(super) async fn render(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: MoonminingPayload = ctx.payload()?;

    let name = bold(payload.structure_name.as_deref().unwrap_or(UNKNOWN));
    let location = format!(
        "{} at {} in {} belonging to {}",
        name,
        ctx.moon_name(payload.moon_id).await?,
        ctx.solar_system_text(payload.solar_system_id).await?,
        ctx.owner_link()
    );

    let body = match ctx.notif_type {
        NotificationType::MoonminingExtractionStarted => Body::new(
            "Moon mining extraction started",
            format!(
                "A moon mining extraction has been started for {}. Extraction was started by {}.\nThe chunk will be ready on location at {}, and will fracture automatically on {}.\n\n{}",
                location,
                ctx.entity_link(payload.started_by).await?,
                ctx.ldap_target(payload.ready_time),
                ctx.ldap_target(payload.auto_time),
                ore_composition(ctx, &payload.ore_volume_by_type).await?
            ),
            Color::Info,
        ),
        NotificationType::MoonminingExtractionFinished => Body::new(
            "Extraction finished",
            format!(
                "The extraction for {} is finished and the chunk is ready to be shot at.\nThe chunk will automatically fracture on {}.\n\n{}",
                location,
                ctx.ldap_target(payload.auto_time),
                ore_composition(ctx, &payload.ore_volume_by_type).await?
            ),
            Color::Info,
        ),
        NotificationType::MoonminingAutomaticFracture => Body::new(
            "Automatic Fracture",
            format!(
                "The moon drill fitted to {} has automatically been fired and the moon products are ready to be harvested.\n\n{}",
                location,
                ore_composition(ctx, &payload.ore_volume_by_type).await?
            ),
            Color::Success,
        ),
        NotificationType::MoonminingExtractionCancelled => Body::new(
            "Extraction cancelled",
            format!(
                "An ongoing extraction for {} has been cancelled by {}.",
                location,
                ctx.entity_link(payload.cancelled_by).await?
            ),
            Color::Warning,
        ),
        NotificationType::MoonminingLaserFired => Body::new(
            "Moon drill fired",
            format!(
                "The moon drill fitted to {} has been fired by {} and the moon products are ready to be harvested.\n\n{}",
                location,
                ctx.entity_link(payload.fired_by).await?,
                ore_composition(ctx, &payload.ore_volume_by_type).await?
            ),
            Color::Success,
        ),
        other => return Err(RenderError::UnsupportedType(other.to_string())),
    };

    Ok(body.with_thumbnail(payload.structure_type_id.map(format::type_icon_url)))
}
