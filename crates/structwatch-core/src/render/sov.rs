//! Sovereignty

use super::format::{self, bold, UNKNOWN};
use super::{Body, RenderContext, RenderError};
use serde::Deserialize;
use structwatch_common::types::{Color, EveId, NotificationType};

pub const TCU_TYPE_ID: EveId = 32226;
pub const IHUB_TYPE_ID: EveId = 32458;

#[derive(Debug, Deserialize)]
struct SovPayload {
    #[serde(rename = "solarSystemID")]
    solar_system_id: Option<EveId>,
    #[serde(rename = "structureTypeID")]
    structure_type_id: Option<EveId>,
    #[serde(rename = "campaignEventType")]
    campaign_event_type: Option<i64>,
    #[serde(rename = "decloakTime")]
    decloak_time: Option<i64>,
    #[serde(rename = "corpID")]
    corp_id: Option<EveId>,
    #[serde(rename = "allianceID")]
    alliance_id: Option<EveId>,
    #[serde(rename = "typeID")]
    type_id: Option<EveId>,
    #[serde(rename = "moonID")]
    moon_id: Option<EveId>,
}

impl SovPayload {
    /// Structure type, from the payload or the campaign event type
    fn sov_type_id(&self) -> EveId {
        self.structure_type_id.unwrap_or(match self.campaign_event_type {
            Some(2) => IHUB_TYPE_ID,
            _ => TCU_TYPE_ID,
        })
    }
}

pub(super) async fn render(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: SovPayload = ctx.payload()?;

    if ctx.notif_type == NotificationType::AllAnchoringMsg {
        return all_anchoring(ctx, &payload).await;
    }

    let system = ctx.solar_system(payload.solar_system_id).await?;
    let system_name = system
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let system_text = system
        .as_ref()
        .map(format::solar_system_text)
        .unwrap_or_else(|| UNKNOWN.to_string());

    let type_id = payload.sov_type_id();
    let type_name = ctx.type_name(Some(type_id)).await?;
    let owner = match ctx.entity(ctx.notification.sender_id).await? {
        Some(sender) => format::alliance_link(&sender.name),
        None => UNKNOWN.to_string(),
    };

    let body = match ctx.notif_type {
        NotificationType::EntosisCaptureStarted => Body::new(
            format!("{} in {} is being captured", bold(&type_name), system_name),
            format!(
                "A capsuleer has started to influence the {} in {} belonging to {} with an Entosis Link.",
                type_name, system_text, owner
            ),
            Color::Warning,
        ),
        NotificationType::SovCommandNodeEventStarted => {
            let constellation = system
                .as_ref()
                .map(|s| s.constellation_name.as_str())
                .unwrap_or(UNKNOWN);
            Body::new(
                format!(
                    "Command nodes for {} in {} have begun to decloak",
                    bold(&type_name),
                    system_name
                ),
                format!(
                    "Command nodes for {} in {} belonging to {} can now be found throughout the {} constellation",
                    bold(&type_name),
                    system_text,
                    owner,
                    constellation
                ),
                Color::Warning,
            )
        }
        NotificationType::SovAllClaimAcquiredMsg => Body::new(
            format!("DED Sovereignty claim acknowledgment: {}", system_name),
            format!(
                "DED now officially acknowledges that your member corporation {} has claimed sovereignty on behalf of {} in {}.",
                ctx.entity_link(payload.corp_id).await?,
                ctx.entity_link(payload.alliance_id).await?,
                system_text
            ),
            Color::Success,
        ),
        NotificationType::SovAllClaimLostMsg => Body::new(
            format!("Lost sovereignty in: {}", system_name),
            format!(
                "DED acknowledges that member corporation {} has lost its claim to sovereignty on behalf of {} in {}.",
                ctx.entity_link(payload.corp_id).await?,
                ctx.entity_link(payload.alliance_id).await?,
                system_text
            ),
            Color::Success,
        ),
        NotificationType::SovStructureReinforced => Body::new(
            format!(
                "{} in {} has entered reinforced mode",
                bold(&type_name),
                system_name
            ),
            format!(
                "The {} in {} belonging to {} has been reinforced by hostile forces and command nodes will begin decloaking at {}",
                bold(&type_name),
                system_text,
                owner,
                ctx.ldap_target(payload.decloak_time)
            ),
            Color::Danger,
        ),
        NotificationType::SovStructureDestroyed => Body::new(
            format!("{} in {} has been destroyed", bold(&type_name), system_name),
            format!(
                "The command nodes for {} in {} belonging to {} have been destroyed by hostile forces.",
                bold(&type_name),
                system_text,
                owner
            ),
            Color::Danger,
        ),
        other => return Err(RenderError::UnsupportedType(other.to_string())),
    };

    Ok(body.with_thumbnail(Some(format::type_icon_url(type_id))))
}

async fn all_anchoring(
    ctx: &RenderContext<'_>,
    payload: &SovPayload,
) -> Result<Body, RenderError> {
    let eve_type = ctx.eve_type(payload.type_id).await?;
    let (type_name, group_name) = eve_type
        .map(|t| (t.name, t.group_name))
        .unwrap_or_else(|| (UNKNOWN.to_string(), UNKNOWN.to_string()));

    let mut anchored_by = ctx.entity_link(payload.corp_id).await?;
    if let Some(alliance) = ctx.entity(payload.alliance_id).await? {
        anchored_by.push_str(&format!(" ({})", alliance.name));
    }
    let near_moon = match payload.moon_id {
        Some(moon_id) => format!(" near {}", bold(&ctx.moon_name(Some(moon_id)).await?)),
        None => String::new(),
    };

    let title = format!(
        "{} anchored in {}",
        group_name,
        ctx.solar_system_name(payload.solar_system_id).await?
    );
    let description = format!(
        "A {} from {} has anchored in {}{}.",
        bold(&type_name),
        anchored_by,
        ctx.solar_system_text(payload.solar_system_id).await?,
        near_moon
    );
    Ok(Body::new(title, description, Color::Warning)
        .with_thumbnail(payload.type_id.map(format::type_icon_url)))
}
