//! Customs offices

use super::format::{self, bold};
use super::{Body, RenderContext, RenderError};
use serde::Deserialize;
use structwatch_common::types::{Color, EveId, NotificationType};

const CUSTOMS_OFFICE_TYPE_ID: EveId = 2233;

#[derive(Debug, Deserialize)]
struct OrbitalPayload {
    #[serde(rename = "planetID")]
    planet_id: Option<EveId>,
    #[serde(rename = "solarSystemID")]
    solar_system_id: Option<EveId>,
    #[serde(rename = "aggressorAllianceID")]
    aggressor_alliance_id: Option<EveId>,
    #[serde(rename = "aggressorCorpID")]
    aggressor_corp_id: Option<EveId>,
    #[serde(rename = "aggressorID")]
    aggressor_id: Option<EveId>,
    #[serde(rename = "reinforceExitTime")]
    reinforce_exit_time: Option<i64>,
}

pub(super) async fn render(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: OrbitalPayload = ctx.payload()?;

    let aggressor_id = payload
        .aggressor_alliance_id
        .or(payload.aggressor_corp_id)
        .or(payload.aggressor_id);
    let aggressor = match ctx.entity(aggressor_id).await? {
        Some(entity) => format::entity_link(&entity),
        None => "(Unknown aggressor)".to_string(),
    };

    let subject = format!(
        "The {} at {} in {} belonging to {}",
        ctx.type_name(Some(CUSTOMS_OFFICE_TYPE_ID)).await?,
        ctx.planet_name(payload.planet_id).await?,
        ctx.solar_system_text(payload.solar_system_id).await?,
        ctx.owner_link()
    );

    let body = match ctx.notif_type {
        NotificationType::OrbitalAttacked => Body::new(
            "Orbital under attack",
            format!("{} is under attack by {}.", subject, aggressor),
            Color::Warning,
        ),
        NotificationType::OrbitalReinforced => {
            let exit = payload
                .reinforce_exit_time
                .and_then(format::ldap_time)
                .map(|at| bold(&at.format("%Y-%m-%d %H:%M").to_string()))
                .unwrap_or_else(|| format::UNKNOWN.to_string());
            Body::new(
                "Orbital reinforced",
                format!(
                    "{} has been reinforced by {} and will come out at: {}.",
                    subject, aggressor, exit
                ),
                Color::Danger,
            )
        }
        other => return Err(RenderError::UnsupportedType(other.to_string())),
    };

    Ok(body.with_thumbnail(Some(format::type_icon_url(CUSTOMS_OFFICE_TYPE_ID))))
}

#[cfg(test)]
mod tests {
    use crate::testing::{notification, now, owner, renderer, universe};
    use pretty_assertions::assert_eq;
    use structwatch_common::types::Color;

    #[tokio::test]
    async fn test_orbital_attacked_by_alliance() {
        let (renderer, _) = renderer(universe()).await;
        let text = "aggressorAllianceID: 3002\naggressorCorpID: 2002\naggressorID: 1002\nplanetID: 40161466\nplanetTypeID: 2016\nshieldLevel: 0.99\nsolarSystemID: 30002537\ntypeID: 2233\n";
        let embed = renderer
            .render_at(&notification("OrbitalAttacked", text), &owner(), now())
            .await
            .unwrap();

        assert_eq!(embed.title, "Orbital under attack");
        assert_eq!(
            embed.description,
            "The Customs Office at Amamake IV in [Amamake](https://evemaps.dotlan.net/system/Amamake) (Heimatar) belonging to [Wayne Enterprises](https://evemaps.dotlan.net/corporation/Wayne_Enterprises) is under attack by [Legion of Doom](https://evemaps.dotlan.net/alliance/Legion_of_Doom)."
        );
        assert_eq!(embed.color, Color::Warning);
    }

    #[tokio::test]
    async fn test_orbital_reinforced_without_aggressor() {
        let (renderer, _) = renderer(universe()).await;
        let text = "planetID: 40161466\nreinforceExitTime: 132000000000000000\nsolarSystemID: 30002537\ntypeID: 2233\n";
        let embed = renderer
            .render_at(&notification("OrbitalReinforced", text), &owner(), now())
            .await
            .unwrap();

        assert!(embed.description.ends_with(
            "has been reinforced by (Unknown aggressor) and will come out at: **2019-04-17 18:40**."
        ));
        assert_eq!(embed.color, Color::Danger);
    }
}
