//! Wars

use super::format::{self, bold, UNKNOWN};
use super::{Body, RenderContext, RenderError};
use serde::Deserialize;
use structwatch_common::types::{Color, EveId, NotificationType};

#[derive(Debug, Deserialize)]
struct WarPayload {
    #[serde(rename = "declaredByID")]
    declared_by_id: Option<EveId>,
    #[serde(rename = "againstID")]
    against_id: Option<EveId>,
    #[serde(rename = "allianceID")]
    alliance_id: Option<EveId>,
    #[serde(rename = "opponentID")]
    opponent_id: Option<EveId>,
    #[serde(rename = "quitterID")]
    quitter_id: Option<EveId>,
    #[serde(rename = "warHQ")]
    war_hq: Option<String>,
    #[serde(rename = "delayHours")]
    delay_hours: Option<i64>,
    #[serde(rename = "endDate")]
    end_date: Option<i64>,
    #[serde(rename = "ownerID1")]
    owner_id_1: Option<EveId>,
    #[serde(rename = "ownerID2")]
    owner_id_2: Option<EveId>,
    #[serde(rename = "iskValue")]
    isk_value: Option<f64>,
    #[serde(rename = "allyID")]
    ally_id: Option<EveId>,
    #[serde(rename = "defenderID")]
    defender_id: Option<EveId>,
    #[serde(rename = "aggressorID")]
    aggressor_id: Option<EveId>,
    #[serde(rename = "startTime")]
    start_time: Option<i64>,
}

pub(super) async fn render(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: WarPayload = ctx.payload()?;

    match ctx.notif_type {
        NotificationType::CorpBecameWarEligible => {
            return Ok(Body::new(
                "Corporation or alliance is now eligible for formal war declarations",
                "Your corporation or alliance is **now eligible** to participate in formal war declarations. This could be because your corporation and/or one of the corporations in your alliance owns a structure deployed in space.",
                Color::Warning,
            ))
        }
        NotificationType::CorpNoLongerWarEligible => {
            return Ok(Body::new(
                "Corporation or alliance is no longer eligible for formal war declarations",
                "Your corporation or alliance is **no longer eligible** to participate in formal war declarations.\nNeither your corporation nor any of the corporations in your alliance own a structure deployed in space at this time. If your corporation or alliance is currently involved in a formal war, that war will end in 24 hours.",
                Color::Info,
            ))
        }
        NotificationType::WarSurrenderOfferMsg => return surrender_offer(ctx, &payload).await,
        NotificationType::AllyJoinedWarAggressorMsg
        | NotificationType::AllyJoinedWarAllyMsg
        | NotificationType::AllyJoinedWarDefenderMsg => return ally_joined(ctx, &payload).await,
        _ => {}
    }

    let declared_by = ctx
        .entity(Some(ctx.require(payload.declared_by_id, "declaredByID")?))
        .await?;
    let against = ctx.entity(payload.against_id).await?;
    let declared_by_link = link_or_unknown(declared_by.as_ref());
    let against_link = link_or_unknown(against.as_ref());

    let body = match ctx.notif_type {
        NotificationType::CorpWarSurrenderMsg => Body::new(
            "One party has surrendered",
            format!(
                "The war between {} and {} is coming to an end as one party has surrendered. The war will be declared as being over after approximately 24 hours.",
                against_link, declared_by_link
            ),
            Color::Warning,
        ),
        NotificationType::WarAdopted => {
            let alliance = ctx.entity(payload.alliance_id).await?;
            let alliance_link = link_or_unknown(alliance.as_ref());
            Body::new(
                format!(
                    "War update: {} has left {}",
                    name_or_unknown(against.as_ref()),
                    name_or_unknown(alliance.as_ref())
                ),
                format!(
                    "There has been a development in the war between {} and {}.\n{} is no longer a member of {}, and therefore a new war between {} and {} has begun.",
                    declared_by_link,
                    alliance_link,
                    against_link,
                    alliance_link,
                    declared_by_link,
                    against_link
                ),
                Color::Warning,
            )
        }
        NotificationType::WarDeclared => {
            let war_hq = payload
                .war_hq
                .as_deref()
                .map(format::strip_tags)
                .unwrap_or_else(|| UNKNOWN.to_string());
            let delay = payload
                .delay_hours
                .map(|h| h.to_string())
                .unwrap_or_else(|| "?".to_string());
            Body::new(
                format!(
                    "{} Declares War Against {}",
                    name_or_unknown(declared_by.as_ref()),
                    name_or_unknown(against.as_ref())
                ),
                format!(
                    "{} has declared war on {} with {} as the designated war headquarters.\nWithin {} hours fighting can legally occur between those involved.",
                    declared_by_link,
                    against_link,
                    bold(&war_hq),
                    bold(&delay)
                ),
                Color::Danger,
            )
        }
        NotificationType::WarInherited => {
            let alliance = ctx.entity(payload.alliance_id).await?;
            let opponent = ctx.entity(payload.opponent_id).await?;
            let alliance_link = link_or_unknown(alliance.as_ref());
            Body::new(
                format!(
                    "{} inherits war against {}",
                    name_or_unknown(alliance.as_ref()),
                    name_or_unknown(opponent.as_ref())
                ),
                format!(
                    "{} has inherited the war between {} and {} from newly joined {}. Within **24** hours fighting can legally occur with {}.",
                    alliance_link,
                    declared_by_link,
                    against_link,
                    ctx.entity_link(payload.quitter_id).await?,
                    alliance_link
                ),
                Color::Danger,
            )
        }
        NotificationType::WarRetractedByConcord => {
            let end_date = payload
                .end_date
                .and_then(format::ldap_time)
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| UNKNOWN.to_string());
            Body::new(
                "CONCORD invalidates war",
                format!(
                    "The war between {} and {} has been retracted by CONCORD.\nAfter {} CONCORD will again respond to any hostilities between those involved with full force.",
                    declared_by_link, against_link, end_date
                ),
                Color::Warning,
            )
        }
        other => return Err(RenderError::UnsupportedType(other.to_string())),
    };

    let thumbnail = declared_by.as_ref().and_then(format::entity_icon_url);
    Ok(body.with_thumbnail(thumbnail))
}

async fn surrender_offer(
    ctx: &RenderContext<'_>,
    payload: &WarPayload,
) -> Result<Body, RenderError> {
    let offered_by = ctx.entity(payload.owner_id_1).await?;
    let isk = payload
        .isk_value
        .map(|v| format::thousands_f64(v, 2))
        .unwrap_or_else(|| "?".to_string());
    let description = format!(
        "{} has offered to end the war with {} in the exchange for {} ISK. If accepted, the war will end in 24 hours and your organizations will be unable to declare new wars against each other for the next 2 weeks.",
        link_or_unknown(offered_by.as_ref()),
        ctx.entity_link(payload.owner_id_2).await?,
        isk
    );
    Ok(Body::new(
        format!("{} has offered a surrender", name_or_unknown(offered_by.as_ref())),
        description,
        Color::Info,
    )
    .with_thumbnail(offered_by.as_ref().and_then(format::entity_icon_url)))
}

async fn ally_joined(ctx: &RenderContext<'_>, payload: &WarPayload) -> Result<Body, RenderError> {
    let ally = ctx.entity(payload.ally_id).await?;
    let description = format!(
        "{} has joined {} in a war against {}. Their participation in the war will start at {}.",
        link_or_unknown(ally.as_ref()),
        ctx.entity_link(payload.defender_id).await?,
        ctx.entity_link(payload.aggressor_id).await?,
        ctx.ldap_target(payload.start_time)
    );
    Ok(
        Body::new("Ally Has Joined a War", description, Color::Warning)
            .with_thumbnail(ally.as_ref().and_then(format::entity_icon_url)),
    )
}

fn link_or_unknown(entity: Option<&super::EveEntity>) -> String {
    entity
        .map(format::entity_link)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn name_or_unknown(entity: Option<&super::EveEntity>) -> &str {
    entity.map(|e| e.name.as_str()).unwrap_or(UNKNOWN)
}

#[cfg(test)]
mod tests {
    use crate::render::RenderError;
    use crate::testing::{notification, now, owner, renderer, universe};
    use pretty_assertions::assert_eq;
    use structwatch_common::types::Color;

    const LEGION: &str = "[Legion of Doom](https://evemaps.dotlan.net/alliance/Legion_of_Doom)";
    const WAYNE_FOUNDATION: &str =
        "[Wayne Foundation](https://evemaps.dotlan.net/alliance/Wayne_Foundation)";

    #[tokio::test]
    async fn test_war_declared() {
        let (renderer, _) = renderer(universe()).await;
        let text = "againstID: 3001\ncost: 100000000\ndeclaredByID: 3002\ndelayHours: 24\nhostileState: false\nwarHQ: <b>Metropolis</b>\n";
        let embed = renderer
            .render_at(&notification("WarDeclared", text), &owner(), now())
            .await
            .unwrap();

        assert_eq!(embed.title, "Legion of Doom Declares War Against Wayne Foundation");
        assert_eq!(
            embed.description,
            format!(
                "{} has declared war on {} with **Metropolis** as the designated war headquarters.\nWithin **24** hours fighting can legally occur between those involved.",
                LEGION, WAYNE_FOUNDATION
            )
        );
        assert_eq!(embed.color, Color::Danger);
        assert_eq!(
            embed.thumbnail_url.as_deref(),
            Some("https://images.evetech.net/alliances/3002/logo?size=64")
        );
    }

    #[tokio::test]
    async fn test_surrender_offer() {
        let (renderer, _) = renderer(universe()).await;
        let text = "iskValue: 1500000000.5\nownerID1: 3002\nownerID2: 3001\n";
        let embed = renderer
            .render_at(&notification("WarSurrenderOfferMsg", text), &owner(), now())
            .await
            .unwrap();
        assert_eq!(embed.title, "Legion of Doom has offered a surrender");
        assert!(embed
            .description
            .contains("in the exchange for 1,500,000,000.50 ISK."));
    }

    #[tokio::test]
    async fn test_war_without_declaring_party_is_invalid() {
        let (renderer, _) = renderer(universe()).await;
        let result = renderer
            .render_at(&notification("CorpWarSurrenderMsg", "againstID: 3001\n"), &owner(), now())
            .await;
        assert!(matches!(result, Err(RenderError::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn test_ally_joined() {
        let (renderer, _) = renderer(universe()).await;
        let text = "aggressorID: 3002\nallyID: 2002\ndefenderID: 3001\nstartTime: 132000000000000000\n";
        let embed = renderer
            .render_at(&notification("AllyJoinedWarAllyMsg", text), &owner(), now())
            .await
            .unwrap();
        assert_eq!(embed.title, "Ally Has Joined a War");
        assert!(embed.description.starts_with(
            "[Lexcorp](https://evemaps.dotlan.net/corporation/Lexcorp) has joined [Wayne Foundation]"
        ));
    }
}
