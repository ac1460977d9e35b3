//! Corporation membership

use super::format::{self, UNKNOWN};
use super::{Body, RenderContext, RenderError};
use serde::Deserialize;
use structwatch_common::types::{Color, EveId, NotificationType};

#[derive(Debug, Deserialize)]
struct ApplicationPayload {
    #[serde(rename = "charID")]
    char_id: Option<EveId>,
    #[serde(rename = "corpID")]
    corp_id: Option<EveId>,
    #[serde(rename = "applicationText", default)]
    application_text: String,
    #[serde(rename = "invokingCharID")]
    invoking_char_id: Option<EveId>,
    #[serde(rename = "customMessage", default)]
    custom_message: String,
}

pub(super) async fn render(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: ApplicationPayload = ctx.payload()?;
    let character = ctx.entity(payload.char_id).await?;
    let corporation = ctx.entity(payload.corp_id).await?;

    let char_name = character
        .as_ref()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let char_link = character
        .as_ref()
        .map(format::entity_link)
        .unwrap_or_else(|| UNKNOWN.to_string());
    let corp_name = corporation
        .as_ref()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let corp_link = corporation
        .as_ref()
        .map(|c| format::corporation_link(&c.name))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let body = match ctx.notif_type {
        NotificationType::CorpAppNewMsg => Body::new(
            format!("New application from {}", char_name),
            format!(
                "New application from {} to join {}:\n> {}",
                char_link, corp_link, payload.application_text
            ),
            Color::Info,
        ),
        NotificationType::CorpAppInvitedMsg => Body::new(
            format!("{} has been invited", char_name),
            format!(
                "{} has been invited to join {} by {}.\nApplication:\n> {}",
                char_link,
                corp_link,
                ctx.entity_link(payload.invoking_char_id).await?,
                payload.application_text
            ),
            Color::Info,
        ),
        NotificationType::CorpAppRejectCustomMsg => Body::new(
            format!("Rejected application from {}", char_name),
            format!(
                "Application from {} to join {}:\n> {}\nHas been rejected:\n> {}",
                char_link, corp_link, payload.application_text, payload.custom_message
            ),
            Color::Info,
        ),
        NotificationType::CharAppWithdrawMsg => Body::new(
            format!("{} withdrew his/her application", char_name),
            format!(
                "{} withdrew his/her application to join {}:\n> {}",
                char_link, corp_link, payload.application_text
            ),
            Color::Info,
        ),
        NotificationType::CharAppAcceptMsg => Body::new(
            format!("{} joins {}", char_name, corp_name),
            format!("{} is now a member of {}.", char_link, corp_link),
            Color::Success,
        ),
        NotificationType::CharLeftCorpMsg => Body::new(
            format!("{} has left {}", char_name, corp_name),
            format!("{} is no longer a member of {}.", char_link, corp_link),
            Color::Info,
        ),
        other => return Err(RenderError::UnsupportedType(other.to_string())),
    };

    Ok(body.with_thumbnail(character.as_ref().and_then(format::entity_icon_url)))
}
