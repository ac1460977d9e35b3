//! Sovereignty bills

use super::format::{self, UNKNOWN};
use super::sov::IHUB_TYPE_ID;
use super::{Body, RenderContext, RenderError};
use serde::Deserialize;
use structwatch_common::types::{Color, EveId, NotificationType};

const IHUB_BILL_TYPE_ID: i64 = 7;

#[derive(Debug, Deserialize)]
struct BillPayload {
    #[serde(rename = "billTypeID")]
    bill_type_id: Option<i64>,
    #[serde(rename = "dueDate")]
    due_date: Option<i64>,
    #[serde(rename = "solarSystemID")]
    solar_system_id: Option<EveId>,
    #[serde(rename = "structureTypeID")]
    structure_type_id: Option<EveId>,
}

pub(super) async fn render(ctx: &RenderContext<'_>) -> Result<Body, RenderError> {
    let payload: BillPayload = ctx.payload()?;
    let due_date = payload
        .due_date
        .and_then(format::ldap_time)
        .map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let body = match ctx.notif_type {
        NotificationType::BillOutOfMoneyMsg => {
            let bill = if payload.bill_type_id == Some(IHUB_BILL_TYPE_ID) {
                "Infrastructure Hub Bill"
            } else {
                "Unknown Bill"
            };
            Body::new(
                "Insufficient Funds for Bill",
                format!(
                    "The selected corporation wallet division for automatic payments does not have enough current funds available to pay the {} due to be paid by {}. Transfer additional funds to the selected wallet division in order to meet your pending automatic bills.",
                    bill, due_date
                ),
                Color::Warning,
            )
        }
        NotificationType::InfrastructureHubBillAboutToExpire => Body::new(
            "IHub Bill About to Expire",
            format!(
                "Maintenance bill for Infrastructure Hub in {} expires at {}, if not paid in time this Infrastructure Hub will self-destruct.",
                ctx.solar_system_text(payload.solar_system_id).await?,
                due_date
            ),
            Color::Danger,
        )
        .with_thumbnail(Some(format::type_icon_url(IHUB_TYPE_ID))),
        NotificationType::IHubDestroyedByBillFailure => {
            let type_id = payload.structure_type_id.unwrap_or(IHUB_TYPE_ID);
            let type_name = ctx.type_name(Some(type_id)).await?;
            Body::new(
                format!(
                    "{} has self-destructed due to unpaid maintenance bills",
                    type_name
                ),
                format!(
                    "{} in {} has self-destructed, as the standard maintenance bills where not paid.",
                    type_name,
                    ctx.solar_system_text(payload.solar_system_id).await?
                ),
                Color::Danger,
            )
            .with_thumbnail(Some(format::type_icon_url(type_id)))
        }
        other => return Err(RenderError::UnsupportedType(other.to_string())),
    };

    Ok(body)
}
