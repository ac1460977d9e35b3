//! Alerts generated from locally tracked structure state

use super::Notification;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use structwatch_common::types::NotificationType;
use structwatch_common::{Error, Result};
use structwatch_storage::{FuelAlertConfig, JumpFuelAlertConfig, Structure};

fn to_yaml(payload: &Value) -> Result<String> {
    serde_yaml::to_string(payload).map_err(|e| Error::Serialization(e.to_string()))
}

fn structure_payload(structure: &Structure, threshold: Option<i64>) -> Value {
    json!({
        "solarsystemID": structure.eve_solar_system_id,
        "structureID": structure.id,
        "structureTypeID": structure.eve_type_id,
        "threshold": threshold,
    })
}

fn tower_payload(structure: &Structure) -> Value {
    json!({
        "moonID": structure.eve_moon_id,
        "typeID": structure.eve_type_id,
        "structureID": structure.id,
        "solarSystemID": structure.eve_solar_system_id,
    })
}

/// Fuel is running out, as configured by a fuel alert config
pub fn fuel_alert(
    structure: &Structure,
    config: &FuelAlertConfig,
    now: DateTime<Utc>,
) -> Result<Notification> {
    let (notif_type, payload) = if structure.is_starbase() {
        (NotificationType::TowerResourceAlertMsg, tower_payload(structure))
    } else {
        (
            NotificationType::StructureFuelAlert,
            structure_payload(structure, None),
        )
    };
    Ok(
        Notification::temporary(structure.owner_id, notif_type, to_yaml(&payload)?, now)
            .with_overrides(config.color_enum(), Some(config.ping_type_enum())),
    )
}

/// A jump gate dropped to or below a liquid ozone threshold
pub fn jump_fuel_alert(
    structure: &Structure,
    config: &JumpFuelAlertConfig,
    now: DateTime<Utc>,
) -> Result<Notification> {
    let payload = structure_payload(structure, Some(config.threshold));
    Ok(Notification::temporary(
        structure.owner_id,
        NotificationType::StructureJumpFuelAlert,
        to_yaml(&payload)?,
        now,
    )
    .with_overrides(config.color_enum(), Some(config.ping_type_enum())))
}

/// Fuel expiry moved later
pub fn refueled(structure: &Structure, now: DateTime<Utc>) -> Result<Notification> {
    let (notif_type, payload) = if structure.is_starbase() {
        (NotificationType::TowerRefueledExtra, tower_payload(structure))
    } else {
        (
            NotificationType::StructureRefueledExtra,
            structure_payload(structure, None),
        )
    };
    Ok(Notification::temporary(
        structure.owner_id,
        notif_type,
        to_yaml(&payload)?,
        now,
    ))
}
