//! Text, link and time formatting for rendered messages

use super::resolver::{EntityCategory, EveEntity, SolarSystem};
use chrono::{DateTime, Duration, TimeZone, Utc};
use structwatch_common::types::EveId;

pub const UNKNOWN: &str = "(unknown)";

const ICON_SIZE: u32 = 64;

/// Seconds between 1601-01-01 and 1970-01-01
const LDAP_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

pub fn bold(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("**{}**", text)
    }
}

pub fn link(name: &str, url: &str) -> String {
    format!("[{}]({})", name, url)
}

pub fn dotlan_alliance_url(name: &str) -> String {
    format!("https://evemaps.dotlan.net/alliance/{}", name.replace(' ', "_"))
}

pub fn dotlan_corporation_url(name: &str) -> String {
    format!(
        "https://evemaps.dotlan.net/corporation/{}",
        name.replace(' ', "_")
    )
}

pub fn dotlan_solar_system_url(name: &str) -> String {
    format!("https://evemaps.dotlan.net/system/{}", name.replace(' ', "_"))
}

pub fn evewho_character_url(id: EveId) -> String {
    format!("https://evewho.com/character/{}", id)
}

pub fn alliance_link(name: &str) -> String {
    link(name, &dotlan_alliance_url(name))
}

pub fn corporation_link(name: &str) -> String {
    link(name, &dotlan_corporation_url(name))
}

/// Profile link of an entity, the plain name if it has no profile page
pub fn entity_link(entity: &EveEntity) -> String {
    match entity.category {
        EntityCategory::Alliance => alliance_link(&entity.name),
        EntityCategory::Corporation => corporation_link(&entity.name),
        EntityCategory::Character => link(&entity.name, &evewho_character_url(entity.id)),
        EntityCategory::Faction | EntityCategory::Other => entity.name.clone(),
    }
}

/// `[name](dotlan) (Region)`
pub fn solar_system_text(system: &SolarSystem) -> String {
    format!(
        "{} ({})",
        link(&system.name, &dotlan_solar_system_url(&system.name)),
        system.region_name
    )
}

pub fn type_icon_url(type_id: EveId) -> String {
    format!(
        "https://images.evetech.net/types/{}/icon?size={}",
        type_id, ICON_SIZE
    )
}

/// Portrait or logo of an entity
pub fn entity_icon_url(entity: &EveEntity) -> Option<String> {
    let path = match entity.category {
        EntityCategory::Character => "characters/{}/portrait",
        EntityCategory::Corporation => "corporations/{}/logo",
        EntityCategory::Alliance => "alliances/{}/logo",
        EntityCategory::Faction | EntityCategory::Other => return None,
    };
    Some(format!(
        "https://images.evetech.net/{}?size={}",
        path.replace("{}", &entity.id.to_string()),
        ICON_SIZE
    ))
}

pub fn corporation_logo_url(id: EveId) -> String {
    format!(
        "https://images.evetech.net/corporations/{}/logo?size={}",
        id, ICON_SIZE
    )
}

pub fn alliance_logo_url(id: EveId) -> String {
    format!(
        "https://images.evetech.net/alliances/{}/logo?size={}",
        id, ICON_SIZE
    )
}

/// Convert a Windows filetime (100ns ticks since 1601) to a timestamp
pub fn ldap_time(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(10_000_000) - LDAP_EPOCH_OFFSET_SECS;
    let nanos = ticks.rem_euclid(10_000_000) * 100;
    Utc.timestamp_opt(secs, nanos as u32).single()
}

/// Convert a duration in 100ns ticks
pub fn ldap_duration(ticks: i64) -> Duration {
    Duration::microseconds(ticks / 10)
}

/// Relative time until `target`, like "2 days, 3 hours"
pub fn time_until(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const UNITS: [(i64, &str); 6] = [
        (60 * 60 * 24 * 365, "year"),
        (60 * 60 * 24 * 30, "month"),
        (60 * 60 * 24 * 7, "week"),
        (60 * 60 * 24, "day"),
        (60 * 60, "hour"),
        (60, "minute"),
    ];

    let mut remaining = (target - now).num_seconds();
    if remaining <= 0 {
        return "0 minutes".to_string();
    }

    let mut parts = Vec::with_capacity(2);
    for (index, (seconds, name)) in UNITS.iter().enumerate() {
        let count = remaining / seconds;
        if count == 0 {
            if parts.is_empty() {
                continue;
            }
            break;
        }
        remaining -= count * seconds;
        parts.push(plural(count, name));
        if parts.len() == 2 || index == UNITS.len() - 1 {
            break;
        }
        // only adjacent units are shown
        let (next_seconds, _) = UNITS[index + 1];
        if remaining < next_seconds {
            break;
        }
    }

    if parts.is_empty() {
        return "0 minutes".to_string();
    }
    parts.join(", ")
}

fn plural(count: i64, name: &str) -> String {
    if count == 1 {
        format!("1 {}", name)
    } else {
        format!("{} {}s", count, name)
    }
}

/// `**YYYY-MM-DD HH:MM** (relative)`
pub fn target_datetime(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!(
        "{} ({})",
        bold(&target.format("%Y-%m-%d %H:%M").to_string()),
        time_until(target, now)
    )
}

/// Thousands separated integer
pub fn thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Thousands separated float with a fixed number of decimals
pub fn thousands_f64(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };
    let int_value: i64 = int_part.parse().unwrap_or(0);
    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, thousands(int_value), frac),
        None => format!("{}{}", sign, thousands(int_value)),
    }
}

/// Remove markup tags like `<b>` from a text
pub fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Damage levels in percent, joined with " | "
pub fn damage_text(shield: Option<f64>, armor: Option<f64>, hull: Option<f64>, scale: f64) -> String {
    [("Shield", shield), ("Armor", armor), ("Hull", hull)]
        .iter()
        .filter_map(|(label, value)| value.map(|v| format!("{}: {:.1}%", label, v * scale)))
        .collect::<Vec<_>>()
        .join(" | ")
}
