//! Common types for StructWatch

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Corporation ID of a structure owner
pub type OwnerId = i64;

/// Unique identifier for structures
pub type StructureId = i64;

/// Unique identifier for remote events
pub type NotificationId = i64;

/// Unique identifier for webhooks
pub type WebhookId = i64;

/// Unique identifier for alert configs
pub type AlertConfigId = i64;

/// Any ID of the remote game universe (characters, types, systems...)
pub type EveId = i64;

/// Notification ID given to temporary alerts which are never persisted
pub const TEMPORARY_NOTIFICATION_ID: NotificationId = 999_999_999_999;

/// Error returned when a type tag is not one of the supported tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNotificationType(pub String);

impl fmt::Display for UnknownNotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown notification type: {}", self.0)
    }
}

impl std::error::Error for UnknownNotificationType {}

/// All notification type tags that can be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    // upwell structures
    StructureAnchoring,
    StructureOnline,
    StructureServicesOffline,
    StructureWentHighPower,
    StructureWentLowPower,
    StructureUnanchoring,
    StructureFuelAlert,
    StructureRefueledExtra,
    StructureJumpFuelAlert,
    StructureUnderAttack,
    #[serde(rename = "StructureLostShields")]
    StructureLostShield,
    StructureLostArmor,
    StructureDestroyed,
    #[serde(rename = "StructuresReinforcementChanged")]
    StructureReinforceChanged,
    OwnershipTransferred,

    // customs offices
    OrbitalAttacked,
    OrbitalReinforced,

    // starbases
    TowerAlertMsg,
    TowerResourceAlertMsg,
    TowerRefueledExtra,
    TowerReinforcedExtra,

    // moon mining
    MoonminingExtractionStarted,
    MoonminingLaserFired,
    MoonminingExtractionCancelled,
    MoonminingExtractionFinished,
    MoonminingAutomaticFracture,

    // sovereignty
    SovStructureReinforced,
    SovStructureDestroyed,
    EntosisCaptureStarted,
    SovCommandNodeEventStarted,
    #[serde(rename = "SovAllClaimAquiredMsg")]
    SovAllClaimAcquiredMsg,
    SovAllClaimLostMsg,
    AllAnchoringMsg,

    // wars
    WarDeclared,
    AllyJoinedWarAggressorMsg,
    AllyJoinedWarAllyMsg,
    AllyJoinedWarDefenderMsg,
    WarAdopted,
    WarInherited,
    CorpWarSurrenderMsg,
    WarRetractedByConcord,
    CorpBecameWarEligible,
    CorpNoLongerWarEligible,
    WarSurrenderOfferMsg,

    // corporation membership
    CorpAppNewMsg,
    CorpAppInvitedMsg,
    CorpAppRejectCustomMsg,
    CharAppWithdrawMsg,
    CharAppAcceptMsg,
    CharLeftCorpMsg,

    // billing
    BillOutOfMoneyMsg,
    InfrastructureHubBillAboutToExpire,
    IHubDestroyedByBillFailure,
}

impl NotificationType {
    pub const ALL: [NotificationType; 53] = [
        Self::StructureAnchoring,
        Self::StructureOnline,
        Self::StructureServicesOffline,
        Self::StructureWentHighPower,
        Self::StructureWentLowPower,
        Self::StructureUnanchoring,
        Self::StructureFuelAlert,
        Self::StructureRefueledExtra,
        Self::StructureJumpFuelAlert,
        Self::StructureUnderAttack,
        Self::StructureLostShield,
        Self::StructureLostArmor,
        Self::StructureDestroyed,
        Self::StructureReinforceChanged,
        Self::OwnershipTransferred,
        Self::OrbitalAttacked,
        Self::OrbitalReinforced,
        Self::TowerAlertMsg,
        Self::TowerResourceAlertMsg,
        Self::TowerRefueledExtra,
        Self::TowerReinforcedExtra,
        Self::MoonminingExtractionStarted,
        Self::MoonminingLaserFired,
        Self::MoonminingExtractionCancelled,
        Self::MoonminingExtractionFinished,
        Self::MoonminingAutomaticFracture,
        Self::SovStructureReinforced,
        Self::SovStructureDestroyed,
        Self::EntosisCaptureStarted,
        Self::SovCommandNodeEventStarted,
        Self::SovAllClaimAcquiredMsg,
        Self::SovAllClaimLostMsg,
        Self::AllAnchoringMsg,
        Self::WarDeclared,
        Self::AllyJoinedWarAggressorMsg,
        Self::AllyJoinedWarAllyMsg,
        Self::AllyJoinedWarDefenderMsg,
        Self::WarAdopted,
        Self::WarInherited,
        Self::CorpWarSurrenderMsg,
        Self::WarRetractedByConcord,
        Self::CorpBecameWarEligible,
        Self::CorpNoLongerWarEligible,
        Self::WarSurrenderOfferMsg,
        Self::CorpAppNewMsg,
        Self::CorpAppInvitedMsg,
        Self::CorpAppRejectCustomMsg,
        Self::CharAppWithdrawMsg,
        Self::CharAppAcceptMsg,
        Self::CharLeftCorpMsg,
        Self::BillOutOfMoneyMsg,
        Self::InfrastructureHubBillAboutToExpire,
        Self::IHubDestroyedByBillFailure,
    ];

    /// Type tag as used by the remote API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructureAnchoring => "StructureAnchoring",
            Self::StructureOnline => "StructureOnline",
            Self::StructureServicesOffline => "StructureServicesOffline",
            Self::StructureWentHighPower => "StructureWentHighPower",
            Self::StructureWentLowPower => "StructureWentLowPower",
            Self::StructureUnanchoring => "StructureUnanchoring",
            Self::StructureFuelAlert => "StructureFuelAlert",
            Self::StructureRefueledExtra => "StructureRefueledExtra",
            Self::StructureJumpFuelAlert => "StructureJumpFuelAlert",
            Self::StructureUnderAttack => "StructureUnderAttack",
            Self::StructureLostShield => "StructureLostShields",
            Self::StructureLostArmor => "StructureLostArmor",
            Self::StructureDestroyed => "StructureDestroyed",
            Self::StructureReinforceChanged => "StructuresReinforcementChanged",
            Self::OwnershipTransferred => "OwnershipTransferred",
            Self::OrbitalAttacked => "OrbitalAttacked",
            Self::OrbitalReinforced => "OrbitalReinforced",
            Self::TowerAlertMsg => "TowerAlertMsg",
            Self::TowerResourceAlertMsg => "TowerResourceAlertMsg",
            Self::TowerRefueledExtra => "TowerRefueledExtra",
            Self::TowerReinforcedExtra => "TowerReinforcedExtra",
            Self::MoonminingExtractionStarted => "MoonminingExtractionStarted",
            Self::MoonminingLaserFired => "MoonminingLaserFired",
            Self::MoonminingExtractionCancelled => "MoonminingExtractionCancelled",
            Self::MoonminingExtractionFinished => "MoonminingExtractionFinished",
            Self::MoonminingAutomaticFracture => "MoonminingAutomaticFracture",
            Self::SovStructureReinforced => "SovStructureReinforced",
            Self::SovStructureDestroyed => "SovStructureDestroyed",
            Self::EntosisCaptureStarted => "EntosisCaptureStarted",
            Self::SovCommandNodeEventStarted => "SovCommandNodeEventStarted",
            Self::SovAllClaimAcquiredMsg => "SovAllClaimAquiredMsg",
            Self::SovAllClaimLostMsg => "SovAllClaimLostMsg",
            Self::AllAnchoringMsg => "AllAnchoringMsg",
            Self::WarDeclared => "WarDeclared",
            Self::AllyJoinedWarAggressorMsg => "AllyJoinedWarAggressorMsg",
            Self::AllyJoinedWarAllyMsg => "AllyJoinedWarAllyMsg",
            Self::AllyJoinedWarDefenderMsg => "AllyJoinedWarDefenderMsg",
            Self::WarAdopted => "WarAdopted",
            Self::WarInherited => "WarInherited",
            Self::CorpWarSurrenderMsg => "CorpWarSurrenderMsg",
            Self::WarRetractedByConcord => "WarRetractedByConcord",
            Self::CorpBecameWarEligible => "CorpBecameWarEligible",
            Self::CorpNoLongerWarEligible => "CorpNoLongerWarEligible",
            Self::WarSurrenderOfferMsg => "WarSurrenderOfferMsg",
            Self::CorpAppNewMsg => "CorpAppNewMsg",
            Self::CorpAppInvitedMsg => "CorpAppInvitedMsg",
            Self::CorpAppRejectCustomMsg => "CorpAppRejectCustomMsg",
            Self::CharAppWithdrawMsg => "CharAppWithdrawMsg",
            Self::CharAppAcceptMsg => "CharAppAcceptMsg",
            Self::CharLeftCorpMsg => "CharLeftCorpMsg",
            Self::BillOutOfMoneyMsg => "BillOutOfMoneyMsg",
            Self::InfrastructureHubBillAboutToExpire => "InfrastructureHubBillAboutToExpire",
            Self::IHubDestroyedByBillFailure => "IHubDestroyedByBillFailure",
        }
    }

    /// Types produced locally instead of by the remote API
    pub fn is_generated(&self) -> bool {
        matches!(
            self,
            Self::StructureJumpFuelAlert
                | Self::StructureRefueledExtra
                | Self::TowerRefueledExtra
                | Self::TowerReinforcedExtra
        )
    }

    /// Types only forwarded by the alliance's main owner
    pub fn is_alliance_level(&self) -> bool {
        matches!(
            self,
            Self::BillOutOfMoneyMsg
                | Self::IHubDestroyedByBillFailure
                | Self::InfrastructureHubBillAboutToExpire
                | Self::EntosisCaptureStarted
                | Self::SovCommandNodeEventStarted
                | Self::SovAllClaimAcquiredMsg
                | Self::SovStructureReinforced
                | Self::SovStructureDestroyed
                | Self::SovAllClaimLostMsg
                | Self::AllAnchoringMsg
                | Self::WarDeclared
                | Self::AllyJoinedWarAggressorMsg
                | Self::AllyJoinedWarAllyMsg
                | Self::AllyJoinedWarDefenderMsg
                | Self::WarAdopted
                | Self::WarInherited
                | Self::CorpWarSurrenderMsg
                | Self::WarRetractedByConcord
                | Self::CorpBecameWarEligible
                | Self::CorpNoLongerWarEligible
                | Self::WarSurrenderOfferMsg
        )
    }

    /// Types that reference concrete structures and may use structure webhooks
    pub fn is_structure_related(&self) -> bool {
        matches!(
            self,
            Self::StructureOnline
                | Self::StructureFuelAlert
                | Self::StructureJumpFuelAlert
                | Self::StructureRefueledExtra
                | Self::StructureServicesOffline
                | Self::StructureWentLowPower
                | Self::StructureWentHighPower
                | Self::StructureUnanchoring
                | Self::StructureUnderAttack
                | Self::StructureLostShield
                | Self::StructureLostArmor
                | Self::StructureDestroyed
                | Self::OwnershipTransferred
                | Self::StructureAnchoring
                | Self::StructureReinforceChanged
                | Self::MoonminingExtractionStarted
                | Self::MoonminingExtractionFinished
                | Self::MoonminingAutomaticFracture
                | Self::MoonminingExtractionCancelled
                | Self::MoonminingLaserFired
                | Self::OrbitalAttacked
                | Self::OrbitalReinforced
                | Self::TowerAlertMsg
                | Self::TowerResourceAlertMsg
                | Self::TowerRefueledExtra
                | Self::TowerReinforcedExtra
        )
    }

    /// Types enabled on newly created webhooks
    pub fn webhook_defaults() -> Vec<NotificationType> {
        vec![
            Self::StructureAnchoring,
            Self::StructureDestroyed,
            Self::StructureFuelAlert,
            Self::StructureLostArmor,
            Self::StructureLostShield,
            Self::StructureOnline,
            Self::StructureServicesOffline,
            Self::StructureUnderAttack,
            Self::StructureWentHighPower,
            Self::StructureWentLowPower,
            Self::OrbitalAttacked,
            Self::OrbitalReinforced,
            Self::TowerAlertMsg,
            Self::TowerResourceAlertMsg,
            Self::SovStructureReinforced,
            Self::SovStructureDestroyed,
        ]
    }
}

impl FromStr for NotificationType {
    type Err = UnknownNotificationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownNotificationType(s.to_string()))
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embed color of a rendered message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Danger,
    Info,
    Success,
    Warning,
}

impl Color {
    /// RGB value as sent to the destination
    pub fn value(&self) -> u32 {
        match self {
            Color::Danger => 0xD9534F,
            Color::Info => 0x5BC0DE,
            Color::Success => 0x5CB85C,
            Color::Warning => 0xF0AD4E,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0xD9534F => Some(Color::Danger),
            0x5BC0DE => Some(Color::Info),
            0x5CB85C => Some(Color::Success),
            0xF0AD4E => Some(Color::Warning),
            _ => None,
        }
    }
}

/// Channel-wide ping attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingType {
    #[default]
    None,
    Here,
    Everyone,
}

impl PingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PingType::None => "none",
            PingType::Here => "here",
            PingType::Everyone => "everyone",
        }
    }

    /// Message content that triggers the ping
    pub fn content(&self) -> &'static str {
        match self {
            PingType::None => "",
            PingType::Here => "@here",
            PingType::Everyone => "@everyone",
        }
    }

    /// Default ping for a message of the given color
    pub fn for_color(color: Color) -> Self {
        match color {
            Color::Danger => PingType::Everyone,
            Color::Warning => PingType::Here,
            _ => PingType::None,
        }
    }
}

impl FromStr for PingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PingType::None),
            "here" => Ok(PingType::Here),
            "everyone" => Ok(PingType::Everyone),
            other => Err(format!("invalid ping type: {}", other)),
        }
    }
}

/// Subsystems whose sync health is tracked per owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Structures,
    Notifications,
    Forwarding,
}

impl Subsystem {
    pub const ALL: [Subsystem; 3] = [
        Subsystem::Structures,
        Subsystem::Notifications,
        Subsystem::Forwarding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Structures => "structures",
            Subsystem::Notifications => "notifications",
            Subsystem::Forwarding => "forwarding",
        }
    }
}

impl FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structures" => Ok(Subsystem::Structures),
            "notifications" => Ok(Subsystem::Notifications),
            "forwarding" => Ok(Subsystem::Forwarding),
            other => Err(format!("invalid subsystem: {}", other)),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error state of the last sync of a subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncError {
    #[default]
    None,
    TokenInvalid,
    TokenExpired,
    InsufficientPermissions,
    NoCharacter,
    RemoteUnavailable,
    Unknown,
}

impl SyncError {
    pub fn code(&self) -> i32 {
        match self {
            SyncError::None => 0,
            SyncError::TokenInvalid => 1,
            SyncError::TokenExpired => 2,
            SyncError::InsufficientPermissions => 3,
            SyncError::NoCharacter => 4,
            SyncError::RemoteUnavailable => 5,
            SyncError::Unknown => 99,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => SyncError::None,
            1 => SyncError::TokenInvalid,
            2 => SyncError::TokenExpired,
            3 => SyncError::InsufficientPermissions,
            4 => SyncError::NoCharacter,
            5 => SyncError::RemoteUnavailable,
            _ => SyncError::Unknown,
        }
    }

    pub fn is_error(&self) -> bool {
        *self != SyncError::None
    }

    pub fn description(&self) -> &'static str {
        match self {
            SyncError::None => "No error",
            SyncError::TokenInvalid => "Invalid token",
            SyncError::TokenExpired => "Expired token",
            SyncError::InsufficientPermissions => "Insufficient permissions",
            SyncError::NoCharacter => "No character set for fetching data from the remote API",
            SyncError::RemoteUnavailable => "Remote API is currently unavailable",
            SyncError::Unknown => "Unknown error",
        }
    }
}

/// Category of a tracked structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Upwell,
    Starbase,
    CustomsOffice,
    JumpGate,
}

impl StructureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureKind::Upwell => "upwell",
            StructureKind::Starbase => "starbase",
            StructureKind::CustomsOffice => "customs_office",
            StructureKind::JumpGate => "jump_gate",
        }
    }

    /// Whether structures of this kind consume fuel blocks
    pub fn burns_fuel(&self) -> bool {
        !matches!(self, StructureKind::CustomsOffice)
    }
}

impl FromStr for StructureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upwell" => Ok(StructureKind::Upwell),
            "starbase" => Ok(StructureKind::Starbase),
            "customs_office" => Ok(StructureKind::CustomsOffice),
            "jump_gate" => Ok(StructureKind::JumpGate),
            other => Err(format!("invalid structure kind: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_notification_type_tags_round_trip() {
        for t in NotificationType::ALL {
            assert_eq!(t.as_str().parse::<NotificationType>().unwrap(), t);
        }
        assert_eq!(
            "SovAllClaimAquiredMsg".parse::<NotificationType>().unwrap(),
            NotificationType::SovAllClaimAcquiredMsg
        );
    }

    #[test]
    fn test_serde_tag_matches_as_str() {
        for t in NotificationType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_unknown_type() {
        let err = "SomethingNew".parse::<NotificationType>().unwrap_err();
        assert_eq!(err, UnknownNotificationType("SomethingNew".to_string()));
    }

    #[test]
    fn test_ping_for_color() {
        assert_eq!(PingType::for_color(Color::Danger), PingType::Everyone);
        assert_eq!(PingType::for_color(Color::Warning), PingType::Here);
        assert_eq!(PingType::for_color(Color::Info), PingType::None);
        assert_eq!(PingType::for_color(Color::Success), PingType::None);
    }

    #[test]
    fn test_color_values() {
        assert_eq!(Color::Danger.value(), 14242639);
        assert_eq!(Color::from_value(0xF0AD4E), Some(Color::Warning));
        assert_eq!(Color::from_value(1), None);
    }

    #[test]
    fn test_sync_error_codes() {
        assert_eq!(SyncError::RemoteUnavailable.code(), 5);
        assert_eq!(SyncError::from_code(3), SyncError::InsufficientPermissions);
        assert_eq!(SyncError::from_code(42), SyncError::Unknown);
        assert!(!SyncError::None.is_error());
    }
}
