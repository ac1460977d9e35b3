//! Notification rendering
//!
//! Turns a [`Notification`] into a [`RenderedEmbed`]: a title, a markdown
//! description and presentation hints. Each family of notification types
//! has its own submodule. IDs in the payload are resolved to names through
//! an [`EntityResolver`].

mod billing;
mod character;
pub mod format;
mod moonmining;
mod orbitals;
pub mod resolver;
mod sov;
mod structures;
mod towers;
mod war;

pub use resolver::{
    CachedResolver, EntityCategory, EntityResolver, EsiEntityResolver, EveEntity, EveType,
    SolarSystem,
};
pub use towers::{fuel_blocks_per_hour, fuel_duration};
pub use sov::{IHUB_TYPE_ID, TCU_TYPE_ID};

use crate::alerts::Notification;
use crate::esi::FetchError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use structwatch_common::types::{Color, EveId, NotificationType, PingType};
use structwatch_storage::{Owner, Structure, StructureRepository};
use thiserror::Error;

use format::UNKNOWN;

/// Footer of messages about remote events
pub const EVE_FOOTER: &str = "Eve Online";

/// Rendering failure
#[derive(Debug, Error)]
pub enum RenderError {
    /// No renderer exists for the type tag
    #[error("unsupported notification type: {0}")]
    UnsupportedType(String),

    /// The payload could not be decoded or misses a required field
    #[error("invalid payload for {notif_type}: {message}")]
    InvalidPayload { notif_type: String, message: String },

    /// A name lookup failed. Rendering can be retried later.
    #[error("lookup failed: {0}")]
    Lookup(String),
}

impl From<FetchError> for RenderError {
    fn from(e: FetchError) -> Self {
        RenderError::Lookup(e.to_string())
    }
}

impl From<structwatch_common::Error> for RenderError {
    fn from(e: structwatch_common::Error) -> Self {
        RenderError::Lookup(e.to_string())
    }
}

/// Author line of an embed
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

/// Footer line of an embed
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: Option<String>,
}

/// A rendered notification, independent of the destination's wire format
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmbed {
    pub title: String,
    pub description: String,
    pub color: Color,
    pub thumbnail_url: Option<String>,
    pub ping_type: PingType,
    pub author: EmbedAuthor,
    pub footer: EmbedFooter,
    pub timestamp: DateTime<Utc>,
}

/// Type specific part of a rendered notification
#[derive(Debug, Clone)]
pub(crate) struct Body {
    pub title: String,
    pub description: String,
    pub color: Color,
    pub thumbnail: Option<String>,
}

impl Body {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: Color) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail = url;
        self
    }
}

/// Renders notifications into embeds
#[derive(Clone)]
pub struct NotificationRenderer {
    resolver: Arc<dyn EntityResolver>,
    structures: Arc<dyn StructureRepository>,
    app_title: String,
}

impl NotificationRenderer {
    pub fn new(
        resolver: Arc<dyn EntityResolver>,
        structures: Arc<dyn StructureRepository>,
        app_title: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            structures,
            app_title: app_title.into(),
        }
    }

    pub async fn render(
        &self,
        notification: &Notification,
        owner: &Owner,
    ) -> Result<RenderedEmbed, RenderError> {
        self.render_at(notification, owner, Utc::now()).await
    }

    /// Render with relative times computed against `now`
    pub async fn render_at(
        &self,
        notification: &Notification,
        owner: &Owner,
        now: DateTime<Utc>,
    ) -> Result<RenderedEmbed, RenderError> {
        let notif_type = notification
            .notif_type_enum()
            .map_err(|e| RenderError::UnsupportedType(e.0))?;

        let ctx = RenderContext {
            resolver: self.resolver.as_ref(),
            structures: self.structures.as_ref(),
            notification,
            owner,
            notif_type,
            now,
        };

        use NotificationType::*;
        let body = match notif_type {
            StructureAnchoring
            | StructureOnline
            | StructureServicesOffline
            | StructureWentHighPower
            | StructureWentLowPower
            | StructureUnanchoring
            | StructureFuelAlert
            | StructureRefueledExtra
            | StructureJumpFuelAlert
            | StructureUnderAttack
            | StructureLostShield
            | StructureLostArmor
            | StructureDestroyed
            | StructureReinforceChanged
            | OwnershipTransferred => structures::render(&ctx).await?,
            OrbitalAttacked | OrbitalReinforced => orbitals::render(&ctx).await?,
            TowerAlertMsg | TowerResourceAlertMsg | TowerRefueledExtra | TowerReinforcedExtra => {
                towers::render(&ctx).await?
            }
            MoonminingExtractionStarted
            | MoonminingLaserFired
            | MoonminingExtractionCancelled
            | MoonminingExtractionFinished
            | MoonminingAutomaticFracture => moonmining::render(&ctx).await?,
            SovStructureReinforced
            | SovStructureDestroyed
            | EntosisCaptureStarted
            | SovCommandNodeEventStarted
            | SovAllClaimAcquiredMsg
            | SovAllClaimLostMsg
            | AllAnchoringMsg => sov::render(&ctx).await?,
            WarDeclared
            | AllyJoinedWarAggressorMsg
            | AllyJoinedWarAllyMsg
            | AllyJoinedWarDefenderMsg
            | WarAdopted
            | WarInherited
            | CorpWarSurrenderMsg
            | WarRetractedByConcord
            | CorpBecameWarEligible
            | CorpNoLongerWarEligible
            | WarSurrenderOfferMsg => war::render(&ctx).await?,
            CorpAppNewMsg
            | CorpAppInvitedMsg
            | CorpAppRejectCustomMsg
            | CharAppWithdrawMsg
            | CharAppAcceptMsg
            | CharLeftCorpMsg => character::render(&ctx).await?,
            BillOutOfMoneyMsg | InfrastructureHubBillAboutToExpire | IHubDestroyedByBillFailure => {
                billing::render(&ctx).await?
            }
        };

        let color = notification.color_override.unwrap_or(body.color);
        let ping_type = notification
            .ping_type_override
            .unwrap_or_else(|| PingType::for_color(color));

        let alliance_level = notif_type.is_alliance_level();
        let author_icon = match (alliance_level, owner.alliance_id) {
            (true, Some(alliance_id)) => format::alliance_logo_url(alliance_id),
            _ => format::corporation_logo_url(owner.corporation_id),
        };
        let footer_text = if notification.is_temporary() {
            self.app_title.clone()
        } else {
            EVE_FOOTER.to_string()
        };

        Ok(RenderedEmbed {
            title: body.title,
            description: body.description,
            color,
            thumbnail_url: body.thumbnail,
            ping_type,
            author: EmbedAuthor {
                name: owner.display_name(alliance_level).to_string(),
                icon_url: Some(author_icon),
            },
            footer: EmbedFooter {
                text: footer_text,
                icon_url: None,
            },
            timestamp: notification.timestamp,
        })
    }
}

/// Everything a family renderer needs, with lookup shortcuts that fall
/// back to a placeholder for IDs that do not resolve
pub(crate) struct RenderContext<'a> {
    resolver: &'a dyn EntityResolver,
    structures: &'a dyn StructureRepository,
    pub notification: &'a Notification,
    pub owner: &'a Owner,
    pub notif_type: NotificationType,
    pub now: DateTime<Utc>,
}

impl<'a> RenderContext<'a> {
    /// Decode the YAML payload
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, RenderError> {
        serde_yaml::from_str(&self.notification.text).map_err(|e| self.invalid(e.to_string()))
    }

    pub fn invalid(&self, message: impl Into<String>) -> RenderError {
        RenderError::InvalidPayload {
            notif_type: self.notification.notif_type.clone(),
            message: message.into(),
        }
    }

    /// A required payload field
    pub fn require<T>(&self, value: Option<T>, field: &str) -> Result<T, RenderError> {
        value.ok_or_else(|| self.invalid(format!("missing field {}", field)))
    }

    pub async fn entity(&self, id: Option<EveId>) -> Result<Option<EveEntity>, RenderError> {
        match id {
            Some(id) => Ok(self.resolver.entity(id).await?),
            None => Ok(None),
        }
    }

    pub async fn entity_name(&self, id: Option<EveId>) -> Result<String, RenderError> {
        Ok(self
            .entity(id)
            .await?
            .map(|e| e.name)
            .unwrap_or_else(|| UNKNOWN.to_string()))
    }

    pub async fn entity_link(&self, id: Option<EveId>) -> Result<String, RenderError> {
        Ok(self
            .entity(id)
            .await?
            .map(|e| format::entity_link(&e))
            .unwrap_or_else(|| UNKNOWN.to_string()))
    }

    pub async fn solar_system(&self, id: Option<EveId>) -> Result<Option<SolarSystem>, RenderError> {
        match id {
            Some(id) => Ok(self.resolver.solar_system(id).await?),
            None => Ok(None),
        }
    }

    /// Linked system name with its region
    pub async fn solar_system_text(&self, id: Option<EveId>) -> Result<String, RenderError> {
        Ok(self
            .solar_system(id)
            .await?
            .map(|s| format::solar_system_text(&s))
            .unwrap_or_else(|| UNKNOWN.to_string()))
    }

    pub async fn solar_system_name(&self, id: Option<EveId>) -> Result<String, RenderError> {
        Ok(self
            .solar_system(id)
            .await?
            .map(|s| s.name)
            .unwrap_or_else(|| UNKNOWN.to_string()))
    }

    pub async fn eve_type(&self, id: Option<EveId>) -> Result<Option<EveType>, RenderError> {
        match id {
            Some(id) => Ok(self.resolver.type_info(id).await?),
            None => Ok(None),
        }
    }

    pub async fn type_name(&self, id: Option<EveId>) -> Result<String, RenderError> {
        Ok(self
            .eve_type(id)
            .await?
            .map(|t| t.name)
            .unwrap_or_else(|| UNKNOWN.to_string()))
    }

    pub async fn moon_name(&self, id: Option<EveId>) -> Result<String, RenderError> {
        let name = match id {
            Some(id) => self.resolver.moon(id).await?,
            None => None,
        };
        Ok(name.unwrap_or_else(|| UNKNOWN.to_string()))
    }

    pub async fn planet_name(&self, id: Option<EveId>) -> Result<String, RenderError> {
        let name = match id {
            Some(id) => self.resolver.planet(id).await?,
            None => None,
        };
        Ok(name.unwrap_or_else(|| UNKNOWN.to_string()))
    }

    pub async fn structure(&self, id: Option<EveId>) -> Result<Option<Structure>, RenderError> {
        match id {
            Some(id) => Ok(self.structures.get(id).await?),
            None => Ok(None),
        }
    }

    pub async fn structure_by_moon(
        &self,
        moon_id: Option<EveId>,
    ) -> Result<Option<Structure>, RenderError> {
        match moon_id {
            Some(id) => Ok(self.structures.find_by_moon(id).await?),
            None => Ok(None),
        }
    }

    /// Linked name of the owning corporation
    pub fn owner_link(&self) -> String {
        format::corporation_link(&self.owner.corporation_name)
    }

    /// Absolute time with the time left until it
    pub fn target(&self, at: DateTime<Utc>) -> String {
        format::target_datetime(at, self.now)
    }

    /// Target of an LDAP timestamp field, `(unknown)` if missing or invalid
    pub fn ldap_target(&self, ticks: Option<i64>) -> String {
        ticks
            .and_then(format::ldap_time)
            .map(|at| self.target(at))
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Target of the notification timestamp plus an LDAP duration
    pub fn ldap_target_after(&self, ticks: Option<i64>) -> String {
        ticks
            .map(|t| self.target(self.notification.timestamp + format::ldap_duration(t)))
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{notification, owner, renderer, universe};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unknown_type_is_unsupported() {
        let (renderer, _) = renderer(universe()).await;
        let result = renderer
            .render(&notification("CorpBecomesAlliance", ""), &owner())
            .await;
        assert!(matches!(result, Err(RenderError::UnsupportedType(t)) if t == "CorpBecomesAlliance"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_invalid() {
        let (renderer, _) = renderer(universe()).await;
        let result = renderer
            .render(
                &notification("StructureDestroyed", "structureID: [unclosed"),
                &owner(),
            )
            .await;
        assert!(matches!(result, Err(RenderError::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_retryable() {
        let (renderer, _) = renderer(universe().failing()).await;
        let text = "solarsystemID: 30002537\nstructureID: 1001\nstructureTypeID: 35832\n";
        let result = renderer
            .render(&notification("StructureDestroyed", text), &owner())
            .await;
        assert!(matches!(result, Err(RenderError::Lookup(_))));
    }

    #[tokio::test]
    async fn test_presentation_defaults() {
        let (renderer, _) = renderer(universe()).await;
        let text = "solarsystemID: 30002537\nstructureID: 1001\nstructureTypeID: 35832\n";
        let embed = renderer
            .render(&notification("StructureDestroyed", text), &owner())
            .await
            .unwrap();

        assert_eq!(embed.color, Color::Danger);
        assert_eq!(embed.ping_type, PingType::Everyone);
        assert_eq!(embed.footer.text, EVE_FOOTER);
        assert_eq!(embed.author.name, "Wayne Enterprises");
        assert_eq!(
            embed.author.icon_url.as_deref(),
            Some("https://images.evetech.net/corporations/2001/logo?size=64")
        );
    }

    #[tokio::test]
    async fn test_overrides_and_generated_footer() {
        let (renderer, _) = renderer(universe()).await;
        let text = "solarsystemID: 30002537\nstructureID: 1001\nstructureTypeID: 35832\n";
        let notification = Notification::temporary(
            2001,
            NotificationType::StructureFuelAlert,
            text.to_string(),
            Utc::now(),
        )
        .with_overrides(Some(Color::Danger), Some(PingType::None));

        let embed = renderer.render(&notification, &owner()).await.unwrap();
        assert_eq!(embed.color, Color::Danger);
        assert_eq!(embed.ping_type, PingType::None);
        assert_eq!(embed.footer.text, "StructWatch");
    }

    #[tokio::test]
    async fn test_alliance_level_author() {
        let (renderer, _) = renderer(universe()).await;
        let embed = renderer
            .render(&notification("CorpBecameWarEligible", "{}"), &owner())
            .await
            .unwrap();
        assert_eq!(embed.author.name, "Wayne Foundation");
        assert_eq!(
            embed.author.icon_url.as_deref(),
            Some("https://images.evetech.net/alliances/3001/logo?size=64")
        );
    }
}
