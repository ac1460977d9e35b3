//! Entity name lookups for rendering

use crate::esi::{EsiClient, FetchError};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use structwatch_common::config::CacheConfig;
use structwatch_common::types::EveId;
use tracing::debug;

/// Category of a named entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Alliance,
    Corporation,
    Character,
    Faction,
    #[serde(other)]
    Other,
}

/// A named character, corporation or alliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EveEntity {
    pub id: EveId,
    pub name: String,
    pub category: EntityCategory,
}

/// Solar system with the names of its constellation and region
#[derive(Debug, Clone, PartialEq)]
pub struct SolarSystem {
    pub id: EveId,
    pub name: String,
    pub constellation_name: String,
    pub region_name: String,
}

/// Item type with its group name
#[derive(Debug, Clone, PartialEq)]
pub struct EveType {
    pub id: EveId,
    pub name: String,
    pub group_name: String,
}

/// Resolves IDs to names. `Ok(None)` means the ID does not exist.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn entity(&self, id: EveId) -> Result<Option<EveEntity>, FetchError>;
    async fn solar_system(&self, id: EveId) -> Result<Option<SolarSystem>, FetchError>;
    async fn type_info(&self, id: EveId) -> Result<Option<EveType>, FetchError>;
    async fn moon(&self, id: EveId) -> Result<Option<String>, FetchError>;
    async fn planet(&self, id: EveId) -> Result<Option<String>, FetchError>;
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct SystemInfo {
    name: String,
    constellation_id: EveId,
}

#[derive(Deserialize)]
struct ConstellationInfo {
    name: String,
    region_id: EveId,
}

#[derive(Deserialize)]
struct TypeInfo {
    name: String,
    group_id: EveId,
}

/// Resolver backed by the public universe endpoints
pub struct EsiEntityResolver {
    client: Arc<EsiClient>,
}

impl EsiEntityResolver {
    pub fn new(client: Arc<EsiClient>) -> Self {
        Self { client }
    }

    async fn named(&self, path: String) -> Result<Option<String>, FetchError> {
        let named: Option<Named> = not_found_as_none(self.client.fetch(&path, &[], None).await)?;
        Ok(named.map(|n| n.name))
    }
}

/// Map a 404 to `None`
fn not_found_as_none<T>(result: Result<T, FetchError>) -> Result<Option<T>, FetchError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(FetchError::Permanent { status: 404, .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl EntityResolver for EsiEntityResolver {
    async fn entity(&self, id: EveId) -> Result<Option<EveEntity>, FetchError> {
        let entities: Option<Vec<EveEntity>> =
            not_found_as_none(self.client.post("/universe/names/", &[id], None).await)?;
        Ok(entities.and_then(|list| list.into_iter().find(|e| e.id == id)))
    }

    async fn solar_system(&self, id: EveId) -> Result<Option<SolarSystem>, FetchError> {
        let system: Option<SystemInfo> = not_found_as_none(
            self.client
                .fetch(&format!("/universe/systems/{}/", id), &[], None)
                .await,
        )?;
        let Some(system) = system else {
            return Ok(None);
        };

        let constellation: ConstellationInfo = self
            .client
            .fetch(
                &format!("/universe/constellations/{}/", system.constellation_id),
                &[],
                None,
            )
            .await?;
        let region = self
            .named(format!("/universe/regions/{}/", constellation.region_id))
            .await?
            .unwrap_or_default();

        Ok(Some(SolarSystem {
            id,
            name: system.name,
            constellation_name: constellation.name,
            region_name: region,
        }))
    }

    async fn type_info(&self, id: EveId) -> Result<Option<EveType>, FetchError> {
        let info: Option<TypeInfo> = not_found_as_none(
            self.client
                .fetch(&format!("/universe/types/{}/", id), &[], None)
                .await,
        )?;
        let Some(info) = info else {
            return Ok(None);
        };
        let group_name = self
            .named(format!("/universe/groups/{}/", info.group_id))
            .await?
            .unwrap_or_default();
        Ok(Some(EveType {
            id,
            name: info.name,
            group_name,
        }))
    }

    async fn moon(&self, id: EveId) -> Result<Option<String>, FetchError> {
        self.named(format!("/universe/moons/{}/", id)).await
    }

    async fn planet(&self, id: EveId) -> Result<Option<String>, FetchError> {
        self.named(format!("/universe/planets/{}/", id)).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LookupKind {
    Entity,
    SolarSystem,
    Type,
    Moon,
    Planet,
}

#[derive(Clone)]
enum Cached {
    Entity(EveEntity),
    SolarSystem(SolarSystem),
    Type(EveType),
    Name(String),
}

/// Bounded TTL cache in front of another resolver.
///
/// Only found entities are cached, so IDs that did not resolve are looked
/// up again on the next render.
pub struct CachedResolver<R> {
    inner: R,
    cache: Cache<(LookupKind, EveId), Cached>,
}

impl<R: EntityResolver> CachedResolver<R> {
    pub fn new(inner: R, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();
        Self { inner, cache }
    }

    /// Forget every cached lookup of an ID
    pub async fn invalidate(&self, id: EveId) {
        for kind in [
            LookupKind::Entity,
            LookupKind::SolarSystem,
            LookupKind::Type,
            LookupKind::Moon,
            LookupKind::Planet,
        ] {
            self.cache.invalidate(&(kind, id)).await;
        }
    }

    pub fn invalidate_all(&self) {
        debug!("Invalidating entity name cache");
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl<R: EntityResolver> EntityResolver for CachedResolver<R> {
    async fn entity(&self, id: EveId) -> Result<Option<EveEntity>, FetchError> {
        if let Some(Cached::Entity(entity)) = self.cache.get(&(LookupKind::Entity, id)).await {
            return Ok(Some(entity));
        }
        let found = self.inner.entity(id).await?;
        if let Some(entity) = &found {
            self.cache
                .insert((LookupKind::Entity, id), Cached::Entity(entity.clone()))
                .await;
        }
        Ok(found)
    }

    async fn solar_system(&self, id: EveId) -> Result<Option<SolarSystem>, FetchError> {
        let key = (LookupKind::SolarSystem, id);
        if let Some(Cached::SolarSystem(system)) = self.cache.get(&key).await {
            return Ok(Some(system));
        }
        let found = self.inner.solar_system(id).await?;
        if let Some(system) = &found {
            self.cache
                .insert(key, Cached::SolarSystem(system.clone()))
                .await;
        }
        Ok(found)
    }

    async fn type_info(&self, id: EveId) -> Result<Option<EveType>, FetchError> {
        let key = (LookupKind::Type, id);
        if let Some(Cached::Type(eve_type)) = self.cache.get(&key).await {
            return Ok(Some(eve_type));
        }
        let found = self.inner.type_info(id).await?;
        if let Some(eve_type) = &found {
            self.cache.insert(key, Cached::Type(eve_type.clone())).await;
        }
        Ok(found)
    }

    async fn moon(&self, id: EveId) -> Result<Option<String>, FetchError> {
        let key = (LookupKind::Moon, id);
        if let Some(Cached::Name(name)) = self.cache.get(&key).await {
            return Ok(Some(name));
        }
        let found = self.inner.moon(id).await?;
        if let Some(name) = &found {
            self.cache.insert(key, Cached::Name(name.clone())).await;
        }
        Ok(found)
    }

    async fn planet(&self, id: EveId) -> Result<Option<String>, FetchError> {
        let key = (LookupKind::Planet, id);
        if let Some(Cached::Name(name)) = self.cache.get(&key).await {
            return Ok(Some(name));
        }
        let found = self.inner.planet(id).await?;
        if let Some(name) = &found {
            self.cache.insert(key, Cached::Name(name.clone())).await;
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MapResolver;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use structwatch_common::config::EsiConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cache_config() -> CacheConfig {
        CacheConfig {
            max_entries: 100,
            ttl_secs: 3600,
        }
    }

    #[tokio::test]
    async fn test_cached_resolver_hits_inner_once() {
        let inner = MapResolver::default().with_entity(3001, "Wayne Enterprises", EntityCategory::Corporation);
        let calls = inner.calls();
        let resolver = CachedResolver::new(inner, &cache_config());

        for _ in 0..3 {
            let entity = resolver.entity(3001).await.unwrap().unwrap();
            assert_eq!(entity.name, "Wayne Enterprises");
        }
        assert_eq!(calls.get(), 1);

        resolver.invalidate(3001).await;
        resolver.entity(3001).await.unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_missing_entities_are_not_cached() {
        let inner = MapResolver::default();
        let calls = inner.calls();
        let resolver = CachedResolver::new(inner, &cache_config());

        assert!(resolver.entity(42).await.unwrap().is_none());
        assert!(resolver.entity(42).await.unwrap().is_none());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_esi_resolver_solar_system() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/universe/systems/30002537/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "Amamake", "constellation_id": 20000372})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/universe/constellations/20000372/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "Hed", "region_id": 10000030})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/universe/regions/10000030/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Heimatar"})))
            .mount(&server)
            .await;

        let config = EsiConfig {
            base_url: server.uri(),
            ..EsiConfig::default()
        };
        let resolver = EsiEntityResolver::new(Arc::new(EsiClient::new(&config).unwrap()));
        let system = resolver.solar_system(30002537).await.unwrap().unwrap();

        assert_eq!(
            system,
            SolarSystem {
                id: 30002537,
                name: "Amamake".to_string(),
                constellation_name: "Hed".to_string(),
                region_name: "Heimatar".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_esi_resolver_unknown_id_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/universe/moons/1/"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Moon not found"})))
            .mount(&server)
            .await;

        let config = EsiConfig {
            base_url: server.uri(),
            ..EsiConfig::default()
        };
        let resolver = EsiEntityResolver::new(Arc::new(EsiClient::new(&config).unwrap()));
        assert_eq!(resolver.moon(1).await.unwrap(), None);
    }
}
