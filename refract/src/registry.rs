//! The mapper registry: owns every mapper of an application and runs mapping passes.
//!
//! A registry is built once at startup. Building resolves every declared item
//! against the relationship metadata, rejects declaration cycles, and commits the
//! mappers in dependency order before any of them can be used.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::context::{MappingContext, PassStats};
use crate::destination::Destination;
use crate::entity_metadata::RelationshipMetadata;
use crate::fetchers::FetcherFactory;
use crate::graph;
use crate::item::MapperBuilder;
use crate::mapper::{Mapper, MapperKey};
use crate::source::{DataSource, Query};
use crate::types::{RefractError, RefractResult};

/// Registry-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum drain waves per mapping pass; `None` drains until no work is left
    pub wave_limit: Option<usize>,
    /// Reuse the destination already produced for a primary key within one pass
    pub cache_destinations: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            wave_limit: None,
            cache_destinations: true,
        }
    }
}

/// Result of one mapping pass
#[derive(Debug, Clone)]
pub struct Mapped {
    pub objects: Vec<Destination>,
    pub stats: PassStats,
}

impl Mapped {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn to_json(&self) -> RefractResult<serde_json::Value> {
        let objects = self
            .objects
            .iter()
            .map(Destination::to_json)
            .collect::<RefractResult<Vec<_>>>()?;
        Ok(serde_json::Value::Array(objects))
    }

    /// Deserialize every destination into `T`
    pub fn deserialize<T: DeserializeOwned>(&self) -> RefractResult<Vec<T>> {
        self.objects.iter().map(Destination::deserialize).collect()
    }
}

/// Every committed mapper of an application, looked up by (source, destination) pair
pub struct MapperRegistry<C> {
    metadata: Arc<dyn RelationshipMetadata>,
    config: RegistryConfig,
    mappers: HashMap<MapperKey, Arc<Mapper<C>>>,
    order: Vec<MapperKey>,
    fetchers: FetcherFactory<C>,
}

impl<C: Send + Sync + 'static> MapperRegistry<C> {
    pub fn builder(metadata: Arc<dyn RelationshipMetadata>) -> MapperRegistryBuilder<C> {
        MapperRegistryBuilder {
            metadata,
            config: RegistryConfig::default(),
            declared: Vec::new(),
        }
    }

    pub fn get(&self, source: &str, destination: &str) -> Option<&Arc<Mapper<C>>> {
        self.mappers.get(&MapperKey::new(source, destination))
    }

    pub fn mapper(&self, key: &MapperKey) -> RefractResult<&Arc<Mapper<C>>> {
        self.mappers
            .get(key)
            .ok_or_else(|| RefractError::MapperNotFound {
                mapper: key.to_string(),
            })
    }

    /// Mapper keys in the order they were committed
    pub fn commit_order(&self) -> &[MapperKey] {
        &self.order
    }

    pub fn fetchers(&self) -> &FetcherFactory<C> {
        &self.fetchers
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn metadata(&self) -> &dyn RelationshipMetadata {
        &*self.metadata
    }

    /// Map every row matched by `query` into `destination` objects.
    ///
    /// Returns once every deferred fetch and after hook of the pass has run.
    pub async fn map(
        &self,
        query: Query,
        destination: &str,
        source: Arc<dyn DataSource>,
        ambient: impl Into<Arc<C>>,
    ) -> RefractResult<Mapped> {
        let mapper = self.mapper(&MapperKey::new(&query.entity, destination))?;
        let cx = MappingContext::new(
            ambient.into(),
            source,
            self.metadata.clone(),
            self.config.clone(),
        );

        let roots = mapper.materialize(query, &cx).await?;
        cx.finish(&self.fetchers).await?;

        let stats = cx.stats();
        log::debug!(
            "refract: mapped {} {} in {} waves, {} loads",
            roots.len(),
            mapper.key(),
            stats.waves,
            stats.loads
        );
        Ok(Mapped {
            objects: roots.into_iter().map(|(_, destination)| destination).collect(),
            stats,
        })
    }

    /// [`MapperRegistry::map`] followed by deserialization into `T`
    pub async fn map_into<T: DeserializeOwned>(
        &self,
        query: Query,
        destination: &str,
        source: Arc<dyn DataSource>,
        ambient: impl Into<Arc<C>>,
    ) -> RefractResult<Vec<T>> {
        self.map(query, destination, source, ambient)
            .await?
            .deserialize()
    }
}

/// Collects mapper declarations; [`MapperRegistryBuilder::build`] validates and commits them
pub struct MapperRegistryBuilder<C> {
    metadata: Arc<dyn RelationshipMetadata>,
    config: RegistryConfig,
    declared: Vec<MapperBuilder<C>>,
}

impl<C: Send + Sync + 'static> MapperRegistryBuilder<C> {
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare the mapper from `source` rows to `destination` objects
    pub fn map<F>(mut self, source: &str, destination: &str, declare: F) -> Self
    where
        F: FnOnce(&mut MapperBuilder<C>),
    {
        let mut builder = MapperBuilder::new(MapperKey::new(source, destination));
        declare(&mut builder);
        self.declared.push(builder);
        self
    }

    pub fn build(self) -> RefractResult<MapperRegistry<C>> {
        let metadata = self.metadata;

        let mut registered = HashSet::with_capacity(self.declared.len());
        for declared in &self.declared {
            if !registered.insert(declared.key.clone()) {
                return Err(RefractError::DuplicateMapper {
                    mapper: declared.key.to_string(),
                });
            }
            metadata.require_entity(&declared.key.source)?;
        }

        let mut keys = Vec::with_capacity(self.declared.len());
        let mut mappers = HashMap::with_capacity(self.declared.len());
        for declared in self.declared {
            let MapperBuilder { key, items, after } = declared;
            let mut fields = HashSet::with_capacity(items.len());
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                if !fields.insert(item.destination_name().to_string()) {
                    return Err(RefractError::DuplicateField {
                        mapper: key.to_string(),
                        field: item.destination_name().to_string(),
                    });
                }
                resolved.push(item.resolve(&key, &*metadata, &registered)?);
            }
            keys.push(key.clone());
            mappers.insert(key.clone(), Arc::new(Mapper::new(key, resolved, after)));
        }

        let dependencies = |key: &MapperKey| {
            mappers
                .get(key)
                .map(|mapper| mapper.dependencies())
                .unwrap_or_default()
        };
        graph::detect_cycles(&keys, &dependencies).map_err(|path| RefractError::MapperCycle {
            path: path.iter().map(ToString::to_string).collect(),
        })?;
        let order = graph::sweep_sort(keys, &dependencies);

        for key in &order {
            log::info!("refract: committing {}", key);
            mappers[key].commit(&mappers, &*metadata)?;
        }

        let mut fetchers = FetcherFactory::new();
        for key in &order {
            mappers[key].commit_applicators(&mut fetchers, &*metadata)?;
        }
        log::debug!(
            "refract: registry ready with {} mappers, {} entity fetchers, {} reverse fetchers",
            order.len(),
            fetchers.entity_fetchers(),
            fetchers.reverse_fetchers()
        );

        Ok(MapperRegistry {
            metadata,
            config: self.config,
            mappers,
            order,
            fetchers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_metadata::{EntityMetadata, MetadataRegistry};
    use crate::value::ScalarType;

    fn metadata() -> Arc<dyn RelationshipMetadata> {
        Arc::new(
            MetadataRegistry::new()
                .with(
                    EntityMetadata::new("Order")
                        .key("id", ScalarType::Int)
                        .column("customer_id", ScalarType::Int)
                        .belongs_to("customer", "Customer", "customer_id", "id"),
                )
                .with(
                    EntityMetadata::new("Customer")
                        .key("id", ScalarType::Int)
                        .column("name", ScalarType::String)
                        .has_many("orders", "Order", "customer_id", "id"),
                ),
        )
    }

    #[test]
    fn test_dependencies_commit_first() {
        let registry = MapperRegistry::<()>::builder(metadata())
            .map("Order", "OrderDto", |m| {
                m.field("id");
                m.field("customer").mapped("CustomerDto");
            })
            .map("Customer", "CustomerDto", |m| {
                m.field("id");
                m.field("name");
            })
            .build()
            .unwrap();
        assert_eq!(
            registry.commit_order(),
            &[
                MapperKey::new("Customer", "CustomerDto"),
                MapperKey::new("Order", "OrderDto")
            ]
        );
        assert!(registry.get("Order", "OrderDto").unwrap().is_committed());
    }

    #[test]
    fn test_duplicate_mapper_is_rejected() {
        let result = MapperRegistry::<()>::builder(metadata())
            .map("Customer", "CustomerDto", |m| {
                m.field("id");
            })
            .map("Customer", "CustomerDto", |m| {
                m.field("name");
            })
            .build();
        assert!(matches!(result, Err(RefractError::DuplicateMapper { .. })));
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let result = MapperRegistry::<()>::builder(metadata())
            .map("Customer", "CustomerDto", |m| {
                m.field("name");
                m.field("name").from("id");
            })
            .build();
        match result {
            Err(RefractError::DuplicateField { field, .. }) => assert_eq!(field, "name"),
            other => panic!("expected a duplicate field error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_mutual_references_are_a_cycle() {
        let result = MapperRegistry::<()>::builder(metadata())
            .map("Order", "OrderDto", |m| {
                m.field("customer").mapped("CustomerDto").fetch();
            })
            .map("Customer", "CustomerDto", |m| {
                m.field("orders").mapped("OrderDto").fetch();
            })
            .build();
        match result {
            Err(RefractError::MapperCycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 3);
            }
            other => panic!("expected a cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: RegistryConfig = serde_json::from_str(r#"{"wave_limit": 4}"#).unwrap();
        assert_eq!(config.wave_limit, Some(4));
        assert!(config.cache_destinations);
    }
}
