//! Fetchers resolve deferred relationships, one query per request group.
//!
//! The factory creates fetchers while applicators commit and caches them by
//! identity, so every item that points at the same relationship shares one
//! fetcher and therefore one query per wave.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::context::MappingContext;
use crate::destination::Destination;
use crate::entity_metadata::RelationshipMetadata;
use crate::key_types::RefractKey;
use crate::mapper::{Mapper, MapperKey};
use crate::source::Query;
use crate::types::{ApplyFn, RefractError, RefractResult};
use crate::value::Value;

/// A keyed fetch request waiting for its value
pub(crate) struct KeyedRequest {
    pub(crate) key: RefractKey,
    pub(crate) apply: ApplyFn,
}

/// Identity of a reverse fetcher: a navigation on the primary entity plus the
/// mapper used for the dependent rows
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReverseKey {
    pub entity: String,
    pub relation: String,
    pub mapper: MapperKey,
}

impl fmt::Display for ReverseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} via {}", self.entity, self.relation, self.mapper)
    }
}

fn distinct_keys(requests: &[KeyedRequest]) -> Vec<RefractKey> {
    let mut seen = HashSet::new();
    requests
        .iter()
        .filter(|request| seen.insert(request.key.clone()))
        .map(|request| request.key.clone())
        .collect()
}

/// Loads entities by primary key and maps them through their own mapper
pub struct EntityFetcher<C> {
    mapper: Arc<Mapper<C>>,
    key_column: String,
}

impl<C: Send + Sync + 'static> EntityFetcher<C> {
    pub fn mapper(&self) -> &MapperKey {
        self.mapper.key()
    }

    pub(crate) async fn apply(
        &self,
        requests: Vec<KeyedRequest>,
        cx: &MappingContext<C>,
    ) -> RefractResult<()> {
        let ids = distinct_keys(&requests);
        log::debug!(
            "refract: fetching {} {} for {} requests",
            ids.len(),
            self.mapper.key(),
            requests.len()
        );
        let query = Query::all(&self.mapper.key().source).filter_in(&self.key_column, ids);
        let mapped = self.mapper.materialize(query, cx).await?;

        let mut found: HashMap<RefractKey, Destination> = HashMap::with_capacity(mapped.len());
        for (transient, destination) in mapped {
            if let Some(key) = self.mapper.primary_key_of(&transient) {
                found.entry(key).or_insert(destination);
            }
        }

        // a key without a row still gets its callback, with null
        for request in requests {
            let value = found
                .get(&request.key)
                .map(|destination| Value::Object(destination.clone()))
                .unwrap_or(Value::Null);
            (request.apply)(value).await?;
        }
        Ok(())
    }
}

/// Loads dependent rows by foreign key and delivers them grouped per primary key
pub struct ReverseFetcher<C> {
    mapper: Arc<Mapper<C>>,
    foreign_key: String,
    carrier: usize,
}

impl<C: Send + Sync + 'static> ReverseFetcher<C> {
    pub fn mapper(&self) -> &MapperKey {
        self.mapper.key()
    }

    /// Every request receives exactly one list, empty when nothing matched.
    pub(crate) async fn apply(
        &self,
        requests: Vec<KeyedRequest>,
        cx: &MappingContext<C>,
    ) -> RefractResult<()> {
        let keys = distinct_keys(&requests);
        log::debug!(
            "refract: fetching {} by {} for {} keys",
            self.mapper.key(),
            self.foreign_key,
            keys.len()
        );
        let query = Query::all(&self.mapper.key().source).filter_in(&self.foreign_key, keys);
        let mapped = self.mapper.materialize(query, cx).await?;

        let mut grouped: HashMap<RefractKey, Vec<Value>> = HashMap::new();
        for (transient, destination) in mapped {
            if let Some(key) = transient.value(self.carrier).as_key() {
                grouped
                    .entry(key)
                    .or_default()
                    .push(Value::Object(destination));
            }
        }

        for request in requests {
            let group = grouped.get(&request.key).cloned().unwrap_or_default();
            (request.apply)(Value::List(group)).await?;
        }
        Ok(())
    }
}

/// Creates and caches fetchers by identity
pub struct FetcherFactory<C> {
    entity: HashMap<MapperKey, EntityFetcher<C>>,
    reverse: HashMap<ReverseKey, ReverseFetcher<C>>,
}

impl<C: Send + Sync + 'static> FetcherFactory<C> {
    pub(crate) fn new() -> Self {
        Self {
            entity: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    /// Make sure an entity fetcher exists for `mapper`
    pub(crate) fn demand_entity(
        &mut self,
        mapper: &Arc<Mapper<C>>,
        metadata: &dyn RelationshipMetadata,
    ) -> RefractResult<()> {
        if self.entity.contains_key(mapper.key()) {
            return Ok(());
        }
        let entity = metadata.require_entity(&mapper.key().source)?;
        let key_column = entity.single_primary_key()?.to_string();
        log::debug!("refract: entity fetcher for {} by {}", mapper.key(), key_column);
        self.entity.insert(
            mapper.key().clone(),
            EntityFetcher {
                mapper: mapper.clone(),
                key_column,
            },
        );
        Ok(())
    }

    /// Make sure a reverse fetcher exists for a navigation and dependent mapper
    pub(crate) fn demand_reverse(
        &mut self,
        key: ReverseKey,
        foreign_key: &str,
        mapper: &Arc<Mapper<C>>,
    ) -> RefractResult<()> {
        if self.reverse.contains_key(&key) {
            return Ok(());
        }
        let carrier = mapper.carrier(foreign_key)?;
        log::debug!("refract: reverse fetcher for {} by {}", key, foreign_key);
        self.reverse.insert(
            key,
            ReverseFetcher {
                mapper: mapper.clone(),
                foreign_key: foreign_key.to_string(),
                carrier,
            },
        );
        Ok(())
    }

    pub fn entity(&self, key: &MapperKey) -> RefractResult<&EntityFetcher<C>> {
        self.entity
            .get(key)
            .ok_or_else(|| RefractError::FetcherMissing {
                fetcher: key.to_string(),
            })
    }

    pub fn reverse(&self, key: &ReverseKey) -> RefractResult<&ReverseFetcher<C>> {
        self.reverse
            .get(key)
            .ok_or_else(|| RefractError::FetcherMissing {
                fetcher: key.to_string(),
            })
    }

    pub fn entity_fetchers(&self) -> usize {
        self.entity.len()
    }

    pub fn reverse_fetchers(&self) -> usize {
        self.reverse.len()
    }
}
