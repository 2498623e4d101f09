//! Mappers: one per (source entity, destination type) pair.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::applicators::{self, Applicator};
use crate::context::MappingContext;
use crate::destination::Destination;
use crate::entity_metadata::RelationshipMetadata;
use crate::fetchers::FetcherFactory;
use crate::item::MapperItem;
use crate::key_types::RefractKey;
use crate::schema::{carrier_name, FieldDef, FieldType, Projection, Slot, Transient};
use crate::source::{merge_include, Include, Query};
use crate::types::{AfterHook, BoxFuture, RefractError, RefractResult};
use crate::value::{Row, Value};

/// Identity of a mapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapperKey {
    pub source: String,
    pub destination: String,
}

impl MapperKey {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for MapperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Everything a mapper derives when it is committed
pub(crate) struct Committed<C> {
    projection: Arc<Projection<C>>,
    primary_key: Vec<usize>,
    carriers: HashMap<String, usize>,
    applicators: Vec<(usize, Box<dyn Applicator<C>>)>,
    includes: Vec<Include>,
    defaults: Vec<(String, Value)>,
}

/// Maps rows of one source entity into destination objects of one type
pub struct Mapper<C> {
    key: MapperKey,
    items: Vec<MapperItem<C>>,
    after: Vec<AfterHook<C>>,
    committed: OnceCell<Committed<C>>,
}

fn carrier_binding<C: 'static>(column: &str) -> crate::schema::Binding<C> {
    let column = column.to_string();
    Arc::new(move |row: &Row, _: &C| Ok(Slot::Value(row.value(&column).clone())))
}

impl<C: Send + Sync + 'static> Mapper<C> {
    pub(crate) fn new(
        key: MapperKey,
        items: Vec<MapperItem<C>>,
        after: Vec<AfterHook<C>>,
    ) -> Self {
        Self {
            key,
            items,
            after,
            committed: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &MapperKey {
        &self.key
    }

    pub fn items(&self) -> &[MapperItem<C>] {
        &self.items
    }

    /// Mappers this one needs committed first, in item order
    pub fn dependencies(&self) -> Vec<MapperKey> {
        let mut dependencies = Vec::new();
        for dependency in self.items.iter().filter_map(MapperItem::dependency) {
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }
        dependencies
    }

    pub fn is_committed(&self) -> bool {
        self.committed.get().is_some()
    }

    pub(crate) fn committed(&self) -> RefractResult<&Committed<C>> {
        self.committed.get().ok_or_else(|| RefractError::NotCommitted {
            mapper: self.key.to_string(),
        })
    }

    /// Projection from a source row to this mapper's transient
    pub fn projection(&self) -> RefractResult<Arc<Projection<C>>> {
        Ok(self.committed()?.projection.clone())
    }

    /// Navigations this mapper needs loaded with its rows
    pub fn includes(&self) -> RefractResult<&[Include]> {
        Ok(&self.committed()?.includes)
    }

    /// Slot of the key carrier for `column`
    pub(crate) fn carrier(&self, column: &str) -> RefractResult<usize> {
        self.committed()?
            .carriers
            .get(column)
            .copied()
            .ok_or_else(|| {
                RefractError::invalid_configuration(
                    self.key.to_string(),
                    format!("'{}' is not a key column of {}", column, self.key.source),
                )
            })
    }

    /// Primary key carried by a transient of this mapper
    pub(crate) fn primary_key_of(&self, transient: &Transient) -> Option<RefractKey> {
        let committed = self.committed.get()?;
        let parts = committed
            .primary_key
            .iter()
            .map(|slot| transient.value(*slot).as_key())
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(RefractKey::composite(parts))
    }

    /// Lay out the transient schema and choose an applicator per item.
    ///
    /// Every mapper this one depends on must already be committed.
    pub(crate) fn commit(
        &self,
        mappers: &HashMap<MapperKey, Arc<Mapper<C>>>,
        metadata: &dyn RelationshipMetadata,
    ) -> RefractResult<()> {
        if self.is_committed() {
            return Err(RefractError::AlreadyCommitted {
                mapper: self.key.to_string(),
            });
        }
        let entity = metadata.require_entity(&self.key.source)?;
        let mut projection = Projection::new(self.key.clone());
        let mut primary_key = Vec::new();
        let mut carriers = HashMap::new();

        for column in &entity.primary_key {
            let slot = projection.bind(
                FieldDef::new(carrier_name(column), FieldType::Carrier),
                column.clone(),
                carrier_binding(column),
            )?;
            primary_key.push(slot);
            carriers.insert(column.clone(), slot);
        }
        for column in metadata.foreign_keys_on(&self.key.source)? {
            if carriers.contains_key(&column) {
                continue;
            }
            let slot = projection.bind(
                FieldDef::new(carrier_name(&column), FieldType::Carrier),
                column.clone(),
                carrier_binding(&column),
            )?;
            carriers.insert(column, slot);
        }

        let mut chosen = Vec::with_capacity(self.items.len());
        let mut includes = Vec::new();
        let mut defaults = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let applicator = applicators::select(item, &self.key, mappers, metadata)?;
            let slot = projection.bind(
                applicator.field(),
                applicator.describe(),
                applicator.binding(),
            )?;
            for include in applicator.includes() {
                merge_include(&mut includes, include);
            }
            defaults.push((item.destination.clone(), item.destination_shape.default_value()));
            chosen.push((slot, applicator));
        }

        log::debug!("refract: committed {}", projection);
        self.committed
            .set(Committed {
                projection: Arc::new(projection),
                primary_key,
                carriers,
                applicators: chosen,
                includes,
                defaults,
            })
            .map_err(|_| RefractError::AlreadyCommitted {
                mapper: self.key.to_string(),
            })
    }

    /// Commit hooks of every applicator, once all mappers are committed
    pub(crate) fn commit_applicators(
        &self,
        fetchers: &mut FetcherFactory<C>,
        metadata: &dyn RelationshipMetadata,
    ) -> RefractResult<()> {
        for (_, applicator) in &self.committed()?.applicators {
            applicator.commit(fetchers, metadata)?;
        }
        Ok(())
    }

    /// Run a query for this mapper's source entity and map every row.
    pub(crate) async fn materialize(
        &self,
        query: Query,
        cx: &MappingContext<C>,
    ) -> RefractResult<Vec<(Transient, Destination)>> {
        let committed = self.committed()?;
        let query = query.with_includes(&committed.includes);
        let rows = cx
            .query(&query)
            .await
            .map_err(|cause| RefractError::Query {
                projection: committed.projection.to_string(),
                cause: Box::new(cause),
            })?;

        let ambient = cx.ambient().clone();
        let transients = rows
            .iter()
            .map(|row| committed.projection.apply(row, &ambient))
            .collect::<RefractResult<Vec<_>>>()?;

        let mut mapped = Vec::with_capacity(transients.len());
        for transient in transients {
            let destination = self.map_transient(&transient, cx).await?;
            mapped.push((transient, destination));
        }
        Ok(mapped)
    }

    /// Turn one transient into a destination object.
    ///
    /// A destination already produced in this pass for the same primary key is
    /// returned as is, without running applicators or hooks again.
    pub(crate) fn map_transient<'a>(
        &'a self,
        transient: &'a Transient,
        cx: &'a MappingContext<C>,
    ) -> BoxFuture<'a, RefractResult<Destination>> {
        Box::pin(async move {
            let committed = self.committed()?;
            let key = self.primary_key_of(transient);
            if let Some(key) = &key {
                if let Some(existing) = cx.cached(&self.key, key) {
                    return Ok(existing);
                }
            }

            let destination = Destination::with_fields(
                self.key.destination.clone(),
                committed.defaults.iter().cloned(),
            );
            if let Some(key) = key {
                cx.remember(&self.key, key, &destination);
            }

            for (slot, applicator) in &committed.applicators {
                let slot = transient.slot(*slot).ok_or_else(|| {
                    RefractError::projection(
                        applicator.name(),
                        "transient has no slot for this item",
                    )
                })?;
                applicator.copy_to_destination(slot, &destination, cx).await?;
            }

            cx.defer_hooks(&destination, &self.after);
            Ok(destination)
        })
    }
}

impl<C> fmt::Debug for Mapper<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("key", &self.key)
            .field("items", &self.items)
            .field("committed", &self.committed.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_metadata::{EntityMetadata, MetadataRegistry};
    use crate::item::MapperBuilder;
    use crate::value::ScalarType;
    use std::collections::HashSet;

    fn customer_mapper(metadata: &MetadataRegistry) -> Mapper<()> {
        let key = MapperKey::new("Customer", "CustomerDto");
        let mut builder = MapperBuilder::<()>::new(key.clone());
        builder.field("name");
        let items = builder
            .items
            .into_iter()
            .map(|item| item.resolve(&key, metadata, &HashSet::new()))
            .collect::<RefractResult<Vec<_>>>()
            .unwrap();
        Mapper::new(key, items, Vec::new())
    }

    #[test]
    fn test_mapper_commits_exactly_once() {
        let metadata = MetadataRegistry::new().with(
            EntityMetadata::new("Customer")
                .key("id", ScalarType::Int)
                .column("name", ScalarType::String),
        );
        let mapper = customer_mapper(&metadata);

        assert!(!mapper.is_committed());
        assert!(matches!(mapper.projection(), Err(RefractError::NotCommitted { .. })));
        assert!(matches!(mapper.includes(), Err(RefractError::NotCommitted { .. })));

        mapper.commit(&HashMap::new(), &metadata).unwrap();
        assert!(mapper.is_committed());
        assert_eq!(
            mapper.projection().unwrap().to_string(),
            "Customer -> CustomerDto { __id: id, name: name }"
        );

        match mapper.commit(&HashMap::new(), &metadata) {
            Err(RefractError::AlreadyCommitted { mapper }) => {
                assert_eq!(mapper, "Customer -> CustomerDto")
            }
            other => panic!("expected a second commit to fail, got {:?}", other),
        }
    }
}
