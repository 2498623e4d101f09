//! Applicators: per-item strategies deciding how a destination field is filled.
//!
//! An applicator is chosen once per item when its mapper commits. It declares
//! the item's transient field, provides the binding that fills that field from
//! a source row, and later copies the transient value into the destination,
//! either directly or by queueing a fetch request.

mod batch;
mod default;
mod fetch;
mod inline;
mod reverse;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::MappingContext;
use crate::destination::Destination;
use crate::entity_metadata::{EntityMetadata, RelationKind, RelationshipMetadata};
use crate::fetchers::FetcherFactory;
use crate::item::{DestinationShape, MapperItem, RelationshipStyle, SourceShape};
use crate::mapper::{Mapper, MapperKey};
use crate::schema::{Binding, FieldDef, Slot};
use crate::source::Include;
use crate::types::{ApplyFn, BoxFuture, RefractError, RefractResult, Transposer};
use crate::value::Value;

pub use self::batch::BatchApplicator;
pub use self::default::DefaultApplicator;
pub use self::fetch::FetchEntityApplicator;
pub use self::inline::{EntityApplicator, SequenceApplicator};
pub use self::reverse::ReverseFetchApplicator;

/// Strategy for one mapping item
#[async_trait]
pub trait Applicator<C>: Send + Sync {
    /// Intermediate field name of the item
    fn name(&self) -> &str;

    /// Transient field backing this item
    fn field(&self) -> FieldDef;

    /// Human-readable binding, used in projection descriptions
    fn describe(&self) -> String;

    /// Fill the transient field from a source row
    fn binding(&self) -> Binding<C>;

    /// Navigations the owning mapper must load with its rows
    fn includes(&self) -> Vec<Include> {
        Vec::new()
    }

    /// Copy the projected slot into the destination, or queue the fetch that will
    async fn copy_to_destination(
        &self,
        slot: &Slot,
        destination: &Destination,
        cx: &MappingContext<C>,
    ) -> RefractResult<()>;

    /// One-time hook run after every mapper has committed
    fn commit(
        &self,
        _fetchers: &mut FetcherFactory<C>,
        _metadata: &dyn RelationshipMetadata,
    ) -> RefractResult<()> {
        Ok(())
    }
}

/// Transposes a value and stores it in the destination field, with error context
pub(crate) struct Assignment<C> {
    item: String,
    field: String,
    expected: DestinationShape,
    transposer: Option<Transposer<C>>,
}

impl<C: Send + Sync + 'static> Assignment<C> {
    pub(crate) fn new(item: &MapperItem<C>) -> Arc<Self> {
        Arc::new(Self {
            item: item.name.clone(),
            field: item.destination.clone(),
            expected: item.expected.clone(),
            transposer: item.transposer.clone(),
        })
    }

    pub(crate) fn item(&self) -> &str {
        &self.item
    }

    pub(crate) async fn assign(
        &self,
        value: Value,
        destination: &Destination,
        ambient: Arc<C>,
    ) -> RefractResult<()> {
        let value_type = value.type_name();
        let value = match &self.transposer {
            Some(transposer) => {
                transposer(value, ambient)
                    .await
                    .map_err(|cause| RefractError::Transpose {
                        item: self.item.clone(),
                        value_type: value_type.clone(),
                        field: self.field.clone(),
                        expected: self.expected.to_string(),
                        cause: Box::new(cause),
                    })?
            }
            None => value,
        };
        if !self.expected.accepts(&value) {
            return Err(RefractError::Assignment {
                item: self.item.clone(),
                value_type: value.type_name(),
                field: self.field.clone(),
                expected: self.expected.to_string(),
            });
        }
        destination.set(self.field.clone(), value);
        Ok(())
    }

    /// Callback assigning whatever value a fetch resolves to
    pub(crate) fn deferred(
        self: &Arc<Self>,
        destination: &Destination,
        ambient: &Arc<C>,
    ) -> ApplyFn {
        let assignment = self.clone();
        let destination = destination.clone();
        let ambient = ambient.clone();
        Box::new(move |value: Value| -> BoxFuture<'static, RefractResult<()>> {
            Box::pin(async move { assignment.assign(value, &destination, ambient).await })
        })
    }

    /// Callback assigning the first element of a fetched list; an empty list assigns nothing
    pub(crate) fn deferred_first(
        self: &Arc<Self>,
        destination: &Destination,
        ambient: &Arc<C>,
    ) -> ApplyFn {
        let assignment = self.clone();
        let destination = destination.clone();
        let ambient = ambient.clone();
        Box::new(move |value: Value| -> BoxFuture<'static, RefractResult<()>> {
            Box::pin(async move {
                let first = match value {
                    Value::List(values) => values.into_iter().next(),
                    Value::Null => None,
                    other => Some(other),
                };
                match first {
                    Some(value) => assignment.assign(value, &destination, ambient).await,
                    None => Ok(()),
                }
            })
        })
    }
}

/// Entity declaring the last segment of a navigation path
fn declaring_entity<'m>(
    metadata: &'m dyn RelationshipMetadata,
    root: &str,
    prefix: &[String],
) -> RefractResult<&'m EntityMetadata> {
    let mut current = metadata.require_entity(root)?;
    for segment in prefix {
        let relation = current.require_relation(segment)?;
        current = metadata.require_entity(&relation.target)?;
    }
    Ok(current)
}

/// Includes needed to evaluate a path accessor that ends in a column or an unmapped navigation
fn path_includes(segments: &[String], shape: &SourceShape) -> Vec<Include> {
    match (shape, segments.split_last()) {
        (SourceShape::Scalar, Some((_, prefix))) => Include::path(prefix, Vec::new()),
        (SourceShape::Scalar, None) => Vec::new(),
        _ => Include::path(segments, Vec::new()),
    }
}

/// Choose the applicator for an item from its source shape, destination shape and style
pub(crate) fn select<C: Send + Sync + 'static>(
    item: &MapperItem<C>,
    owner: &MapperKey,
    mappers: &HashMap<MapperKey, Arc<Mapper<C>>>,
    metadata: &dyn RelationshipMetadata,
) -> RefractResult<Box<dyn Applicator<C>>> {
    let assignment = Assignment::new(item);

    if item.style == RelationshipStyle::Batch {
        let processor = item.batch.clone().ok_or_else(|| {
            RefractError::invalid_configuration(
                format!("{}.{}", owner, item.destination),
                "batch style without a processor",
            )
        })?;
        let includes = item
            .source
            .segments()
            .map(|segments| path_includes(segments, &item.source_shape))
            .unwrap_or_default();
        return Ok(Box::new(BatchApplicator::new(
            assignment,
            item.source.clone(),
            processor,
            includes,
        )));
    }

    let Some(dependency_key) = item.dependency() else {
        let includes = item
            .source
            .segments()
            .map(|segments| path_includes(segments, &item.source_shape))
            .unwrap_or_default();
        return Ok(Box::new(DefaultApplicator::new(
            assignment,
            item.source.clone(),
            includes,
        )));
    };
    let dependency = mappers
        .get(&dependency_key)
        .ok_or_else(|| RefractError::MapperNotFound {
            mapper: dependency_key.to_string(),
        })?;

    if item.style == RelationshipStyle::Fetch {
        let component = format!("{}.{}", owner, item.destination);
        let segments = item
            .source
            .segments()
            .filter(|segments| !segments.is_empty())
            .ok_or_else(|| {
                RefractError::invalid_configuration(
                    component.clone(),
                    "fetch style needs a navigation path",
                )
            })?;
        let Some((navigation, prefix)) = segments.split_last() else {
            return Err(RefractError::invalid_configuration(component, "empty navigation path"));
        };
        let declaring = declaring_entity(metadata, &owner.source, prefix)?;
        let relation = declaring.require_relation(navigation)?;

        let applicator: Box<dyn Applicator<C>> = match relation.kind {
            RelationKind::BelongsTo => {
                let target = metadata.require_entity(&relation.target)?;
                if target.single_primary_key()? != relation.references {
                    return Err(RefractError::invalid_configuration(
                        component,
                        "fetched navigations must reference the target's primary key",
                    ));
                }
                Box::new(FetchEntityApplicator::new(
                    assignment,
                    prefix.to_vec(),
                    relation.foreign_key.clone(),
                    dependency.clone(),
                ))
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                Box::new(ReverseFetchApplicator::new(
                    assignment,
                    prefix.to_vec(),
                    declaring.name.clone(),
                    relation,
                    dependency.clone(),
                ))
            }
        };
        return Ok(applicator);
    }

    let projection = dependency.projection()?;
    let nested = dependency.includes()?.to_vec();
    let includes = match item.source.segments() {
        Some(segments) => Include::path(segments, nested),
        None => Vec::new(),
    };
    let applicator: Box<dyn Applicator<C>> = match item.destination_shape {
        DestinationShape::List(_) => Box::new(SequenceApplicator::new(
            assignment,
            item.source.clone(),
            dependency.clone(),
            projection,
            includes,
        )),
        _ => Box::new(EntityApplicator::new(
            assignment,
            item.source.clone(),
            dependency.clone(),
            projection,
            includes,
        )),
    };
    Ok(applicator)
}
