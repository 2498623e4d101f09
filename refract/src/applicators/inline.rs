//! Inline applicators: related rows arrive with the owner and are projected in place.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Applicator, Assignment};
use crate::context::MappingContext;
use crate::destination::Destination;
use crate::item::SourceAccessor;
use crate::mapper::Mapper;
use crate::schema::{Binding, FieldDef, FieldType, Projection, Slot};
use crate::source::Include;
use crate::types::{RefractError, RefractResult};
use crate::value::{Row, Value};

/// Embeds a related entity through its mapper's projection.
///
/// A null navigation projects to an empty slot and assigns null, it never fails.
pub struct EntityApplicator<C> {
    assignment: Arc<Assignment<C>>,
    source: SourceAccessor<C>,
    mapper: Arc<Mapper<C>>,
    projection: Arc<Projection<C>>,
    includes: Vec<Include>,
}

impl<C: Send + Sync + 'static> EntityApplicator<C> {
    pub(crate) fn new(
        assignment: Arc<Assignment<C>>,
        source: SourceAccessor<C>,
        mapper: Arc<Mapper<C>>,
        projection: Arc<Projection<C>>,
        includes: Vec<Include>,
    ) -> Self {
        Self {
            assignment,
            source,
            mapper,
            projection,
            includes,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Applicator<C> for EntityApplicator<C> {
    fn name(&self) -> &str {
        self.assignment.item()
    }

    fn field(&self) -> FieldDef {
        FieldDef::new(self.name(), FieldType::Embedded(self.mapper.key().clone()))
    }

    fn describe(&self) -> String {
        format!("{} => {}", self.source, self.projection)
    }

    fn binding(&self) -> Binding<C> {
        let item = self.name().to_string();
        let source = self.source.clone();
        let projection = self.projection.clone();
        Arc::new(move |row: &Row, ambient: &C| match source.evaluate(row, ambient)? {
            Value::Null => Ok(Slot::Embedded(None)),
            Value::Row(related) => Ok(Slot::Embedded(Some(Box::new(
                projection.apply(&related, ambient)?,
            )))),
            other => Err(RefractError::projection(
                item.clone(),
                format!("expected a row, found {}", other.type_name()),
            )),
        })
    }

    fn includes(&self) -> Vec<Include> {
        self.includes.clone()
    }

    async fn copy_to_destination(
        &self,
        slot: &Slot,
        destination: &Destination,
        cx: &MappingContext<C>,
    ) -> RefractResult<()> {
        let value = match slot {
            Slot::Embedded(Some(transient)) => {
                Value::Object(self.mapper.map_transient(transient, cx).await?)
            }
            Slot::Embedded(None) => Value::Null,
            _ => {
                return Err(RefractError::projection(self.name(), "expected an embedded slot"));
            }
        };
        self.assignment
            .assign(value, destination, cx.ambient().clone())
            .await
    }
}

/// Embeds a related collection, projecting every element through its mapper
pub struct SequenceApplicator<C> {
    assignment: Arc<Assignment<C>>,
    source: SourceAccessor<C>,
    mapper: Arc<Mapper<C>>,
    projection: Arc<Projection<C>>,
    includes: Vec<Include>,
}

impl<C: Send + Sync + 'static> SequenceApplicator<C> {
    pub(crate) fn new(
        assignment: Arc<Assignment<C>>,
        source: SourceAccessor<C>,
        mapper: Arc<Mapper<C>>,
        projection: Arc<Projection<C>>,
        includes: Vec<Include>,
    ) -> Self {
        Self {
            assignment,
            source,
            mapper,
            projection,
            includes,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Applicator<C> for SequenceApplicator<C> {
    fn name(&self) -> &str {
        self.assignment.item()
    }

    fn field(&self) -> FieldDef {
        FieldDef::new(self.name(), FieldType::Sequence(self.mapper.key().clone()))
    }

    fn describe(&self) -> String {
        format!("{}.map({})", self.source, self.projection)
    }

    fn binding(&self) -> Binding<C> {
        let item = self.name().to_string();
        let source = self.source.clone();
        let projection = self.projection.clone();
        Arc::new(move |row: &Row, ambient: &C| match source.evaluate(row, ambient)? {
            Value::Null => Ok(Slot::Sequence(None)),
            Value::List(elements) => {
                let transients = elements
                    .iter()
                    .map(|element| match element {
                        Value::Row(related) => projection.apply(related, ambient),
                        other => Err(RefractError::projection(
                            item.clone(),
                            format!("expected a row element, found {}", other.type_name()),
                        )),
                    })
                    .collect::<RefractResult<Vec<_>>>()?;
                Ok(Slot::Sequence(Some(transients)))
            }
            other => Err(RefractError::projection(
                item.clone(),
                format!("expected a list of rows, found {}", other.type_name()),
            )),
        })
    }

    fn includes(&self) -> Vec<Include> {
        self.includes.clone()
    }

    async fn copy_to_destination(
        &self,
        slot: &Slot,
        destination: &Destination,
        cx: &MappingContext<C>,
    ) -> RefractResult<()> {
        let transients = match slot {
            Slot::Sequence(Some(transients)) => transients,
            // a null collection keeps the destination's empty list
            Slot::Sequence(None) => return Ok(()),
            _ => {
                return Err(RefractError::projection(self.name(), "expected a sequence slot"));
            }
        };
        let mut objects = Vec::with_capacity(transients.len());
        for transient in transients {
            objects.push(Value::Object(self.mapper.map_transient(transient, cx).await?));
        }
        self.assignment
            .assign(Value::List(objects), destination, cx.ambient().clone())
            .await
    }
}
