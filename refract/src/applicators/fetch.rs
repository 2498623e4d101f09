use async_trait::async_trait;
use std::sync::Arc;

use super::{Applicator, Assignment};
use crate::context::{FetchRequest, MappingContext};
use crate::destination::Destination;
use crate::entity_metadata::RelationshipMetadata;
use crate::fetchers::FetcherFactory;
use crate::mapper::Mapper;
use crate::schema::{Binding, FieldDef, FieldType, Slot};
use crate::source::Include;
use crate::types::RefractResult;
use crate::value::{Row, Value};

/// Projects the foreign key of a belongs-to navigation and resolves the
/// related entity later through the target mapper's entity fetcher.
pub struct FetchEntityApplicator<C> {
    assignment: Arc<Assignment<C>>,
    prefix: Vec<String>,
    foreign_key: String,
    target: Arc<Mapper<C>>,
}

impl<C: Send + Sync + 'static> FetchEntityApplicator<C> {
    pub(crate) fn new(
        assignment: Arc<Assignment<C>>,
        prefix: Vec<String>,
        foreign_key: String,
        target: Arc<Mapper<C>>,
    ) -> Self {
        Self {
            assignment,
            prefix,
            foreign_key,
            target,
        }
    }
}

/// Read `column` on the row reached through `prefix`; null if the navigation is null
pub(super) fn column_at(row: &Row, prefix: &[String], column: &str) -> Value {
    if prefix.is_empty() {
        return row.value(column).clone();
    }
    match row.path(prefix) {
        Value::Row(declaring) => declaring.value(column).clone(),
        _ => Value::Null,
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Applicator<C> for FetchEntityApplicator<C> {
    fn name(&self) -> &str {
        self.assignment.item()
    }

    fn field(&self) -> FieldDef {
        FieldDef::new(self.name(), FieldType::Scalar)
    }

    fn describe(&self) -> String {
        let mut path = self.prefix.clone();
        path.push(self.foreign_key.clone());
        format!("fetch {}({})", self.target.key(), path.join("."))
    }

    fn binding(&self) -> Binding<C> {
        let prefix = self.prefix.clone();
        let foreign_key = self.foreign_key.clone();
        Arc::new(move |row: &Row, _: &C| Ok(Slot::Value(column_at(row, &prefix, &foreign_key))))
    }

    fn includes(&self) -> Vec<Include> {
        Include::path(&self.prefix, Vec::new())
    }

    async fn copy_to_destination(
        &self,
        slot: &Slot,
        destination: &Destination,
        cx: &MappingContext<C>,
    ) -> RefractResult<()> {
        let id = slot.value();
        if id.is_null() {
            return Ok(());
        }
        let request = FetchRequest::entity(
            self.name(),
            self.target.key().clone(),
            id,
            self.assignment.deferred(destination, cx.ambient()),
        )?;
        cx.enqueue(request);
        Ok(())
    }

    fn commit(
        &self,
        fetchers: &mut FetcherFactory<C>,
        metadata: &dyn RelationshipMetadata,
    ) -> RefractResult<()> {
        fetchers.demand_entity(&self.target, metadata)
    }
}
