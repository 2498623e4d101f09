use async_trait::async_trait;
use std::sync::Arc;

use super::fetch::column_at;
use super::{Applicator, Assignment};
use crate::context::{FetchRequest, MappingContext};
use crate::destination::Destination;
use crate::entity_metadata::{RelationKind, RelationMetadata, RelationshipMetadata};
use crate::fetchers::{FetcherFactory, ReverseKey};
use crate::mapper::Mapper;
use crate::schema::{Binding, FieldDef, FieldType, Slot};
use crate::source::Include;
use crate::types::RefractResult;
use crate::value::Row;

/// Projects the primary entity's key for a has-one or has-many navigation and
/// resolves the dependent rows later through a reverse fetcher.
///
/// Has-many navigations receive the whole group (the fetch-sequence case);
/// has-one navigations receive its first element, or keep their default when
/// the group is empty.
pub struct ReverseFetchApplicator<C> {
    assignment: Arc<Assignment<C>>,
    prefix: Vec<String>,
    references: String,
    foreign_key: String,
    many: bool,
    fetcher: ReverseKey,
    dependent: Arc<Mapper<C>>,
}

impl<C: Send + Sync + 'static> ReverseFetchApplicator<C> {
    pub(crate) fn new(
        assignment: Arc<Assignment<C>>,
        prefix: Vec<String>,
        declaring: String,
        relation: &RelationMetadata,
        dependent: Arc<Mapper<C>>,
    ) -> Self {
        Self {
            assignment,
            prefix,
            references: relation.references.clone(),
            foreign_key: relation.foreign_key.clone(),
            many: relation.kind == RelationKind::HasMany,
            fetcher: ReverseKey {
                entity: declaring,
                relation: relation.name.clone(),
                mapper: dependent.key().clone(),
            },
            dependent,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Applicator<C> for ReverseFetchApplicator<C> {
    fn name(&self) -> &str {
        self.assignment.item()
    }

    fn field(&self) -> FieldDef {
        FieldDef::new(self.name(), FieldType::Scalar)
    }

    fn describe(&self) -> String {
        let mut path = self.prefix.clone();
        path.push(self.references.clone());
        format!(
            "fetch {} by {}({})",
            self.dependent.key(),
            self.foreign_key,
            path.join(".")
        )
    }

    fn binding(&self) -> Binding<C> {
        let prefix = self.prefix.clone();
        let references = self.references.clone();
        Arc::new(move |row: &Row, _: &C| Ok(Slot::Value(column_at(row, &prefix, &references))))
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
        let key = slot.value();
        if key.is_null() {
            return Ok(());
        }
        let apply = if self.many {
            self.assignment.deferred(destination, cx.ambient())
        } else {
            self.assignment.deferred_first(destination, cx.ambient())
        };
        cx.enqueue(FetchRequest::reverse(self.name(), self.fetcher.clone(), key, apply)?);
        Ok(())
    }

    fn commit(
        &self,
        fetchers: &mut FetcherFactory<C>,
        _metadata: &dyn RelationshipMetadata,
    ) -> RefractResult<()> {
        fetchers.demand_reverse(self.fetcher.clone(), &self.foreign_key, &self.dependent)
    }
}
