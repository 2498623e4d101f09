use async_trait::async_trait;
use std::sync::Arc;

use super::{Applicator, Assignment};
use crate::context::MappingContext;
use crate::destination::Destination;
use crate::item::SourceAccessor;
use crate::schema::{Binding, FieldDef, FieldType, Slot};
use crate::source::Include;
use crate::types::RefractResult;
use crate::value::Row;

/// Copies the source value straight through
pub struct DefaultApplicator<C> {
    assignment: Arc<Assignment<C>>,
    source: SourceAccessor<C>,
    includes: Vec<Include>,
}

impl<C: Send + Sync + 'static> DefaultApplicator<C> {
    pub(crate) fn new(
        assignment: Arc<Assignment<C>>,
        source: SourceAccessor<C>,
        includes: Vec<Include>,
    ) -> Self {
        Self {
            assignment,
            source,
            includes,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Applicator<C> for DefaultApplicator<C> {
    fn name(&self) -> &str {
        self.assignment.item()
    }

    fn field(&self) -> FieldDef {
        FieldDef::new(self.name(), FieldType::Scalar)
    }

    fn describe(&self) -> String {
        self.source.to_string()
    }

    fn binding(&self) -> Binding<C> {
        let source = self.source.clone();
        Arc::new(move |row: &Row, ambient: &C| Ok(Slot::Value(source.evaluate(row, ambient)?)))
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
        self.assignment
            .assign(slot.value().clone(), destination, cx.ambient().clone())
            .await
    }
}
