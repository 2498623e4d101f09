use async_trait::async_trait;
use std::sync::Arc;

use super::{Applicator, Assignment};
use crate::batch::BatchProcessor;
use crate::context::{FetchRequest, MappingContext};
use crate::destination::Destination;
use crate::item::SourceAccessor;
use crate::schema::{Binding, FieldDef, FieldType, Slot};
use crate::source::Include;
use crate::types::RefractResult;
use crate::value::Row;

/// Projects a key (or list of keys) and hands it to a user batch processor
pub struct BatchApplicator<C> {
    assignment: Arc<Assignment<C>>,
    source: SourceAccessor<C>,
    processor: Arc<dyn BatchProcessor<C>>,
    includes: Vec<Include>,
}

impl<C: Send + Sync + 'static> BatchApplicator<C> {
    pub(crate) fn new(
        assignment: Arc<Assignment<C>>,
        source: SourceAccessor<C>,
        processor: Arc<dyn BatchProcessor<C>>,
        includes: Vec<Include>,
    ) -> Self {
        Self {
            assignment,
            source,
            processor,
            includes,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Applicator<C> for BatchApplicator<C> {
    fn name(&self) -> &str {
        self.assignment.item()
    }

    fn field(&self) -> FieldDef {
        FieldDef::new(self.name(), FieldType::Scalar)
    }

    fn describe(&self) -> String {
        format!("batch {}({})", self.processor.name(), self.source)
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
        let key = slot.value();
        if key.is_null() {
            return Ok(());
        }
        let request = FetchRequest::batch(
            self.name(),
            self.processor.clone(),
            key.clone(),
            self.assignment.deferred(destination, cx.ambient()),
        )?;
        cx.enqueue(request);
        Ok(())
    }
}
