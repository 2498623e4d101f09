use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{DataSource, KeyFilter};
use crate::entity_metadata::EntityMetadata;
use crate::types::{lock, RefractResult};
use crate::value::Row;

/// One call to [`MemorySource::load`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub entity: String,
    pub filter: Option<KeyFilter>,
}

/// In-memory rows keyed by entity name. Records every load it serves.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    log: Mutex<Vec<LoadRecord>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: impl Into<String>, row: Row) {
        lock(&self.tables).entry(entity.into()).or_default().push(row);
    }

    pub fn extend(&self, entity: impl Into<String>, rows: impl IntoIterator<Item = Row>) {
        lock(&self.tables)
            .entry(entity.into())
            .or_default()
            .extend(rows);
    }

    /// Every load served so far, oldest first
    pub fn loads(&self) -> Vec<LoadRecord> {
        lock(&self.log).clone()
    }

    /// Number of loads served for one entity
    pub fn loads_of(&self, entity: &str) -> usize {
        lock(&self.log)
            .iter()
            .filter(|record| record.entity == entity)
            .count()
    }

    pub fn clear_log(&self) {
        lock(&self.log).clear();
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn load(
        &self,
        entity: &EntityMetadata,
        filter: Option<&KeyFilter>,
    ) -> RefractResult<Vec<Row>> {
        lock(&self.log).push(LoadRecord {
            entity: entity.name.clone(),
            filter: filter.cloned(),
        });
        let tables = lock(&self.tables);
        let rows = tables
            .get(&entity.name)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filter.map(|f| f.matches(row)).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}
