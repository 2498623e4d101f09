//! Data sources: where source rows come from.
//!
//! A [`DataSource`] only knows how to load the rows of one entity, optionally
//! restricted to a set of key values. Navigation includes are resolved on top
//! of that by [`fetch`], one extra load per included relation.

pub mod database;
pub mod memory;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::entity_metadata::{EntityMetadata, RelationKind, RelationshipMetadata};
use crate::key_types::RefractKey;
use crate::types::{BoxFuture, RefractResult};
use crate::value::{Row, Value};

pub use database::DatabaseSource;
pub use memory::{LoadRecord, MemorySource};

/// Restrict a load to rows whose `column` is one of `keys`
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFilter {
    pub column: String,
    pub keys: Vec<RefractKey>,
}

impl KeyFilter {
    pub fn new(column: impl Into<String>, keys: Vec<RefractKey>) -> Self {
        Self {
            column: column.into(),
            keys,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.value(&self.column)
            .as_key()
            .map(|key| self.keys.contains(&key))
            .unwrap_or(false)
    }
}

/// A navigation to load alongside each row, with its own nested includes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub relation: String,
    pub nested: Vec<Include>,
}

impl Include {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            nested: Vec::new(),
        }
    }

    pub fn then(mut self, nested: Include) -> Self {
        merge_include(&mut self.nested, nested);
        self
    }

    /// Include chain following `segments`, ending in `nested`
    pub(crate) fn path(segments: &[String], nested: Vec<Include>) -> Vec<Include> {
        match segments.split_first() {
            None => nested,
            Some((first, rest)) => vec![Include {
                relation: first.clone(),
                nested: Include::path(rest, nested),
            }],
        }
    }
}

/// Merge an include into a list, combining nested includes of the same relation
pub(crate) fn merge_include(into: &mut Vec<Include>, include: Include) {
    match into.iter_mut().find(|existing| existing.relation == include.relation) {
        Some(existing) => {
            for nested in include.nested {
                merge_include(&mut existing.nested, nested);
            }
        }
        None => into.push(include),
    }
}

/// A request for the rows of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub entity: String,
    pub filter: Option<KeyFilter>,
    pub includes: Vec<Include>,
}

impl Query {
    /// Every row of an entity
    pub fn all(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
            includes: Vec::new(),
        }
    }

    /// Rows whose `column` is one of `keys`
    pub fn filter_in<K: Into<RefractKey>>(
        mut self,
        column: impl Into<String>,
        keys: impl IntoIterator<Item = K>,
    ) -> Self {
        self.filter = Some(KeyFilter::new(
            column,
            keys.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        merge_include(&mut self.includes, include);
        self
    }

    pub(crate) fn with_includes(mut self, includes: &[Include]) -> Self {
        for include in includes {
            merge_include(&mut self.includes, include.clone());
        }
        self
    }
}

/// Loads source rows for an entity
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Load rows of `entity`, restricted by `filter` when given.
    ///
    /// Rows must carry every column of the entity; navigations are attached by the caller.
    async fn load(&self, entity: &EntityMetadata, filter: Option<&KeyFilter>)
        -> RefractResult<Vec<Row>>;
}

/// Run a query: load the entity rows and attach every requested include.
pub async fn fetch(
    source: &dyn DataSource,
    metadata: &dyn RelationshipMetadata,
    query: &Query,
) -> RefractResult<Vec<Row>> {
    if matches!(&query.filter, Some(filter) if filter.keys.is_empty()) {
        return Ok(Vec::new());
    }
    let entity = metadata.require_entity(&query.entity)?;
    let mut rows = source.load(entity, query.filter.as_ref()).await?;
    attach(source, metadata, entity, &mut rows, &query.includes).await?;
    Ok(rows)
}

fn attach<'a>(
    source: &'a dyn DataSource,
    metadata: &'a dyn RelationshipMetadata,
    entity: &'a EntityMetadata,
    rows: &'a mut Vec<Row>,
    includes: &'a [Include],
) -> BoxFuture<'a, RefractResult<()>> {
    Box::pin(async move {
        for include in includes {
            let relation = entity.require_relation(&include.relation)?;
            let target = metadata.require_entity(&relation.target)?;
            let (local, remote) = relation.join_columns();

            let mut seen = HashSet::new();
            let keys: Vec<RefractKey> = rows
                .iter()
                .filter_map(|row| row.value(local).as_key())
                .filter(|key| seen.insert(key.clone()))
                .collect();

            let mut related = if keys.is_empty() {
                Vec::new()
            } else {
                source
                    .load(target, Some(&KeyFilter::new(remote, keys)))
                    .await?
            };
            attach(source, metadata, target, &mut related, &include.nested).await?;

            let mut grouped: HashMap<RefractKey, Vec<Row>> = HashMap::new();
            for row in related {
                if let Some(key) = row.value(remote).as_key() {
                    grouped.entry(key).or_default().push(row);
                }
            }

            for row in rows.iter_mut() {
                let matches = row.value(local).as_key().and_then(|key| grouped.get(&key));
                let value = match relation.kind {
                    RelationKind::HasMany => Value::List(
                        matches
                            .map(|found| found.iter().cloned().map(Value::Row).collect())
                            .unwrap_or_default(),
                    ),
                    RelationKind::BelongsTo | RelationKind::HasOne => matches
                        .and_then(|found| found.first())
                        .cloned()
                        .map(Value::Row)
                        .unwrap_or(Value::Null),
                };
                row.set(include.relation.clone(), value);
            }
        }
        Ok(())
    })
}
