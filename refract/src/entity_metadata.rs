//! Entity metadata: columns, keys and navigations of source entities.
//!
//! Mappers never inspect source types directly. Everything they need to know
//! about an entity (its primary key, foreign-key columns and relationships)
//! is answered by a [`RelationshipMetadata`] provider.

use heck::ToSnakeCase;
use std::collections::HashMap;

use crate::types::{RefractError, RefractResult};
use crate::value::ScalarType;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    pub ty: ScalarType,
}

/// Cardinality of a navigation, seen from the entity that declares it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The declaring entity holds the foreign key (`order.customer_id -> customer.id`)
    BelongsTo,
    /// The target holds a foreign key back to the declaring entity; at most one row
    HasOne,
    /// The target holds a foreign key back to the declaring entity; any number of rows
    HasMany,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationMetadata {
    pub name: String,
    pub target: String,
    pub kind: RelationKind,
    /// Foreign-key column. Lives on the declaring entity for `BelongsTo`, on the target otherwise.
    pub foreign_key: String,
    /// Column the foreign key points at. Lives on the target for `BelongsTo`,
    /// on the declaring entity otherwise.
    pub references: String,
}

impl RelationMetadata {
    /// `(column on the declaring entity, column on the target)` joined by this relation
    pub fn join_columns(&self) -> (&str, &str) {
        match self.kind {
            RelationKind::BelongsTo => (&self.foreign_key, &self.references),
            RelationKind::HasOne | RelationKind::HasMany => (&self.references, &self.foreign_key),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    pub name: String,
    pub table_name: String,
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnMetadata>,
    pub relations: Vec<RelationMetadata>,
}

impl EntityMetadata {
    /// Start describing an entity; the table name defaults to the snake_case entity name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table_name: name.to_snake_case(),
            name,
            primary_key: Vec::new(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Add a primary-key column
    pub fn key(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        let name = name.into();
        self.primary_key.push(name.clone());
        self.columns.push(ColumnMetadata { name, ty });
        self
    }

    pub fn column(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.columns.push(ColumnMetadata {
            name: name.into(),
            ty,
        });
        self
    }

    /// Navigation to one target row through a foreign key on this entity
    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        self.relation(name, target, RelationKind::BelongsTo, foreign_key, references)
    }

    /// Navigation to at most one target row holding a foreign key to this entity
    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        self.relation(name, target, RelationKind::HasOne, foreign_key, references)
    }

    /// Navigation to every target row holding a foreign key to this entity
    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        self.relation(name, target, RelationKind::HasMany, foreign_key, references)
    }

    fn relation(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        kind: RelationKind,
        foreign_key: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationMetadata {
            name: name.into(),
            target: target.into(),
            kind,
            foreign_key: foreign_key.into(),
            references: references.into(),
        });
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationMetadata> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    pub fn require_relation(&self, name: &str) -> RefractResult<&RelationMetadata> {
        self.find_relation(name)
            .ok_or_else(|| RefractError::RelationNotFound {
                entity: self.name.clone(),
                relation: name.to_string(),
            })
    }

    /// The single primary-key column, or a configuration error for composite keys
    pub fn single_primary_key(&self) -> RefractResult<&str> {
        match self.primary_key.as_slice() {
            [column] => Ok(column.as_str()),
            [] => Err(RefractError::invalid_configuration(
                &self.name,
                "entity has no primary key",
            )),
            _ => Err(RefractError::invalid_configuration(
                &self.name,
                "fetching requires a single-column primary key",
            )),
        }
    }
}

/// Answers questions about entities and their relationships
pub trait RelationshipMetadata: Send + Sync {
    fn entity(&self, name: &str) -> Option<&EntityMetadata>;

    fn entities(&self) -> Vec<&EntityMetadata>;

    fn require_entity(&self, name: &str) -> RefractResult<&EntityMetadata> {
        self.entity(name).ok_or_else(|| RefractError::UnknownEntity {
            entity: name.to_string(),
        })
    }

    /// Primary-key columns of an entity
    fn primary_key(&self, name: &str) -> RefractResult<Vec<String>> {
        Ok(self.require_entity(name)?.primary_key.clone())
    }

    /// Foreign-key columns stored on an entity, without duplicates.
    ///
    /// Covers the entity's own belongs-to navigations first, then columns that
    /// has-one/has-many navigations of other entities point at.
    fn foreign_keys_on(&self, name: &str) -> RefractResult<Vec<String>> {
        let entity = self.require_entity(name)?;
        let mut columns: Vec<String> = Vec::new();
        for relation in &entity.relations {
            if relation.kind == RelationKind::BelongsTo
                && !columns.contains(&relation.foreign_key)
            {
                columns.push(relation.foreign_key.clone());
            }
        }
        let mut owners = self.entities();
        owners.sort_by(|a, b| a.name.cmp(&b.name));
        for owner in owners {
            for relation in &owner.relations {
                if relation.kind != RelationKind::BelongsTo
                    && relation.target == entity.name
                    && !columns.contains(&relation.foreign_key)
                {
                    columns.push(relation.foreign_key.clone());
                }
            }
        }
        Ok(columns)
    }

    /// Resolve a navigation by name
    fn navigation(&self, entity: &str, relation: &str) -> RefractResult<&RelationMetadata> {
        self.require_entity(entity)?.require_relation(relation)
    }
}

/// In-memory metadata registry
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, EntityMetadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity: EntityMetadata) -> Self {
        self.register(entity);
        self
    }

    pub fn register(&mut self, entity: EntityMetadata) {
        self.entities.insert(entity.name.clone(), entity);
    }

}

impl RelationshipMetadata for MetadataRegistry {
    fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(name)
    }

    fn entities(&self) -> Vec<&EntityMetadata> {
        self.entities.values().collect()
    }
}
