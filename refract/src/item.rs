//! Mapping items: one destination field and how to fill it.
//!
//! Items are declared through [`MapperBuilder::field`] and resolved against
//! entity metadata when the registry is built. Resolution works out the shape
//! of the source value, the shape of the destination field and, from those,
//! which mapper (if any) the item depends on.

use heck::ToSnakeCase;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::batch::BatchProcessor;
use crate::destination::Destination;
use crate::entity_metadata::{RelationKind, RelationshipMetadata};
use crate::mapper::MapperKey;
use crate::types::{AfterHook, BoxFuture, ComputeFn, RefractError, RefractResult, Transposer};
use crate::value::{Row, ScalarType, Value};

/// How a related entity should be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RelationshipStyle {
    /// Loaded with the owning rows and projected in place
    #[default]
    Inline,
    /// Loaded afterwards through a keyed fetcher, batched across all owners
    Fetch,
    /// Loaded afterwards through a user batch processor
    Batch,
}

/// Where an item reads its source value
pub enum SourceAccessor<C> {
    /// Navigation path from the source row. Empty means the row itself.
    Path(Vec<String>),
    Computed(ComputeFn<C>),
}

impl<C> SourceAccessor<C> {
    pub fn path(path: &str) -> Self {
        SourceAccessor::Path(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn segments(&self) -> Option<&[String]> {
        match self {
            SourceAccessor::Path(segments) => Some(segments),
            SourceAccessor::Computed(_) => None,
        }
    }

    pub fn evaluate(&self, row: &Row, ambient: &C) -> RefractResult<Value> {
        match self {
            SourceAccessor::Path(segments) => Ok(row.path(segments)),
            SourceAccessor::Computed(compute) => compute(row, ambient),
        }
    }
}

impl<C> Clone for SourceAccessor<C> {
    fn clone(&self) -> Self {
        match self {
            SourceAccessor::Path(segments) => SourceAccessor::Path(segments.clone()),
            SourceAccessor::Computed(compute) => SourceAccessor::Computed(compute.clone()),
        }
    }
}

impl<C> fmt::Display for SourceAccessor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAccessor::Path(segments) if segments.is_empty() => write!(f, "<row>"),
            SourceAccessor::Path(segments) => write!(f, "{}", segments.join(".")),
            SourceAccessor::Computed(_) => write!(f, "<computed>"),
        }
    }
}

impl<C> fmt::Debug for SourceAccessor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceAccessor({})", self)
    }
}

/// Shape of the value an accessor produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceShape {
    Scalar,
    /// A row of the named entity
    Entity(String),
    /// A list of rows of the named entity
    Sequence(String),
}

/// Shape of the destination field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationShape {
    Scalar(ScalarType),
    /// A destination object of the named type
    Object(String),
    /// A list of destination objects of the named type
    List(String),
}

impl DestinationShape {
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (DestinationShape::Scalar(ty), value) => ty.accepts(value),
            (_, Value::Null) => true,
            (DestinationShape::Object(name), Value::Object(object)) => object.type_name() == name,
            (DestinationShape::List(name), Value::List(values)) => values.iter().all(|value| {
                matches!(value, Value::Object(object) if object.type_name() == name)
            }),
            _ => false,
        }
    }

    /// Value the destination field holds before anything is assigned
    pub fn default_value(&self) -> Value {
        match self {
            DestinationShape::List(_) => Value::List(Vec::new()),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for DestinationShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationShape::Scalar(ty) => write!(f, "{}", ty),
            DestinationShape::Object(name) => write!(f, "{}", name),
            DestinationShape::List(name) => write!(f, "List<{}>", name),
        }
    }
}

/// A resolved mapping item
pub struct MapperItem<C> {
    /// Intermediate field name
    pub name: String,
    pub source: SourceAccessor<C>,
    pub source_shape: SourceShape,
    /// Destination field name
    pub destination: String,
    pub destination_shape: DestinationShape,
    /// Expected type checked at assignment
    pub expected: DestinationShape,
    pub style: RelationshipStyle,
    pub transposer: Option<Transposer<C>>,
    pub batch: Option<Arc<dyn BatchProcessor<C>>>,
}

impl<C> MapperItem<C> {
    /// Mapper this item needs, when it maps entities into destination objects
    pub fn dependency(&self) -> Option<MapperKey> {
        match (&self.source_shape, &self.destination_shape) {
            (SourceShape::Entity(entity), DestinationShape::Object(destination))
            | (SourceShape::Sequence(entity), DestinationShape::List(destination)) => {
                Some(MapperKey::new(entity, destination))
            }
            _ => None,
        }
    }
}

impl<C> fmt::Debug for MapperItem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperItem")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("source_shape", &self.source_shape)
            .field("destination", &self.destination)
            .field("destination_shape", &self.destination_shape)
            .field("style", &self.style)
            .finish()
    }
}

/// Declaration of one destination field, refined by chained calls
pub struct ItemDeclaration<C> {
    destination: String,
    source: Option<SourceAccessor<C>>,
    source_shape: Option<SourceShape>,
    mapped: Option<String>,
    declared: Option<ScalarType>,
    style: Option<RelationshipStyle>,
    transposer: Option<Transposer<C>>,
    batch: Option<Arc<dyn BatchProcessor<C>>>,
    conflicts: Vec<String>,
}

impl<C: Send + Sync + 'static> ItemDeclaration<C> {
    fn new(destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
            source: None,
            source_shape: None,
            mapped: None,
            declared: None,
            style: None,
            transposer: None,
            batch: None,
            conflicts: Vec::new(),
        }
    }

    /// Read the source value along a dotted navigation path (`"customer.name"`).
    /// An empty path reads the source row itself.
    pub fn from(&mut self, path: &str) -> &mut Self {
        if self.source.is_some() {
            self.conflicts.push("source accessor declared twice".into());
        }
        self.source = Some(SourceAccessor::path(path));
        self
    }

    /// Compute the source value from the row and the ambient context
    pub fn compute<F>(&mut self, compute: F) -> &mut Self
    where
        F: Fn(&Row, &C) -> RefractResult<Value> + Send + Sync + 'static,
    {
        if self.source.is_some() {
            self.conflicts.push("source accessor declared twice".into());
        }
        self.source = Some(SourceAccessor::Computed(Arc::new(compute)));
        self
    }

    /// Declare that a computed accessor yields a row of `entity`
    pub fn source_entity(&mut self, entity: &str) -> &mut Self {
        self.source_shape = Some(SourceShape::Entity(entity.to_string()));
        self
    }

    /// Declare that a computed accessor yields a list of rows of `entity`
    pub fn source_sequence(&mut self, entity: &str) -> &mut Self {
        self.source_shape = Some(SourceShape::Sequence(entity.to_string()));
        self
    }

    /// Map the source entity (or each entity of a sequence) through the `destination` mapper
    pub fn mapped(&mut self, destination: &str) -> &mut Self {
        self.mapped = Some(destination.to_string());
        self
    }

    /// Declared type of the destination field
    pub fn typed(&mut self, ty: ScalarType) -> &mut Self {
        self.declared = Some(ty);
        self
    }

    pub fn inline(&mut self) -> &mut Self {
        self.set_style(RelationshipStyle::Inline)
    }

    pub fn fetch(&mut self) -> &mut Self {
        self.set_style(RelationshipStyle::Fetch)
    }

    /// Resolve the source key through a batch processor
    pub fn batch(&mut self, processor: Arc<dyn BatchProcessor<C>>) -> &mut Self {
        self.batch = Some(processor);
        self.set_style(RelationshipStyle::Batch)
    }

    /// Async transposer applied to the value before assignment
    pub fn to<F, Fut>(&mut self, transpose: F) -> &mut Self
    where
        F: Fn(Value, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RefractResult<Value>> + Send + 'static,
    {
        self.set_transposer(Arc::new(
            move |value: Value, ambient: Arc<C>| -> BoxFuture<'static, RefractResult<Value>> {
                Box::pin(transpose(value, ambient))
            },
        ))
    }

    /// Synchronous transposer
    pub fn convert<F>(&mut self, convert: F) -> &mut Self
    where
        F: Fn(Value) -> RefractResult<Value> + Send + Sync + 'static,
    {
        let convert = Arc::new(convert);
        self.set_transposer(Arc::new(
            move |value: Value, _: Arc<C>| -> BoxFuture<'static, RefractResult<Value>> {
                let convert = convert.clone();
                Box::pin(async move { convert(value) })
            },
        ))
    }

    pub(crate) fn destination_name(&self) -> &str {
        &self.destination
    }

    fn set_style(&mut self, style: RelationshipStyle) -> &mut Self {
        if self.style.is_some_and(|current| current != style) {
            self.conflicts
                .push(format!("relationship style {:?} conflicts with {:?}", style, self.style));
        }
        self.style = Some(style);
        self
    }

    fn set_transposer(&mut self, transposer: Transposer<C>) -> &mut Self {
        if self.transposer.is_some() {
            self.conflicts.push("transposer declared twice".into());
        }
        self.transposer = Some(transposer);
        self
    }

    pub(crate) fn resolve(
        self,
        owner: &MapperKey,
        metadata: &dyn RelationshipMetadata,
        registered: &HashSet<MapperKey>,
    ) -> RefractResult<MapperItem<C>> {
        let component = format!("{}.{}", owner, self.destination);
        if let Some(conflict) = self.conflicts.first() {
            return Err(RefractError::invalid_configuration(component, conflict.clone()));
        }

        let source = self.source.unwrap_or_else(|| SourceAccessor::path(&self.destination));
        let source_shape = match (&source, self.source_shape) {
            (_, Some(shape)) => shape,
            (SourceAccessor::Path(segments), None) => {
                shape_of_path(metadata, &owner.source, segments)?
            }
            (SourceAccessor::Computed(_), None) => SourceShape::Scalar,
        };
        let style = self.style.unwrap_or_default();

        let destination_shape = match (&self.mapped, &source_shape) {
            (Some(_), _) if style == RelationshipStyle::Batch => {
                return Err(RefractError::invalid_configuration(
                    component,
                    "batch items assign processor results and cannot be mapped",
                ));
            }
            (Some(destination), SourceShape::Entity(entity)) => {
                require_mapper(registered, entity, destination)?;
                DestinationShape::Object(destination.clone())
            }
            (Some(destination), SourceShape::Sequence(entity)) => {
                require_mapper(registered, entity, destination)?;
                DestinationShape::List(destination.clone())
            }
            (Some(_), SourceShape::Scalar) => {
                return Err(RefractError::invalid_configuration(
                    component,
                    "only entities and entity sequences can be mapped",
                ));
            }
            (None, _) => DestinationShape::Scalar(self.declared.unwrap_or(ScalarType::Any)),
        };

        if style == RelationshipStyle::Fetch && self.mapped.is_none() {
            return Err(RefractError::invalid_configuration(
                component,
                "fetched items must be mapped",
            ));
        }

        let expected = match self.declared {
            Some(ty) => DestinationShape::Scalar(ty),
            None => destination_shape.clone(),
        };

        Ok(MapperItem {
            name: self.destination.to_snake_case(),
            source,
            source_shape,
            destination: self.destination,
            destination_shape,
            expected,
            style,
            transposer: self.transposer,
            batch: self.batch,
        })
    }
}

fn require_mapper(
    registered: &HashSet<MapperKey>,
    entity: &str,
    destination: &str,
) -> RefractResult<()> {
    let key = MapperKey::new(entity, destination);
    if registered.contains(&key) {
        Ok(())
    } else {
        Err(RefractError::MapperNotFound {
            mapper: key.to_string(),
        })
    }
}

/// Work out what a navigation path yields, starting from `entity`
pub(crate) fn shape_of_path(
    metadata: &dyn RelationshipMetadata,
    entity: &str,
    segments: &[String],
) -> RefractResult<SourceShape> {
    let mut current = metadata.require_entity(entity)?;
    let Some((last, prefix)) = segments.split_last() else {
        return Ok(SourceShape::Entity(current.name.clone()));
    };

    for segment in prefix {
        let relation = current.find_relation(segment).ok_or_else(|| {
            RefractError::RelationNotFound {
                entity: current.name.clone(),
                relation: segment.clone(),
            }
        })?;
        if relation.kind == RelationKind::HasMany {
            return Err(RefractError::invalid_configuration(
                format!("{}.{}", current.name, segment),
                "cannot navigate through a collection",
            ));
        }
        current = metadata.require_entity(&relation.target)?;
    }

    if let Some(relation) = current.find_relation(last) {
        return Ok(match relation.kind {
            RelationKind::HasMany => SourceShape::Sequence(relation.target.clone()),
            RelationKind::BelongsTo | RelationKind::HasOne => {
                SourceShape::Entity(relation.target.clone())
            }
        });
    }
    if current.find_column(last).is_some() {
        return Ok(SourceShape::Scalar);
    }
    Err(RefractError::UnknownField {
        entity: current.name.clone(),
        field: last.clone(),
    })
}

/// Declares the items and hooks of one mapper
pub struct MapperBuilder<C> {
    pub(crate) key: MapperKey,
    pub(crate) items: Vec<ItemDeclaration<C>>,
    pub(crate) after: Vec<AfterHook<C>>,
}

impl<C: Send + Sync + 'static> MapperBuilder<C> {
    pub(crate) fn new(key: MapperKey) -> Self {
        Self {
            key,
            items: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Declare a destination field. Without further calls it copies the
    /// source member of the same name.
    pub fn field(&mut self, destination: &str) -> &mut ItemDeclaration<C> {
        self.items.push(ItemDeclaration::new(destination));
        let last = self.items.len() - 1;
        &mut self.items[last]
    }

    /// Run `hook` once the destination and everything fetched for it is in place
    pub fn after<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Destination, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RefractResult<()>> + Send + 'static,
    {
        self.after.push(Arc::new(
            move |destination: Destination,
                  ambient: Arc<C>|
                  -> BoxFuture<'static, RefractResult<()>> {
                Box::pin(hook(destination, ambient))
            },
        ));
        self
    }
}
