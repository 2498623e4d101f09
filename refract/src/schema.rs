//! Intermediate (transient) shape each mapper projects source rows into.
//!
//! A mapper's schema is laid out at commit time: primary-key carriers first,
//! then foreign-key carriers, then one field per applicator. Carriers are
//! prefixed with `__` so they never collide with destination field names.

use std::fmt;
use std::sync::Arc;

use crate::mapper::MapperKey;
use crate::types::{RefractError, RefractResult};
use crate::value::{Row, Value};

pub(crate) const CARRIER_PREFIX: &str = "__";

pub(crate) fn carrier_name(column: &str) -> String {
    format!("{}{}", CARRIER_PREFIX, column)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Primary- or foreign-key column copied from the source row
    Carrier,
    /// Plain value
    Scalar,
    /// Nested transient of another mapper
    Embedded(MapperKey),
    /// Sequence of nested transients of another mapper
    Sequence(MapperKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered field list of a transient type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    /// Append a field, returning its slot index
    pub(crate) fn push(&mut self, owner: &MapperKey, field: FieldDef) -> RefractResult<usize> {
        if self.index_of(&field.name).is_some() {
            return Err(RefractError::DuplicateField {
                mapper: owner.to_string(),
                field: field.name,
            });
        }
        self.fields.push(field);
        Ok(self.fields.len() - 1)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One field of a transient
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    /// `None` when the source navigation was null
    Embedded(Option<Box<Transient>>),
    /// `None` when the source collection was null
    Sequence(Option<Vec<Transient>>),
}

impl Slot {
    pub fn value(&self) -> &Value {
        static NULL: Value = Value::Null;
        match self {
            Slot::Value(value) => value,
            _ => &NULL,
        }
    }
}

/// A projected source row, one slot per schema field
#[derive(Debug, Clone, PartialEq)]
pub struct Transient {
    slots: Vec<Slot>,
}

impl Transient {
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Plain value stored at `index`; null for missing or nested slots
    pub fn value(&self, index: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.slots.get(index).map(Slot::value).unwrap_or(&NULL)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }
}

/// Computes one slot from a source row
pub type Binding<C> = Arc<dyn Fn(&Row, &C) -> RefractResult<Slot> + Send + Sync>;

/// Compiled projection from a source row to a transient
pub struct Projection<C> {
    mapper: MapperKey,
    schema: Schema,
    bindings: Vec<(String, Binding<C>)>,
}

impl<C> Projection<C> {
    pub(crate) fn new(mapper: MapperKey) -> Self {
        Self {
            mapper,
            schema: Schema::default(),
            bindings: Vec::new(),
        }
    }

    /// Declare a field together with the binding that fills it
    pub(crate) fn bind(
        &mut self,
        field: FieldDef,
        description: String,
        binding: Binding<C>,
    ) -> RefractResult<usize> {
        let index = self.schema.push(&self.mapper, field)?;
        self.bindings.push((description, binding));
        Ok(index)
    }

    pub fn apply(&self, row: &Row, ambient: &C) -> RefractResult<Transient> {
        let slots = self
            .bindings
            .iter()
            .map(|(_, binding)| binding(row, ambient))
            .collect::<RefractResult<Vec<_>>>()?;
        Ok(Transient { slots })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn mapper(&self) -> &MapperKey {
        &self.mapper
    }
}

impl<C> fmt::Display for Projection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ ", self.mapper)?;
        for (i, (field, (description, _))) in self
            .schema
            .fields()
            .iter()
            .zip(self.bindings.iter())
            .enumerate()
        {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, description)?;
        }
        write!(f, " }}")
    }
}

impl<C> fmt::Debug for Projection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("mapper", &self.mapper)
            .field("schema", &self.schema)
            .finish()
    }
}
