//! Destination objects produced by mappers.
//!
//! A destination is a shared, mutable record: fetched relations are assigned
//! into it after the mapper that allocated it has returned, so every handle
//! points at the same fields.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::types::{lock, RefractError, RefractResult};
use crate::value::Value;

struct Inner {
    type_name: String,
    fields: Mutex<IndexMap<String, Value>>,
}

/// Shared handle to a destination object
#[derive(Clone)]
pub struct Destination {
    inner: Arc<Inner>,
}

impl Destination {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self::with_fields(type_name, std::iter::empty::<(String, Value)>())
    }

    /// Allocate a destination with the given initial field values
    pub fn with_fields<I, K>(type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            inner: Arc::new(Inner {
                type_name: type_name.into(),
                fields: Mutex::new(fields.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            }),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    /// Current value of a field; unset fields read as null
    pub fn get(&self, field: &str) -> Value {
        lock(&self.inner.fields)
            .get(field)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) {
        lock(&self.inner.fields).insert(field.into(), value.into());
    }

    /// Snapshot of all fields in declaration order
    pub fn fields(&self) -> IndexMap<String, Value> {
        lock(&self.inner.fields).clone()
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &Destination) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Render as JSON. Fails with `CyclicGraph` if the object graph loops back on itself.
    pub fn to_json(&self) -> RefractResult<serde_json::Value> {
        self.to_json_guarded(&mut Vec::new())
    }

    pub(crate) fn to_json_guarded(
        &self,
        path: &mut Vec<Destination>,
    ) -> RefractResult<serde_json::Value> {
        if path.iter().any(|seen| seen.ptr_eq(self)) {
            return Err(RefractError::CyclicGraph {
                type_name: self.type_name().to_string(),
            });
        }
        path.push(self.clone());
        // snapshot so the lock is not held while visiting children
        let fields = self.fields();
        let mut object = serde_json::Map::with_capacity(fields.len());
        for (name, value) in fields.iter() {
            object.insert(name.clone(), value.to_json_guarded(path)?);
        }
        path.pop();
        Ok(serde_json::Value::Object(object))
    }

    /// Deserialize into a typed struct through its JSON form
    pub fn deserialize<T: DeserializeOwned>(&self) -> RefractResult<T> {
        Ok(serde_json::from_value(self.to_json()?)?)
    }
}

impl PartialEq for Destination {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // fields may point back at this object, so only names are printed
        let names: Vec<String> = lock(&self.inner.fields).keys().cloned().collect();
        f.debug_struct("Destination")
            .field("type_name", &self.inner.type_name)
            .field("fields", &names)
            .finish()
    }
}
