//! Dynamic values flowing from data sources into destination objects.

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::destination::Destination;
use crate::key_types::RefractKey;
use crate::types::RefractResult;

static NULL: Value = Value::Null;

/// A single value read from a source row or written to a destination field
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<FixedOffset>),
    Decimal(Decimal),
    Json(serde_json::Value),
    List(Vec<Value>),
    /// A nested source row, produced by an included navigation
    Row(Row),
    /// A mapped destination object
    Object(Destination),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type label used in error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Uuid(_) => "uuid".to_string(),
            Value::DateTime(_) => "datetime".to_string(),
            Value::Decimal(_) => "decimal".to_string(),
            Value::Json(_) => "json".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Row(_) => "row".to_string(),
            Value::Object(object) => object.type_name().to_string(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Value::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Destination> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Key view of this value, if it can act as one
    pub fn as_key(&self) -> Option<RefractKey> {
        RefractKey::from_value(self)
    }

    /// Convert into JSON, failing on destination graphs that reference themselves.
    pub fn to_json(&self) -> RefractResult<serde_json::Value> {
        self.to_json_guarded(&mut Vec::new())
    }

    pub(crate) fn to_json_guarded(
        &self,
        path: &mut Vec<Destination>,
    ) -> RefractResult<serde_json::Value> {
        use serde_json::Value as Json;

        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(value) => Json::Bool(*value),
            Value::Int(value) => Json::from(*value),
            Value::Float(value) => serde_json::Number::from_f64(*value)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(value) => Json::String(value.clone()),
            Value::Uuid(value) => Json::String(value.to_string()),
            Value::DateTime(value) => Json::String(value.to_rfc3339()),
            Value::Decimal(value) => Json::String(value.to_string()),
            Value::Json(value) => value.clone(),
            Value::List(values) => Json::Array(
                values
                    .iter()
                    .map(|value| value.to_json_guarded(path))
                    .collect::<RefractResult<Vec<_>>>()?,
            ),
            Value::Row(row) => {
                let mut object = serde_json::Map::new();
                for (name, value) in row.iter() {
                    object.insert(name.clone(), value.to_json_guarded(path)?);
                }
                Json::Object(object)
            }
            Value::Object(destination) => destination.to_json_guarded(path)?,
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::String(value) => write!(f, "{:?}", value),
            Value::Uuid(value) => write!(f, "{}", value),
            Value::DateTime(value) => write!(f, "{}", value.to_rfc3339()),
            Value::Decimal(value) => write!(f, "{}", value),
            Value::Json(value) => write!(f, "{}", value),
            Value::List(values) => write!(f, "[{} items]", values.len()),
            Value::Row(row) => write!(f, "{{{} fields}}", row.len()),
            Value::Object(object) => write!(f, "{}", object.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Value::DateTime(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

impl From<Row> for Value {
    fn from(value: Row) -> Self {
        Value::Row(value)
    }
}

impl From<Destination> for Value {
    fn from(value: Destination) -> Self {
        Value::Object(value)
    }
}

impl From<RefractKey> for Value {
    fn from(value: RefractKey) -> Self {
        value.to_value()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

/// Scalar type of an entity column or of a plain destination field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Any,
    Bool,
    Int,
    Float,
    String,
    Uuid,
    DateTime,
    Decimal,
    Json,
}

impl ScalarType {
    /// Whether a value may be stored in a field of this type. Null is always accepted.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ScalarType::Any, _) => true,
            (ScalarType::Bool, Value::Bool(_)) => true,
            (ScalarType::Int, Value::Int(_)) => true,
            (ScalarType::Float, Value::Float(_) | Value::Int(_)) => true,
            (ScalarType::String, Value::String(_)) => true,
            (ScalarType::Uuid, Value::Uuid(_)) => true,
            (ScalarType::DateTime, Value::DateTime(_)) => true,
            (ScalarType::Decimal, Value::Decimal(_) | Value::Int(_)) => true,
            (ScalarType::Json, _) => !matches!(value, Value::Object(_)),
            _ => false,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Any => "any",
            ScalarType::Bool => "bool",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::String => "string",
            ScalarType::Uuid => "uuid",
            ScalarType::DateTime => "datetime",
            ScalarType::Decimal => "decimal",
            ScalarType::Json => "json",
        };
        write!(f, "{}", name)
    }
}

/// A source row: named values in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field value, reading a missing field as null
    pub fn value(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Follow a navigation path. A null or missing step yields null.
    pub fn path(&self, segments: &[String]) -> Value {
        let Some((last, prefix)) = segments.split_last() else {
            return Value::Row(self.clone());
        };
        let mut current = self;
        for segment in prefix {
            match current.value(segment) {
                Value::Row(row) => current = row,
                _ => return Value::Null,
            }
        }
        current.value(last).clone()
    }

    /// Key made of the given columns, or `None` if any of them is not a key value
    pub fn key(&self, columns: &[String]) -> Option<RefractKey> {
        let parts = columns
            .iter()
            .map(|column| self.value(column).as_key())
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(RefractKey::composite(parts))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.set(name, value);
        }
        row
    }
}

/// Build a [`Row`] from `name => value` pairs.
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut __row = $crate::Row::new();
        $( __row.set($name, $value); )+
        __row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_propagates_null() {
        let row = crate::row! {
            "id" => 1,
            "customer" => crate::row! { "name" => "Ada" },
            "shipper" => Value::Null,
        };

        assert_eq!(row.path(&["customer".into(), "name".into()]), Value::from("Ada"));
        assert_eq!(row.path(&["shipper".into(), "name".into()]), Value::Null);
        assert_eq!(row.path(&["missing".into()]), Value::Null);
        assert_eq!(row.path(&[]), Value::Row(row.clone()));
    }

    #[test]
    fn test_row_key() {
        let row = crate::row! { "a" => 1, "b" => "x", "c" => Value::Null };
        assert_eq!(row.key(&["a".into()]), Some(RefractKey::Int(1)));
        assert_eq!(
            row.key(&["a".into(), "b".into()]),
            Some(RefractKey::Composite(vec![RefractKey::Int(1), RefractKey::from("x")]))
        );
        assert_eq!(row.key(&["c".into()]), None);
    }

    #[test]
    fn test_scalar_type_accepts() {
        assert!(ScalarType::Int.accepts(&Value::Int(1)));
        assert!(ScalarType::Int.accepts(&Value::Null));
        assert!(!ScalarType::Int.accepts(&Value::from("1")));
        assert!(ScalarType::Float.accepts(&Value::Int(1)));
        assert!(ScalarType::Any.accepts(&Value::List(vec![])));
    }

    #[test]
    fn test_to_json() {
        let value = Value::List(vec![Value::Int(1), Value::from("a"), Value::Null]);
        assert_eq!(value.to_json().unwrap(), serde_json::json!([1, "a", null]));
    }
}
