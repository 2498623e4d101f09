//! Flexible key type for Refract
//!
//! Primary keys, foreign keys and fetch keys can be integers, strings or UUIDs.
//! `RefractKey` gives them a single hashable representation so fetchers can
//! group and de-duplicate requests regardless of the underlying column type.

use sea_orm::Value as DbValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::value::Value;

/// A key that identifies a source entity or joins two of them
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefractKey {
    Int(i64),
    String(String),
    Uuid(Uuid),
    Composite(Vec<RefractKey>),
}

impl RefractKey {
    /// Build a key from a source value.
    ///
    /// Returns `None` for null and for values that cannot act as keys
    /// (floats, booleans, rows, lists).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(value) => Some(Self::Int(*value)),
            Value::String(value) => Some(Self::String(value.clone())),
            Value::Uuid(value) => Some(Self::Uuid(*value)),
            _ => None,
        }
    }

    /// Build a composite key; a single part collapses to that part.
    pub fn composite(mut parts: Vec<RefractKey>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self::Composite(parts)
        }
    }

    /// Whether the key may be used to fetch an entity.
    ///
    /// Zero integers, empty strings and the nil UUID are the default values of
    /// their types and never identify a stored row.
    pub fn is_valid_fetch_key(&self) -> bool {
        match self {
            Self::Int(value) => *value != 0,
            Self::String(value) => !value.is_empty(),
            Self::Uuid(value) => !value.is_nil(),
            Self::Composite(parts) => {
                !parts.is_empty() && parts.iter().all(Self::is_valid_fetch_key)
            }
        }
    }

    /// Convert back into a source value
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(value) => Value::Int(*value),
            Self::String(value) => Value::String(value.clone()),
            Self::Uuid(value) => Value::Uuid(*value),
            Self::Composite(parts) => Value::List(parts.iter().map(Self::to_value).collect()),
        }
    }

    /// Convert to a sea_orm::Value for database operations
    pub fn to_db_value(&self) -> DbValue {
        match self {
            Self::Int(value) => DbValue::BigInt(Some(*value)),
            Self::String(value) => DbValue::String(Some(Box::new(value.clone()))),
            Self::Uuid(value) => DbValue::Uuid(Some(Box::new(*value))),
            Self::Composite(_) => DbValue::String(Some(Box::new(self.to_string()))),
        }
    }

    /// Create from a sea_orm::Value
    pub fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::TinyInt(Some(i)) => Some(Self::Int(i64::from(*i))),
            DbValue::SmallInt(Some(i)) => Some(Self::Int(i64::from(*i))),
            DbValue::Int(Some(i)) => Some(Self::Int(i64::from(*i))),
            DbValue::BigInt(Some(i)) => Some(Self::Int(*i)),
            DbValue::String(Some(s)) => Some(Self::String((**s).clone())),
            DbValue::Uuid(Some(uuid)) => Some(Self::Uuid(**uuid)),
            _ => None,
        }
    }
}

impl fmt::Display for RefractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::String(value) => write!(f, "{}", value),
            Self::Uuid(value) => write!(f, "{}", value),
            Self::Composite(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl FromStr for RefractKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty key".to_string());
        }
        if let Ok(value) = s.parse::<i64>() {
            return Ok(Self::Int(value));
        }
        if let Ok(uuid) = Uuid::parse_str(s) {
            return Ok(Self::Uuid(uuid));
        }
        Ok(Self::String(s.to_string()))
    }
}

impl From<i32> for RefractKey {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for RefractKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for RefractKey {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for RefractKey {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Uuid> for RefractKey {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}
