use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::destination::Destination;
use crate::value::{Row, Value};

/// Boxed, sendable future used wherever a closure or trait object must return one.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Crate-wide result alias
pub type RefractResult<T> = std::result::Result<T, RefractError>;

/// Async value transform applied after projection and before assignment.
pub type Transposer<C> =
    Arc<dyn Fn(Value, Arc<C>) -> BoxFuture<'static, RefractResult<Value>> + Send + Sync>;

/// Computed source accessor: `(source row, ambient context) -> source value`.
pub type ComputeFn<C> = Arc<dyn Fn(&Row, &C) -> RefractResult<Value> + Send + Sync>;

/// Hook run once a destination and all of its fetched relations are populated.
pub type AfterHook<C> =
    Arc<dyn Fn(Destination, Arc<C>) -> BoxFuture<'static, RefractResult<()>> + Send + Sync>;

/// One-shot callback that receives a resolved fetch value.
pub type ApplyFn = Box<dyn FnOnce(Value) -> BoxFuture<'static, RefractResult<()>> + Send>;

/// Typed refract errors
#[derive(Debug, thiserror::Error)]
pub enum RefractError {
    // Configuration errors, raised while building a registry
    #[error("RefractError::MapperCycle: mapper declarations form a cycle: {}", path.join(" -> "))]
    MapperCycle { path: Vec<String> },

    #[error("RefractError::DuplicateMapper: mapper='{mapper}' is registered more than once")]
    DuplicateMapper { mapper: String },

    #[error("RefractError::DuplicateField: mapper='{mapper}' maps destination field '{field}' more than once")]
    DuplicateField { mapper: String, field: String },

    #[error("RefractError::UnknownEntity: entity='{entity}'")]
    UnknownEntity { entity: String },

    #[error("RefractError::UnknownField: entity='{entity}' field='{field}'")]
    UnknownField { entity: String, field: String },

    #[error("RefractError::RelationNotFound: entity='{entity}' relation='{relation}'")]
    RelationNotFound { entity: String, relation: String },

    #[error("RefractError::InvalidConfiguration: component='{component}' message='{message}'")]
    InvalidConfiguration { component: String, message: String },

    #[error("RefractError::MapperNotFound: mapper='{mapper}'")]
    MapperNotFound { mapper: String },

    #[error("RefractError::NotCommitted: mapper='{mapper}' was used before it was committed")]
    NotCommitted { mapper: String },

    #[error("RefractError::AlreadyCommitted: mapper='{mapper}'")]
    AlreadyCommitted { mapper: String },

    #[error("RefractError::FetcherMissing: fetcher='{fetcher}'")]
    FetcherMissing { fetcher: String },

    // Fetch contract violations
    #[error("RefractError::InvalidFetchKey: item='{item}' key='{key}' cannot be fetched")]
    InvalidFetchKey { item: String, key: String },

    // Projection and assignment errors
    #[error("RefractError::Transpose: error assigning '{item}' of type {value_type} to destination '{field}' of type {expected}: {cause}")]
    Transpose {
        item: String,
        value_type: String,
        field: String,
        expected: String,
        #[source]
        cause: Box<RefractError>,
    },

    #[error("RefractError::Assignment: error assigning '{item}' of type {value_type} to destination '{field}' of type {expected}")]
    Assignment {
        item: String,
        value_type: String,
        field: String,
        expected: String,
    },

    #[error("RefractError::Projection: item='{item}' message='{message}'")]
    Projection { item: String, message: String },

    // Execution errors
    #[error("RefractError::Query: error executing query: {projection}: {cause}")]
    Query {
        projection: String,
        #[source]
        cause: Box<RefractError>,
    },

    #[error("RefractError::Database: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("RefractError::DataSource: {message}")]
    DataSource { message: String },

    #[error("RefractError::BatchIncomplete: processor='{processor}' applied {applied} of {expected} items")]
    BatchIncomplete {
        processor: String,
        expected: usize,
        applied: usize,
    },

    #[error("RefractError::WaveLimitExceeded: fetch waves exceeded the configured limit of {limit}")]
    WaveLimitExceeded { limit: usize },

    #[error("RefractError::CyclicGraph: destination '{type_name}' references itself")]
    CyclicGraph { type_name: String },

    #[error("RefractError::Serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("RefractError::External: {message}")]
    External { message: String },
}

impl RefractError {
    /// Wrap an error raised by user code (transposers, hooks, batch processors)
    pub fn external(message: impl std::fmt::Display) -> Self {
        Self::External {
            message: message.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a data source error
    pub fn data_source(message: impl Into<String>) -> Self {
        Self::DataSource {
            message: message.into(),
        }
    }

    /// Create a projection error for a mapping item
    pub fn projection(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Projection {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Whether this error describes a structural mistake detected at build time
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MapperCycle { .. }
                | Self::DuplicateMapper { .. }
                | Self::DuplicateField { .. }
                | Self::UnknownEntity { .. }
                | Self::UnknownField { .. }
                | Self::RelationNotFound { .. }
                | Self::InvalidConfiguration { .. }
                | Self::MapperNotFound { .. }
                | Self::AlreadyCommitted { .. }
                | Self::FetcherMissing { .. }
        )
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
