//! User-supplied batch processors.
//!
//! Items declared with `.batch(processor)` queue their key instead of loading
//! anything. Once per fetch wave every queued item for the same processor
//! instance is handed over in one call.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::key_types::RefractKey;
use crate::types::{ApplyFn, RefractResult};
use crate::value::Value;

/// One pending batch request: a key (or list of keys) and the slot to fill
pub struct BatchItem {
    key: Value,
    apply: ApplyFn,
    applied: Arc<AtomicUsize>,
}

impl BatchItem {
    pub(crate) fn new(key: Value, apply: ApplyFn, applied: Arc<AtomicUsize>) -> Self {
        Self {
            key,
            apply,
            applied,
        }
    }

    /// The key value as read from the source: a scalar key or a list of keys
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// Individual keys carried by this item
    pub fn keys(&self) -> Vec<RefractKey> {
        match &self.key {
            Value::List(parts) => parts.iter().filter_map(Value::as_key).collect(),
            single => single.as_key().into_iter().collect(),
        }
    }

    /// Deliver the resolved value. Every item must be applied exactly once.
    pub async fn apply(self, value: Value) -> RefractResult<()> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        (self.apply)(value).await
    }
}

impl std::fmt::Debug for BatchItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchItem").field("key", &self.key).finish()
    }
}

/// Resolves a group of batch items in one go
#[async_trait]
pub trait BatchProcessor<C>: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Apply every item. Leaving an item unapplied fails the mapping pass.
    async fn apply(&self, items: Vec<BatchItem>, ambient: Arc<C>) -> RefractResult<()>;
}

/// Batch processor backed by a keyed lookup.
///
/// Keys of all items are collected and de-duplicated, `load` is called once, and
/// each item receives the value found for its key (null when missing). Items
/// whose key is a list receive a list of lookups.
pub struct KeyedBatchProcessor<C, F> {
    name: String,
    load: F,
    _ambient: PhantomData<fn(C)>,
}

impl<C, F> KeyedBatchProcessor<C, F> {
    pub fn new(name: impl Into<String>, load: F) -> Self {
        Self {
            name: name.into(),
            load,
            _ambient: PhantomData,
        }
    }
}

fn lookup(found: &HashMap<RefractKey, Value>, key: &Value) -> Value {
    key.as_key()
        .and_then(|key| found.get(&key).cloned())
        .unwrap_or(Value::Null)
}

#[async_trait]
impl<C, F, Fut> BatchProcessor<C> for KeyedBatchProcessor<C, F>
where
    C: Send + Sync + 'static,
    F: Fn(Vec<RefractKey>, Arc<C>) -> Fut + Send + Sync,
    Fut: Future<Output = RefractResult<HashMap<RefractKey, Value>>> + Send + 'static,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn apply(&self, items: Vec<BatchItem>, ambient: Arc<C>) -> RefractResult<()> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for item in &items {
            for key in item.keys() {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        log::debug!("{}: resolving {} keys for {} items", self.name, keys.len(), items.len());

        let found = (self.load)(keys, ambient).await?;
        for item in items {
            let value = match item.key() {
                Value::List(parts) => {
                    Value::List(parts.iter().map(|part| lookup(&found, part)).collect())
                }
                single => lookup(&found, single),
            };
            item.apply(value).await?;
        }
        Ok(())
    }
}
