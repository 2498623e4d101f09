//! Per-pass mapping context and the fetch coordinator.
//!
//! One context lives for one top-level `map` call. While rows are being
//! materialized, applicators queue fetch requests and after hooks here;
//! [`MappingContext::finish`] then drains the queues in waves until no work is
//! left.

use async_trait::async_trait;
use by_address::ByAddress;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::batch::{BatchItem, BatchProcessor};
use crate::destination::Destination;
use crate::entity_metadata::{EntityMetadata, RelationshipMetadata};
use crate::fetchers::{FetcherFactory, KeyedRequest, ReverseKey};
use crate::key_types::RefractKey;
use crate::mapper::MapperKey;
use crate::registry::RegistryConfig;
use crate::source::{self, DataSource, KeyFilter, Query};
use crate::types::{lock, AfterHook, ApplyFn, RefractError, RefractResult};
use crate::value::{Row, Value};

/// Counters collected over one mapping pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    /// Drain waves run by the coordinator
    pub waves: usize,
    /// Fetcher or batch processor invocations
    pub fetch_groups: usize,
    /// Loads issued against the data source, includes counted separately
    pub loads: usize,
}

/// A deferred fetch, queued during materialization
pub(crate) enum FetchRequest<C> {
    /// Load one entity by primary key through the mapper's entity fetcher
    Entity { mapper: MapperKey, request: KeyedRequest },
    /// Load the dependents of one primary entity through a reverse fetcher
    Reverse { fetcher: ReverseKey, request: KeyedRequest },
    /// Hand a key to a user batch processor
    Batch {
        processor: Arc<dyn BatchProcessor<C>>,
        key: Value,
        apply: ApplyFn,
    },
}

fn fetch_key(item: &str, value: &Value) -> RefractResult<RefractKey> {
    value
        .as_key()
        .filter(RefractKey::is_valid_fetch_key)
        .ok_or_else(|| RefractError::InvalidFetchKey {
            item: item.to_string(),
            key: value.to_string(),
        })
}

impl<C> FetchRequest<C> {
    pub(crate) fn entity(
        item: &str,
        mapper: MapperKey,
        id: &Value,
        apply: ApplyFn,
    ) -> RefractResult<Self> {
        let key = fetch_key(item, id)?;
        Ok(FetchRequest::Entity {
            mapper,
            request: KeyedRequest { key, apply },
        })
    }

    pub(crate) fn reverse(
        item: &str,
        fetcher: ReverseKey,
        key: &Value,
        apply: ApplyFn,
    ) -> RefractResult<Self> {
        let key = fetch_key(item, key)?;
        Ok(FetchRequest::Reverse {
            fetcher,
            request: KeyedRequest { key, apply },
        })
    }

    /// A batch key may be a single key or a list of keys; every part must be valid
    pub(crate) fn batch(
        item: &str,
        processor: Arc<dyn BatchProcessor<C>>,
        key: Value,
        apply: ApplyFn,
    ) -> RefractResult<Self> {
        match &key {
            Value::List(parts) => {
                for part in parts {
                    fetch_key(item, part)?;
                }
            }
            single => {
                fetch_key(item, single)?;
            }
        }
        Ok(FetchRequest::Batch {
            processor,
            key,
            apply,
        })
    }
}

struct PendingHook<C> {
    hook: AfterHook<C>,
    destination: Destination,
}

struct WorkQueue<C> {
    requests: Vec<FetchRequest<C>>,
    hooks: Vec<PendingHook<C>>,
}

/// Data source wrapper counting loads for [`PassStats`]
struct CountingSource<'a> {
    inner: &'a dyn DataSource,
    loads: &'a AtomicUsize,
}

#[async_trait]
impl DataSource for CountingSource<'_> {
    async fn load(
        &self,
        entity: &EntityMetadata,
        filter: Option<&KeyFilter>,
    ) -> RefractResult<Vec<Row>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(entity, filter).await
    }
}

/// State of one mapping pass
pub struct MappingContext<C> {
    ambient: Arc<C>,
    source: Arc<dyn DataSource>,
    metadata: Arc<dyn RelationshipMetadata>,
    config: RegistryConfig,
    queue: Mutex<WorkQueue<C>>,
    cache: Mutex<HashMap<(MapperKey, RefractKey), Destination>>,
    waves: AtomicUsize,
    fetch_groups: AtomicUsize,
    loads: AtomicUsize,
}

impl<C: Send + Sync + 'static> MappingContext<C> {
    pub(crate) fn new(
        ambient: Arc<C>,
        source: Arc<dyn DataSource>,
        metadata: Arc<dyn RelationshipMetadata>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            ambient,
            source,
            metadata,
            config,
            queue: Mutex::new(WorkQueue {
                requests: Vec::new(),
                hooks: Vec::new(),
            }),
            cache: Mutex::new(HashMap::new()),
            waves: AtomicUsize::new(0),
            fetch_groups: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    /// The caller-supplied ambient value for this pass
    pub fn ambient(&self) -> &Arc<C> {
        &self.ambient
    }

    pub fn metadata(&self) -> &dyn RelationshipMetadata {
        &*self.metadata
    }

    pub fn stats(&self) -> PassStats {
        PassStats {
            waves: self.waves.load(Ordering::SeqCst),
            fetch_groups: self.fetch_groups.load(Ordering::SeqCst),
            loads: self.loads.load(Ordering::SeqCst),
        }
    }

    /// Run a query against the pass's data source
    pub(crate) async fn query(&self, query: &Query) -> RefractResult<Vec<Row>> {
        let counted = CountingSource {
            inner: &*self.source,
            loads: &self.loads,
        };
        source::fetch(&counted, &*self.metadata, query).await
    }

    pub(crate) fn enqueue(&self, request: FetchRequest<C>) {
        lock(&self.queue).requests.push(request);
    }

    pub(crate) fn defer_hooks(&self, destination: &Destination, hooks: &[AfterHook<C>]) {
        if hooks.is_empty() {
            return;
        }
        let mut queue = lock(&self.queue);
        for hook in hooks {
            queue.hooks.push(PendingHook {
                hook: hook.clone(),
                destination: destination.clone(),
            });
        }
    }

    /// Destination already produced in this pass by `mapper` for `key`
    pub(crate) fn cached(&self, mapper: &MapperKey, key: &RefractKey) -> Option<Destination> {
        if !self.config.cache_destinations {
            return None;
        }
        lock(&self.cache).get(&(mapper.clone(), key.clone())).cloned()
    }

    pub(crate) fn remember(&self, mapper: &MapperKey, key: RefractKey, object: &Destination) {
        if self.config.cache_destinations {
            lock(&self.cache).insert((mapper.clone(), key), object.clone());
        }
    }

    /// Drain queued fetch requests and after hooks until both queues stay empty.
    ///
    /// Each wave takes a snapshot of both queues, resolves every request group
    /// once (reverse fetches, then entity fetches, then batch processors), and
    /// only then runs the snapshotted hooks. Work queued while a wave runs is
    /// picked up by the next one.
    pub(crate) async fn finish(&self, fetchers: &FetcherFactory<C>) -> RefractResult<()> {
        loop {
            let (requests, hooks) = {
                let mut queue = lock(&self.queue);
                (
                    std::mem::take(&mut queue.requests),
                    std::mem::take(&mut queue.hooks),
                )
            };
            if requests.is_empty() && hooks.is_empty() {
                return Ok(());
            }

            let wave = self.waves.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(limit) = self.config.wave_limit {
                if wave > limit {
                    return Err(RefractError::WaveLimitExceeded { limit });
                }
            }

            let mut reverse: IndexMap<ReverseKey, Vec<KeyedRequest>> = IndexMap::new();
            let mut entity: IndexMap<MapperKey, Vec<KeyedRequest>> = IndexMap::new();
            let mut batch: IndexMap<ByAddress<Arc<dyn BatchProcessor<C>>>, Vec<(Value, ApplyFn)>> =
                IndexMap::new();
            let request_count = requests.len();
            for request in requests {
                match request {
                    FetchRequest::Reverse { fetcher, request } => {
                        reverse.entry(fetcher).or_default().push(request)
                    }
                    FetchRequest::Entity { mapper, request } => {
                        entity.entry(mapper).or_default().push(request)
                    }
                    FetchRequest::Batch {
                        processor,
                        key,
                        apply,
                    } => batch
                        .entry(ByAddress(processor))
                        .or_default()
                        .push((key, apply)),
                }
            }
            log::debug!(
                "refract: wave {}: {} requests in {} groups, {} hooks",
                wave,
                request_count,
                reverse.len() + entity.len() + batch.len(),
                hooks.len()
            );

            for (key, group) in reverse {
                self.fetch_groups.fetch_add(1, Ordering::SeqCst);
                fetchers.reverse(&key)?.apply(group, self).await?;
            }
            for (key, group) in entity {
                self.fetch_groups.fetch_add(1, Ordering::SeqCst);
                fetchers.entity(&key)?.apply(group, self).await?;
            }
            for (processor, group) in batch {
                self.fetch_groups.fetch_add(1, Ordering::SeqCst);
                self.apply_batch(processor.0, group).await?;
            }

            for pending in hooks {
                (pending.hook)(pending.destination, self.ambient.clone()).await?;
            }
        }
    }

    async fn apply_batch(
        &self,
        processor: Arc<dyn BatchProcessor<C>>,
        group: Vec<(Value, ApplyFn)>,
    ) -> RefractResult<()> {
        let expected = group.len();
        let applied = Arc::new(AtomicUsize::new(0));
        let items = group
            .into_iter()
            .map(|(key, apply)| BatchItem::new(key, apply, applied.clone()))
            .collect();
        processor.apply(items, self.ambient.clone()).await?;

        let applied = applied.load(Ordering::SeqCst);
        if applied != expected {
            return Err(RefractError::BatchIncomplete {
                processor: processor.name(),
                expected,
                applied,
            });
        }
        Ok(())
    }
}
