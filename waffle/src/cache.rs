use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::time::timeout;

use crate::config::Config;
use crate::errors::StoreError;
use crate::metrics_consts::{
    CACHE_INVALIDATIONS_COUNTER, RECORD_CACHE_HIT_COUNTER, RECORD_CACHE_MISS_COUNTER,
    STORE_ERRORS_COUNTER,
};
use crate::metrics_utils::{inc, kind_label};
use crate::store::{Record, RecordStore};

const MAX_LOAD_ATTEMPTS: usize = 3;

#[derive(Clone)]
struct Cached<R> {
    record: Option<R>,
    /// Generation observed before the store read started.
    loaded_at: u64,
}

/// Read-through cache in front of a [`RecordStore`].
///
/// - Absent records are cached as `None`, so a missing name costs one store
///   read per TTL rather than one per request.
/// - Concurrent misses on the same name coalesce into a single store read
///   (`try_get_with`).
/// - Store reads are bounded by `fetch_timeout`. Failed or timed out reads are
///   returned to the caller and never cached.
/// - A read that started before an invalidation of its name is stale, even if
///   it finishes (and lands in the cache) afterwards. Stale entries are
///   reloaded instead of served.
pub struct RecordCache<R: Record> {
    store: Arc<dyn RecordStore<R>>,
    cache: Cache<String, Cached<R>>,
    fetch_timeout: Duration,
    generation: Arc<AtomicU64>,
    flushed_at: Arc<AtomicU64>,
    invalidated_at: moka::sync::Cache<String, u64>,
}

impl<R: Record> RecordCache<R> {
    pub fn new(
        store: Arc<dyn RecordStore<R>>,
        max_capacity: u64,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        // Outlives any entry whose read was in flight when the name was
        // invalidated.
        let invalidated_at = moka::sync::Cache::builder()
            .time_to_live(ttl + fetch_timeout)
            .build();

        RecordCache {
            store,
            cache,
            fetch_timeout,
            generation: Arc::new(AtomicU64::new(0)),
            flushed_at: Arc::new(AtomicU64::new(0)),
            invalidated_at,
        }
    }

    pub fn from_config(store: Arc<dyn RecordStore<R>>, config: &Config) -> Self {
        Self::new(
            store,
            config.cache_max_entries,
            config.cache_ttl(),
            config.store_timeout(),
        )
    }

    pub fn store(&self) -> &Arc<dyn RecordStore<R>> {
        &self.store
    }

    pub async fn get(&self, name: &str) -> Result<Option<R>, StoreError> {
        let labels = [kind_label(R::KIND)];
        if let Some(cached) = self.cache.get(name).await {
            if self.is_fresh(name, &cached) {
                inc(RECORD_CACHE_HIT_COUNTER, &labels, 1);
                return Ok(cached.record);
            }
            self.cache.invalidate(name).await;
        }

        inc(RECORD_CACHE_MISS_COUNTER, &labels, 1);

        let mut loaded = self.load(name).await?;
        for _ in 1..MAX_LOAD_ATTEMPTS {
            if self.is_fresh(name, &loaded) {
                break;
            }
            tracing::debug!(kind = %R::KIND, name, "record changed during read, reloading");
            self.cache.invalidate(name).await;
            loaded = self.load(name).await?;
        }
        Ok(loaded.record)
    }

    async fn load(&self, name: &str) -> Result<Cached<R>, StoreError> {
        let store = self.store.clone();
        let generation = self.generation.clone();
        let fetch_timeout = self.fetch_timeout;
        let key = name.to_string();
        self.cache
            .try_get_with(key.clone(), async move {
                let loaded_at = generation.load(Ordering::SeqCst);
                let result = match timeout(fetch_timeout, store.get(&key)).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Timeout),
                };
                if let Err(e) = &result {
                    inc(STORE_ERRORS_COUNTER, &[kind_label(R::KIND)], 1);
                    tracing::warn!(kind = %R::KIND, name = %key, error = %e, "record store read failed");
                }
                result.map(|record| Cached { record, loaded_at })
            })
            .await
            .map_err(|e| (*e).clone())
    }

    fn is_fresh(&self, name: &str, cached: &Cached<R>) -> bool {
        cached.loaded_at >= self.flushed_at.load(Ordering::SeqCst)
            && cached.loaded_at >= self.invalidated_at.get(name).unwrap_or(0)
    }

    pub async fn invalidate(&self, name: &str) {
        inc(CACHE_INVALIDATIONS_COUNTER, &[kind_label(R::KIND)], 1);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.invalidated_at.insert(name.to_string(), generation);
        self.cache.invalidate(name).await;
    }

    pub fn invalidate_all(&self) {
        inc(CACHE_INVALIDATIONS_COUNTER, &[kind_label(R::KIND)], 1);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.flushed_at.fetch_max(generation, Ordering::SeqCst);
        self.cache.invalidate_all();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }
}

impl<R: Record> Clone for RecordCache<R> {
    fn clone(&self) -> Self {
        RecordCache {
            store: Arc::clone(&self.store),
            cache: self.cache.clone(),
            fetch_timeout: self.fetch_timeout,
            generation: Arc::clone(&self.generation),
            flushed_at: Arc::clone(&self.flushed_at),
            invalidated_at: self.invalidated_at.clone(),
        }
    }
}
