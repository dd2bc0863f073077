use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::broadcast;

use crate::config::{Config, DEFAULT_TEST_CONFIG};
use crate::engine::{Stores, Waffle};
use crate::errors::StoreError;
use crate::flags::flag_models::FlagRecord;
use crate::flags::rules::RuleSet;
use crate::samples::SampleRecord;
use crate::store::{InMemoryStore, Record, RecordChange, RecordStore};
use crate::switches::SwitchRecord;

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

/// In-memory store that counts calls and can be made slow or broken.
pub struct MockStore<R: Record> {
    inner: InMemoryStore<R>,
    get_calls: AtomicU32,
    create_calls: AtomicU32,
    get_delay: Option<Duration>,
    read_stall: Option<Duration>,
    failure: Option<StoreError>,
}

impl<R: Record> MockStore<R> {
    pub fn new() -> Self {
        Self::with_records(std::iter::empty())
    }

    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        MockStore {
            inner: InMemoryStore::with_records(records),
            get_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            get_delay: None,
            read_stall: None,
            failure: None,
        }
    }

    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    /// Reads return what the store held when they started, but only after
    /// `stall` has passed.
    pub fn with_read_stall(mut self, stall: Duration) -> Self {
        self.read_stall = Some(stall);
        self
    }

    /// Every call fails with `error`.
    pub fn failing(mut self, error: StoreError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryStore<R> {
        &self.inner
    }

    fn check(&self) -> Result<(), StoreError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl<R: Record> Default for MockStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MockStore<R> {
    async fn get(&self, name: &str) -> Result<Option<R>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        let record = self.inner.get(name).await?;
        if let Some(stall) = self.read_stall {
            tokio::time::sleep(stall).await;
        }
        Ok(record)
    }

    async fn create(&self, name: &str, active: bool) -> Result<R, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.create(name, active).await
    }

    async fn put(&self, record: R) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put(record).await
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(name).await
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.inner.subscribe()
    }
}

/// Handles on the stores behind a [`Waffle`] built by [`setup_waffle`].
pub struct TestStores {
    pub flags: Arc<MockStore<FlagRecord>>,
    pub switches: Arc<MockStore<SwitchRecord>>,
    pub samples: Arc<MockStore<SampleRecord>>,
}

impl TestStores {
    pub fn new() -> Self {
        TestStores {
            flags: Arc::new(MockStore::new()),
            switches: Arc::new(MockStore::new()),
            samples: Arc::new(MockStore::new()),
        }
    }

    pub fn with_flags(mut self, flags: impl IntoIterator<Item = FlagRecord>) -> Self {
        self.flags = Arc::new(MockStore::with_records(flags));
        self
    }

    pub fn with_flag_store(mut self, store: MockStore<FlagRecord>) -> Self {
        self.flags = Arc::new(store);
        self
    }

    pub fn stores(&self) -> Stores {
        Stores {
            flags: self.flags.clone(),
            switches: self.switches.clone(),
            samples: self.samples.clone(),
        }
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}

pub fn setup_waffle(config: Option<&Config>, stores: &TestStores) -> Waffle {
    let config = config.unwrap_or(&DEFAULT_TEST_CONFIG);
    Waffle::new(config, stores.stores(), RuleSet::builtin())
}
