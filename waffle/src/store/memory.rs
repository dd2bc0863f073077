use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use super::{publish, Record, RecordChange, RecordStore, CHANGE_CHANNEL_CAPACITY};
use crate::errors::StoreError;

/// Process-local store. Name uniqueness is enforced under the write lock, so
/// racing creators all get the same record back.
pub struct InMemoryStore<R: Record> {
    records: RwLock<HashMap<String, R>>,
    changes: broadcast::Sender<RecordChange>,
}

impl<R: Record> InMemoryStore<R> {
    pub fn new() -> Self {
        Self::with_records(std::iter::empty())
    }

    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let records = records
            .into_iter()
            .map(|record| (record.name().to_string(), record))
            .collect();
        InMemoryStore {
            records: RwLock::new(records),
            changes,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl<R: Record> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for InMemoryStore<R> {
    async fn get(&self, name: &str) -> Result<Option<R>, StoreError> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn create(&self, name: &str, active: bool) -> Result<R, StoreError> {
        let created = {
            let mut records = self.records.write().await;
            match records.entry(name.to_string()) {
                Entry::Occupied(existing) => return Ok(existing.get().clone()),
                Entry::Vacant(slot) => slot.insert(R::from_default(name, active)).clone(),
            }
        };
        publish(&self.changes, R::KIND, name);
        Ok(created)
    }

    async fn put(&self, record: R) -> Result<(), StoreError> {
        let name = record.name().to_string();
        self.records.write().await.insert(name.clone(), record);
        publish(&self.changes, R::KIND, &name);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let removed = self.records.write().await.remove(name);
        if removed.is_some() {
            publish(&self.changes, R::KIND, name);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}
