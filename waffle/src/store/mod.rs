use std::fmt;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::{InvalidDefinition, StoreError};

pub mod memory;
pub mod redis;

pub use memory::InMemoryStore;
pub use self::redis::RedisStore;

// Change events are small, a lagging listener falls back to a full flush.
pub const CHANGE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Flag,
    Switch,
    Sample,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Flag => "flag",
            RecordKind::Switch => "switch",
            RecordKind::Sample => "sample",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named definition held by a [`RecordStore`].
pub trait Record: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    const KIND: RecordKind;

    fn name(&self) -> &str;

    /// The record written when a missing name is auto-created with the
    /// configured default.
    fn from_default(name: &str, active: bool) -> Self;

    fn validate(&self) -> Result<(), InvalidDefinition>;
}

/// Published by a store after a record is created, replaced or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub kind: RecordKind,
    pub name: String,
}

#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<R>, StoreError>;

    /// Creates `name` from [`Record::from_default`]. Creating a name that
    /// already exists returns the stored record instead of failing.
    async fn create(&self, name: &str, active: bool) -> Result<R, StoreError>;

    async fn put(&self, record: R) -> Result<(), StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<RecordChange>;
}

pub(crate) fn publish(changes: &broadcast::Sender<RecordChange>, kind: RecordKind, name: &str) {
    let change = RecordChange {
        kind,
        name: name.to_string(),
    };
    if changes.send(change).is_err() {
        tracing::trace!(kind = %kind, name, "no change subscribers");
    }
}
