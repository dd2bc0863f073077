use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tokio::time::timeout;

use super::{publish, Record, RecordChange, RecordKind, RecordStore, CHANGE_CHANNEL_CAPACITY};
use crate::errors::StoreError;

// Upper bound for a single command, the record cache applies its own tighter
// timeout on the request path.
const REDIS_TIMEOUT_MILLISECS: u64 = 500;

/// Records stored as JSON strings under `{prefix}{kind}:{name}`.
///
/// Change events are published to subscribers of this handle only, writers in
/// other processes are picked up when the cache entry expires.
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    changes: broadcast::Sender<RecordChange>,
}

impl RedisStore {
    pub fn new(addr: &str, prefix: impl Into<String>) -> Result<RedisStore, StoreError> {
        let client = redis::Client::open(addr)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(RedisStore {
            client,
            prefix: prefix.into(),
            changes,
        })
    }

    pub fn key(&self, kind: RecordKind, name: &str) -> String {
        format!("{}{}:{}", self.prefix, kind, name)
    }

    async fn connection(&self) -> Result<redis::aio::Connection, StoreError> {
        let conn = timeout(
            Duration::from_millis(REDIS_TIMEOUT_MILLISECS),
            self.client.get_async_connection(),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;
        Ok(conn)
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for RedisStore {
    async fn get(&self, name: &str) -> Result<Option<R>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key(R::KIND, name)).await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, name: &str, active: bool) -> Result<R, StoreError> {
        let record = R::from_default(name, active);
        let payload = serde_json::to_string(&record)?;
        let key = self.key(R::KIND, name);

        let mut conn = self.connection().await?;
        let created: bool = conn.set_nx(&key, payload).await?;
        if created {
            publish(&self.changes, R::KIND, name);
            return Ok(record);
        }

        // Lost the race, hand back whatever the winner wrote.
        let existing: Option<String> = conn.get(&key).await?;
        match existing {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(StoreError::CreateConflict(name.to_string())),
        }
    }

    async fn put(&self, record: R) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&record)?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.key(R::KIND, record.name()), payload)
            .await?;
        publish(&self.changes, R::KIND, record.name());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(self.key(R::KIND, name)).await?;
        if removed > 0 {
            publish(&self.changes, R::KIND, name);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::flag_models::FlagRecord;
    use crate::switches::SwitchRecord;

    #[test]
    fn test_keys_are_namespaced_by_kind() {
        let store = RedisStore::new("redis://localhost:6379/", "waffle:").unwrap();

        assert_eq!(store.key(RecordKind::Flag, "search"), "waffle:flag:search");
        assert_eq!(
            store.key(RecordKind::Switch, "search"),
            "waffle:switch:search"
        );
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        match RedisStore::new("not a url", "waffle:") {
            Err(StoreError::Unavailable(_)) => (),
            Err(other) => panic!("Expected Unavailable, got {:?}", other),
            Ok(_) => panic!("Expected an error for an invalid url"),
        }
    }

    #[tokio::test]
    async fn test_cant_connect_to_redis_error_is_unavailable() {
        let store = RedisStore::new("redis://localhost:1111/", "waffle:").unwrap();

        let result: Result<Option<FlagRecord>, StoreError> = store.get("search").await;
        match result {
            Err(StoreError::Unavailable(_)) | Err(StoreError::Timeout) => (),
            other => panic!("Expected an unavailable store, got {:?}", other),
        };

        let result: Result<SwitchRecord, StoreError> = store.create("search", true).await;
        assert!(result.is_err());
    }
}
