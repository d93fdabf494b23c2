//! Redis-backed queue store
//!
//! Each gender queue is a Redis list at `{prefix}:{male|female}` holding JSON
//! participant records. The multi-step primitives run as Lua scripts so they
//! are atomic on the server and safe to share between service instances.

use crate::error::{MeetingError, Result};
use crate::queue::store::QueueStore;
use crate::types::{Gender, Identity, Participant};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, info};

/// Drop every entry for ARGV[1], then RPUSH ARGV[2]. Returns 1 if replaced.
const PUSH_BACK_SCRIPT: &str = r#"
local entries = redis.call('LRANGE', KEYS[1], 0, -1)
local replaced = 0
for _, raw in ipairs(entries) do
  local ok, record = pcall(cjson.decode, raw)
  if ok and record['identity'] == ARGV[1] then
    redis.call('LREM', KEYS[1], 0, raw)
    replaced = 1
  end
end
redis.call('RPUSH', KEYS[1], ARGV[2])
return replaced
"#;

/// Drop every entry for ARGV[1]. Returns the number of entries removed.
const REMOVE_SCRIPT: &str = r#"
local entries = redis.call('LRANGE', KEYS[1], 0, -1)
local removed = 0
for _, raw in ipairs(entries) do
  local ok, record = pcall(cjson.decode, raw)
  if ok and record['identity'] == ARGV[1] then
    removed = removed + redis.call('LREM', KEYS[1], 0, raw)
  end
end
return removed
"#;

/// Remove every entry whose identity is in ARGV, returning the raw records
/// in list order.
const DEQUEUE_SET_SCRIPT: &str = r#"
local wanted = {}
for _, identity in ipairs(ARGV) do
  wanted[identity] = true
end
local entries = redis.call('LRANGE', KEYS[1], 0, -1)
local removed = {}
for _, raw in ipairs(entries) do
  local ok, record = pcall(cjson.decode, raw)
  if ok and wanted[record['identity']] then
    redis.call('LREM', KEYS[1], 1, raw)
    table.insert(removed, raw)
  end
end
return removed
"#;

/// Key of the list holding one gender's queue
pub fn queue_key(prefix: &str, gender: Gender) -> String {
    format!("{}:{}", prefix, gender.as_str())
}

fn encode(participant: &Participant) -> Result<String> {
    serde_json::to_string(participant).map_err(|e| {
        MeetingError::QueueStoreFailure {
            reason: format!("Failed to serialize participant: {}", e),
        }
        .into()
    })
}

fn decode(raw: &str) -> Result<Participant> {
    serde_json::from_str(raw).map_err(|e| {
        MeetingError::QueueStoreFailure {
            reason: format!("Malformed queue record {:?}: {}", raw, e),
        }
        .into()
    })
}

fn store_error(operation: &str, error: redis::RedisError) -> anyhow::Error {
    MeetingError::QueueStoreFailure {
        reason: format!("Redis {} failed: {}", operation, error),
    }
    .into()
}

/// Shared-store queue backed by Redis lists
#[derive(Clone)]
pub struct RedisQueueStore {
    connection: ConnectionManager,
    key_prefix: String,
    push_back_script: Script,
    remove_script: Script,
    dequeue_set_script: Script,
}

impl RedisQueueStore {
    /// Connect to Redis and prepare the queue scripts
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| store_error("open", e))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| store_error("connect", e))?;

        info!(
            "Connected queue store to Redis - prefix: '{}'",
            key_prefix
        );

        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
            push_back_script: Script::new(PUSH_BACK_SCRIPT),
            remove_script: Script::new(REMOVE_SCRIPT),
            dequeue_set_script: Script::new(DEQUEUE_SET_SCRIPT),
        })
    }

    fn key(&self, gender: Gender) -> String {
        queue_key(&self.key_prefix, gender)
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push_back(&self, gender: Gender, participant: Participant) -> Result<bool> {
        let record = encode(&participant)?;
        let mut connection = self.connection.clone();

        let replaced: i64 = self
            .push_back_script
            .key(self.key(gender))
            .arg(&participant.identity)
            .arg(record)
            .invoke_async(&mut connection)
            .await
            .map_err(|e| store_error("push_back", e))?;

        Ok(replaced > 0)
    }

    async fn remove(&self, gender: Gender, identity: &str) -> Result<bool> {
        let mut connection = self.connection.clone();

        let removed: i64 = self
            .remove_script
            .key(self.key(gender))
            .arg(identity)
            .invoke_async(&mut connection)
            .await
            .map_err(|e| store_error("remove", e))?;

        Ok(removed > 0)
    }

    async fn dequeue_set(
        &self,
        gender: Gender,
        identities: &[Identity],
    ) -> Result<Vec<Participant>> {
        if identities.is_empty() {
            return Ok(Vec::new());
        }

        let mut connection = self.connection.clone();
        let mut invocation = self.dequeue_set_script.key(self.key(gender));
        for identity in identities {
            invocation.arg(identity);
        }

        let raw: Vec<String> = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(|e| store_error("dequeue_set", e))?;

        debug!(
            "Redis dequeue_set on {} - requested: {}, removed: {}",
            gender,
            identities.len(),
            raw.len()
        );

        raw.iter().map(|entry| decode(entry)).collect()
    }

    async fn snapshot(&self, gender: Gender) -> Result<Vec<Participant>> {
        let mut connection = self.connection.clone();

        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key(gender))
            .arg(0)
            .arg(-1)
            .query_async(&mut connection)
            .await
            .map_err(|e| store_error("snapshot", e))?;

        raw.iter().map(|entry| decode(entry)).collect()
    }

    async fn length(&self, gender: Gender) -> Result<usize> {
        let mut connection = self.connection.clone();

        redis::cmd("LLEN")
            .arg(self.key(gender))
            .query_async(&mut connection)
            .await
            .map_err(|e| store_error("length", e))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionHandle;
    use uuid::Uuid;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    /// Store on a prefix no other run shares
    async fn create_test_store() -> RedisQueueStore {
        let prefix = format!("meeting-matcher-test:{}", Uuid::new_v4());
        RedisQueueStore::connect(&redis_url(), &prefix)
            .await
            .expect("Failed to connect to Redis")
    }

    async fn cleanup(store: &RedisQueueStore) {
        let mut connection = store.connection.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(store.key(Gender::Male))
            .arg(store.key(Gender::Female))
            .query_async(&mut connection)
            .await
            .unwrap();
    }

    fn participant(id: &str) -> Participant {
        Participant::new(id, ConnectionHandle::new(format!("conn-{}", id)))
    }

    async fn names(store: &RedisQueueStore, gender: Gender) -> Vec<String> {
        store
            .snapshot(gender)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.identity)
            .collect()
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_push_back_moves_to_tail() {
        let store = create_test_store().await;

        for id in ["a", "b", "c"] {
            assert!(!store.push_back(Gender::Male, participant(id)).await.unwrap());
        }
        let rejoined = Participant::new("a", ConnectionHandle::new("fresh"));
        assert!(store.push_back(Gender::Male, rejoined).await.unwrap());

        assert_eq!(names(&store, Gender::Male).await, vec!["b", "c", "a"]);
        assert_eq!(store.length(Gender::Male).await.unwrap(), 3);
        let tail = store.snapshot(Gender::Male).await.unwrap().pop().unwrap();
        assert_eq!(tail.connection_handle.as_str(), "fresh");
        assert_eq!(store.length(Gender::Female).await.unwrap(), 0);

        cleanup(&store).await;
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_remove_only_touches_identity() {
        let store = create_test_store().await;
        for id in ["x", "y", "z"] {
            store.push_back(Gender::Female, participant(id)).await.unwrap();
        }

        assert!(store.remove(Gender::Female, "y").await.unwrap());
        assert!(!store.remove(Gender::Female, "y").await.unwrap());
        assert!(!store.remove(Gender::Male, "x").await.unwrap());

        assert_eq!(names(&store, Gender::Female).await, vec!["x", "z"]);

        cleanup(&store).await;
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_dequeue_set_keeps_list_order() {
        let store = create_test_store().await;
        for id in ["a", "b", "c", "d", "e"] {
            store.push_back(Gender::Male, participant(id)).await.unwrap();
        }

        let requested = vec!["d".to_string(), "b".to_string(), "gone".to_string()];
        let removed = store.dequeue_set(Gender::Male, &requested).await.unwrap();

        let removed: Vec<&str> = removed.iter().map(|p| p.identity.as_str()).collect();
        assert_eq!(removed, vec!["b", "d"]);
        assert_eq!(names(&store, Gender::Male).await, vec!["a", "c", "e"]);
        assert!(store.dequeue_set(Gender::Male, &[]).await.unwrap().is_empty());

        cleanup(&store).await;
    }

    #[test]
    fn test_queue_keys() {
        assert_eq!(queue_key("meeting:queue", Gender::Male), "meeting:queue:male");
        assert_eq!(queue_key("q", Gender::Female), "q:female");
    }

    #[test]
    fn test_record_layout() {
        let participant = Participant::new("alice", ConnectionHandle::new("sock-9"));
        let raw = encode(&participant).unwrap();

        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["identity"], "alice");
        assert_eq!(value["connection_handle"], "sock-9");

        assert_eq!(decode(&raw).unwrap(), participant);
    }

    #[test]
    fn test_malformed_record_is_store_failure() {
        let error = decode("{not json").unwrap_err();
        assert!(matches!(
            MeetingError::find(&error),
            Some(MeetingError::QueueStoreFailure { .. })
        ));
    }
}
