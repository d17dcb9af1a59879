//! Storage backends for version records.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::record::VersionRecord;
use crate::error::RegistryError;

/// Key/value store holding one expiring record per key.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Writes `record` at `key`, replacing any previous record, expiring after `ttl`.
    async fn put(
        &self,
        key: &str,
        record: &VersionRecord,
        ttl: Duration,
    ) -> Result<(), RegistryError>;

    /// Reads the record at `key`; `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<VersionRecord>, RegistryError>;
}

/// Redis-backed store. Records are hashes; the write and its expiry go out
/// in one MULTI/EXEC block.
#[derive(Clone)]
pub struct RedisVersionStore {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
}

impl RedisVersionStore {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| RegistryError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| RegistryError::ConnectionFailed(e.to_string()))?;

        Ok(Self { redis })
    }

    /// Creates a store from an existing ConnectionManager.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl VersionStore for RedisVersionStore {
    async fn put(
        &self,
        key: &str,
        record: &VersionRecord,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        let mut conn = self.redis.clone();

        let mut hset = redis::cmd("HSET");
        hset.arg(key);
        for (field, value) in record.to_fields() {
            hset.arg(field).arg(value);
        }

        // DEL first so fields from an older record layout never linger.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(key)
            .ignore()
            .add_command(hset)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<VersionRecord>, RegistryError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        VersionRecord::from_fields(key, &fields)
    }
}

/// In-process store with the same expiry semantics, for embedding tests and
/// dry runs.
#[derive(Default)]
pub struct MemoryVersionStore {
    entries: Mutex<HashMap<String, (VersionRecord, Instant)>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (VersionRecord, Instant)>> {
        // A poisoned map still holds consistent entries; each write is a single insert.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn put(
        &self,
        key: &str,
        record: &VersionRecord,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        self.lock()
            .insert(key.to_string(), (record.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<VersionRecord>, RegistryError> {
        let mut entries = self.lock();
        let now = Instant::now();
        if matches!(entries.get(key), Some((_, expires_at)) if *expires_at <= now) {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(record, _)| record.clone()))
    }
}
