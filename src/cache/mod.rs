//! Redis-backed read-through cache for directory users
//!
//! The cache is never the source of truth. Entries are written on
//! read-miss backfill and eagerly by the producer after a successful
//! publish; they expire passively after a fixed TTL. Expiry is enforced
//! at read time against the timestamp stored inside the entry, with the
//! Redis `EX` option as server-side garbage collection. Concurrent puts
//! for the same key are last-writer-wins.

use crate::config::RedisConfig;
use crate::domain::UserView;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Fixed TTL for user snapshots
pub const USER_TTL: Duration = Duration::from_secs(300);

/// Cache key for a login. The format is part of the wire contract shared
/// with older deployments.
pub fn user_key(login: &str) -> String {
    format!("user_login: {}", login)
}

/// Raw key-value store underneath the cache
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Redis-backed cache store
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create Redis client: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to connect to Redis: {}", e)))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

/// One cached snapshot with its expiry timestamp
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: UserView,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: UserView, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Read-through cache over user snapshots
#[derive(Clone)]
pub struct UserCache {
    store: Arc<dyn CacheStore>,
}

impl UserCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Look up a cached snapshot. Expired or undecodable entries are
    /// dropped and reported as a miss.
    pub async fn get_user(&self, login: &str) -> Result<Option<UserView>> {
        let key = user_key(login);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, "Dropping undecodable cache entry: {}", e);
                self.store.delete(&key).await?;
                return Ok(None);
            }
        };

        if entry.is_expired(Utc::now()) {
            self.store.delete(&key).await?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    /// Store a snapshot under the standard TTL
    pub async fn put_user(&self, view: &UserView) -> Result<()> {
        let key = user_key(&view.login);
        let entry = CacheEntry::new(view.clone(), USER_TTL);
        let serialized = serde_json::to_string(&entry)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cache serialize error: {}", e)))?;
        self.store.set(&key, &serialized, USER_TTL).await
    }

    /// Backfill a snapshot only when the key is a miss. Bulk read paths
    /// use this so system-of-record state cannot clobber a fresher entry
    /// written by the producer.
    pub async fn warm_user(&self, view: &UserView) -> Result<()> {
        if self.get_user(&view.login).await?.is_some() {
            return Ok(());
        }
        self.put_user(view).await
    }

    /// Drop a login's snapshot
    pub async fn invalidate(&self, login: &str) -> Result<()> {
        self.store.delete(&user_key(login)).await
    }
}
