//! Sequence allocation for envelopes
//!
//! Sequences are globally monotonic, which makes them monotonic within any
//! single key as well. The consumer uses them to discard deliveries that
//! describe an older logical state than the one already applied.

use crate::config::RedisConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

const SEQ_KEY: &str = "userdir:events:seq";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sequencer: Send + Sync {
    /// Allocate the next sequence number
    async fn next(&self) -> Result<i64>;
}

/// Redis INCR-backed sequencer
#[derive(Clone)]
pub struct RedisSequencer {
    conn: ConnectionManager,
}

impl RedisSequencer {
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
impl Sequencer for RedisSequencer {
    async fn next(&self) -> Result<i64> {
        let mut conn = self.conn.clone();
        let seq: i64 = conn
            .incr(SEQ_KEY, 1)
            .await
            .map_err(|e| AppError::Retryable(format!("Sequence allocation failed: {}", e)))?;
        Ok(seq)
    }
}
