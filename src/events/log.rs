//! Durable event log over Redis Streams
//!
//! A single stream plus a consumer group gives the delivery substrate the
//! pipeline needs: appends are totally ordered (which implies per-key
//! order), deliveries stay in the pending-entries list until acknowledged,
//! and an acknowledged offset never comes back. Together that is
//! at-least-once delivery with a commit cursor owned by the consumer.

use crate::config::{EventStreamConfig, RedisConfig};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One delivered entry: the payload plus the offset to acknowledge
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Stream entry id, e.g. `1716041234567-0`
    pub offset: String,
    pub payload: Vec<u8>,
}

/// Ordered, replayable, at-least-once delivery substrate
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an envelope under a partition key; returns the assigned offset
    async fn append(&self, key: &str, payload: &[u8]) -> Result<String>;

    /// Block up to `timeout` for the next delivery. `None` on timeout is
    /// not an error. Uncommitted deliveries from a previous run are
    /// replayed before new entries.
    async fn poll(&self, timeout: Duration) -> Result<Option<LogRecord>>;

    /// Acknowledge a delivery, advancing the commit cursor past it
    async fn commit(&self, offset: &str) -> Result<()>;
}

/// Redis Streams implementation
pub struct RedisStreamLog {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    /// True until the pending-entries list has been drained after startup
    replaying: AtomicBool,
}

impl RedisStreamLog {
    /// Connect and make sure the consumer group exists. A failure here is
    /// fatal for the consumer process; callers exit and let the supervisor
    /// restart them.
    pub async fn new(redis: &RedisConfig, events: &EventStreamConfig) -> Result<Self> {
        let client = redis::Client::open(redis.url.as_str())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create Redis client: {}", e)))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to connect to Redis: {}", e)))?;

        // XGROUP CREATE is idempotent apart from the BUSYGROUP reply
        let created: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&events.stream)
            .arg(&events.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        if let Err(e) = created {
            let busy = e
                .detail()
                .map(|d| d.contains("BUSYGROUP"))
                .unwrap_or(false)
                || e.code() == Some("BUSYGROUP");
            if !busy {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Failed to create consumer group: {}",
                    e
                )));
            }
        }

        Ok(Self {
            conn,
            stream: events.stream.clone(),
            group: events.group.clone(),
            consumer: events.consumer.clone(),
            replaying: AtomicBool::new(true),
        })
    }

    fn extract_record(reply: StreamReadReply) -> Option<LogRecord> {
        let entry = reply.keys.into_iter().next()?.ids.into_iter().next()?;
        let payload: Vec<u8> = entry.get("payload").unwrap_or_default();
        Some(LogRecord {
            offset: entry.id,
            payload,
        })
    }
}

#[async_trait]
impl EventLog for RedisStreamLog {
    async fn append(&self, key: &str, payload: &[u8]) -> Result<String> {
        let mut conn = self.conn.clone();
        let offset: String = conn
            .xadd(
                &self.stream,
                "*",
                &[("key", key.as_bytes()), ("payload", payload)],
            )
            .await
            .map_err(|e| AppError::Retryable(format!("Event log append failed: {}", e)))?;
        Ok(offset)
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<LogRecord>> {
        let mut conn = self.conn.clone();

        // "0" re-reads this consumer's still-pending deliveries; ">" reads
        // entries never delivered to the group.
        let id = if self.replaying.load(Ordering::Acquire) {
            "0"
        } else {
            ">"
        };

        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(timeout.as_millis() as usize);

        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[id], &opts)
            .await?;

        match Self::extract_record(reply) {
            Some(record) => Ok(Some(record)),
            None => {
                if self.replaying.swap(false, Ordering::AcqRel) {
                    tracing::debug!("Pending-entry replay complete, switching to live reads");
                }
                Ok(None)
            }
        }
    }

    async fn commit(&self, offset: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(&self.stream, &self.group, &[offset]).await?;
        Ok(())
    }
}
