//! Directory event consumer
//!
//! A single-threaded polling loop per process; the consumer is the only
//! writer of the `users` table, so single-writer discipline replaces
//! locking. Each cycle runs Idle → Polling → Processing → Committing:
//! the commit (`XACK`) happens only after the apply transaction is
//! durable, so a crash between the two re-delivers the envelope and the
//! idempotent apply absorbs it. Malformed envelopes are logged, acked
//! and skipped so they never block the pipeline.

use crate::error::Result;
use crate::events::envelope::{DirectoryOp, EventEnvelope};
use crate::events::log::{EventLog, LogRecord};
use crate::repository::{ApplyOutcome, UserRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What one consumer cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Poll timed out; nothing to do
    Idle,
    /// Poison message: logged, acknowledged, skipped
    Poison,
    /// Apply failed unrecoverably: logged, acknowledged, skipped
    Skipped,
    /// An envelope went through apply and commit
    Applied(ApplyOutcome),
}

pub struct DirectoryConsumer<L: EventLog, R: UserRepository> {
    log: Arc<L>,
    repo: Arc<R>,
    poll_timeout: Duration,
    retry_backoff: Duration,
}

impl<L: EventLog, R: UserRepository> DirectoryConsumer<L, R> {
    pub fn new(log: Arc<L>, repo: Arc<R>, poll_timeout: Duration) -> Self {
        Self {
            log,
            repo,
            poll_timeout,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Backoff between re-attempts of the same envelope
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Run until `shutdown` is set. The flag is checked between cycles
    /// only, so an in-flight apply/commit always completes before exit
    /// and the cursor never advances past unconfirmed work.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        info!("Consumer loop started");
        while !shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.step().await {
                // Transient poll failures are not fatal; back off and retry
                warn!("Consumer cycle failed: {}", e);
                tokio::time::sleep(self.retry_backoff).await;
            }
        }
        info!("Consumer loop stopped");
        Ok(())
    }

    /// One full cycle: poll, process, commit
    pub async fn step(&self) -> Result<StepOutcome> {
        let Some(record) = self.log.poll(self.poll_timeout).await? else {
            return Ok(StepOutcome::Idle);
        };
        self.process(record).await
    }

    async fn process(&self, record: LogRecord) -> Result<StepOutcome> {
        let envelope = match EventEnvelope::decode(&record.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(offset = %record.offset, "Skipping poison message: {}", e);
                self.log.commit(&record.offset).await?;
                return Ok(StepOutcome::Poison);
            }
        };

        let outcome = self.apply_with_retry(&envelope).await;
        self.log.commit(&record.offset).await?;
        Ok(match outcome {
            Some(outcome) => StepOutcome::Applied(outcome),
            None => StepOutcome::Skipped,
        })
    }

    /// Apply an envelope, re-attempting on transient store failures
    /// without acknowledging. The apply itself is transactional, so a
    /// failed attempt leaves no partial write behind. `None` means the
    /// envelope was abandoned on an unrecoverable error.
    async fn apply_with_retry(&self, envelope: &EventEnvelope) -> Option<ApplyOutcome> {
        loop {
            match self.apply(envelope).await {
                Ok(outcome) => {
                    self.trace_outcome(envelope, outcome);
                    return Some(outcome);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        event_id = %envelope.event_id,
                        "Transient failure applying envelope, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => {
                    // Nothing a retry can fix; absorb it like a poison
                    // message rather than wedging the partition
                    error!(
                        event_id = %envelope.event_id,
                        "Unrecoverable error applying envelope, skipping: {}",
                        e
                    );
                    return None;
                }
            }
        }
    }

    async fn apply(&self, envelope: &EventEnvelope) -> Result<ApplyOutcome> {
        match &envelope.op {
            DirectoryOp::Create { data } => self.repo.apply_create(data, envelope.seq).await,
            DirectoryOp::Update { data, old_key } => {
                let prior = old_key.as_deref().unwrap_or(&data.login);
                self.repo.apply_update(prior, data, envelope.seq).await
            }
            DirectoryOp::Delete { data } => self.repo.apply_delete(&data.login, envelope.seq).await,
        }
    }

    fn trace_outcome(&self, envelope: &EventEnvelope, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => {
                info!(event_id = %envelope.event_id, seq = envelope.seq, key = %envelope.key(), "Applied envelope")
            }
            ApplyOutcome::Duplicate => {
                debug!(event_id = %envelope.event_id, key = %envelope.key(), "Duplicate delivery, no-op")
            }
            ApplyOutcome::Stale => {
                warn!(event_id = %envelope.event_id, seq = envelope.seq, key = %envelope.key(), "Stale sequence, discarded")
            }
            ApplyOutcome::Missing => {
                warn!(event_id = %envelope.event_id, key = %envelope.key(), "Update target missing, no-op")
            }
        }
    }
}
