//! Event envelope wire format
//!
//! Wire shape: `{"event_id": ..., "seq": N, "action": "create|update|delete",
//! "data": {...}, "old_key"?: "..."}`. Envelopes are immutable once
//! published; `seq` is a monotonically increasing sequence allocated by the
//! producer before publication, used by the consumer to discard stale
//! deliveries. `old_key` is present only on rename-style updates and names
//! the record's prior login.

use crate::domain::DirectoryUser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Why an envelope could not be turned into a mutation. Decode failures
/// are poison messages: the consumer logs and skips them, it never crashes
/// or blocks the pipeline on one.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid envelope: {0}")]
    Invalid(String),
}

/// Payload of a delete: the key is all the consumer needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserKey {
    pub login: String,
}

/// One directory mutation, discriminated by `action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DirectoryOp {
    Create {
        data: DirectoryUser,
    },
    Update {
        data: DirectoryUser,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_key: Option<String>,
    },
    Delete {
        data: UserKey,
    },
}

/// A self-describing unit of change placed on the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Correlation key for tracing one mutation across producer and consumer
    pub event_id: Uuid,
    /// Producer-assigned monotone sequence
    pub seq: i64,
    #[serde(flatten)]
    pub op: DirectoryOp,
}

impl EventEnvelope {
    pub fn new(seq: i64, op: DirectoryOp) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            seq,
            op,
        }
    }

    /// The directory key this envelope is ordered under. For updates this
    /// is the record's prior login, so a rename sorts with the history of
    /// the record it renames.
    pub fn key(&self) -> &str {
        match &self.op {
            DirectoryOp::Create { data } => &data.login,
            DirectoryOp::Update { data, old_key } => old_key.as_deref().unwrap_or(&data.login),
            DirectoryOp::Delete { data } => &data.login,
        }
    }

    pub fn encode(&self) -> crate::error::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            crate::error::AppError::Internal(anyhow::anyhow!("Envelope encode error: {}", e))
        })
    }

    /// Decode and validate an envelope. Schema-invalid shapes are rejected
    /// here rather than surfacing deep inside business logic.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        let envelope: EventEnvelope = serde_json::from_slice(bytes)?;

        if envelope.seq < 0 {
            return Err(DecodeError::Invalid(format!(
                "negative sequence {}",
                envelope.seq
            )));
        }
        if envelope.key().is_empty() {
            return Err(DecodeError::Invalid("empty login key".to_string()));
        }
        Ok(envelope)
    }
}
