//! Asynchronous write-propagation pipeline
//!
//! API mutations are converted into durable envelopes by the
//! [`producer::DirectoryProducer`], appended to an ordered event log
//! ([`log::EventLog`]) and later applied to the system of record by the
//! [`consumer::DirectoryConsumer`]. Delivery is at-least-once; the
//! consumer is idempotent rather than the transport deduplicated.

pub mod consumer;
pub mod envelope;
pub mod log;
pub mod producer;
pub mod sequence;

pub use consumer::{DirectoryConsumer, StepOutcome};
pub use envelope::{DecodeError, DirectoryOp, EventEnvelope, UserKey};
pub use log::{EventLog, LogRecord, RedisStreamLog};
pub use producer::DirectoryProducer;
pub use sequence::{RedisSequencer, Sequencer};
