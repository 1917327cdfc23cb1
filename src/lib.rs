//! User directory service with asynchronous write propagation
//!
//! The API process validates and authorizes directory mutations, publishes
//! them as durable envelopes and serves reads through a TTL cache; an
//! independent consumer process applies the envelopes to the relational
//! system of record with idempotent, sequence-guarded semantics.

pub mod api;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod events;
pub mod jwt;
pub mod middleware;
pub mod migration;
pub mod policy;
pub mod repository;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
