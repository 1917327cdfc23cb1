//! Consumer worker: applies directory events to the system of record.
//!
//! Startup connectivity failures are fatal by design; the process exits
//! and its supervisor restarts it. Uncommitted deliveries from a previous
//! run are replayed before new entries.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use userdir_core::config::Config;
use userdir_core::events::{DirectoryConsumer, RedisStreamLog};
use userdir_core::migration;
use userdir_core::repository::UserRepositoryImpl;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "userdir_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!("Starting user directory consumer");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Cannot reach the system of record")?;
    migration::run(&db_pool).await?;

    let event_log = Arc::new(
        RedisStreamLog::new(&config.redis, &config.events)
            .await
            .context("Cannot reach the event log")?,
    );
    let repo = Arc::new(UserRepositoryImpl::new(db_pool));

    let consumer = DirectoryConsumer::new(
        event_log,
        repo,
        Duration::from_millis(config.events.poll_timeout_ms),
    );

    // Stop polling on ctrl-c; the in-flight cycle completes before exit
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
        flag.store(true, Ordering::Release);
    });

    consumer.run(shutdown).await?;
    Ok(())
}
