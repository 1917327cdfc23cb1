//! Server initialization and routing
//!
//! All shared clients (database pool, cache store, event log, sequencer)
//! are constructed here at process start and passed by reference through
//! `AppState`; nothing is an ambient singleton.

use crate::api;
use crate::cache::{RedisCacheStore, UserCache};
use crate::config::Config;
use crate::events::{DirectoryProducer, RedisSequencer, RedisStreamLog};
use crate::jwt::JwtManager;
use crate::migration;
use crate::repository::UserRepositoryImpl;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub user_repo: Arc<UserRepositoryImpl>,
    pub producer: Arc<DirectoryProducer<RedisStreamLog, UserRepositoryImpl, RedisSequencer>>,
    pub cache: UserCache,
    pub jwt_manager: JwtManager,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready))
        .route("/token", post(api::auth::token))
        .route("/users", get(api::user::list).post(api::user::create))
        .route("/users/search", get(api::user::search))
        .route(
            "/users/{login}",
            get(api::user::get)
                .put(api::user::update)
                .delete(api::user::delete),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Construct state and serve the API until ctrl-c
pub async fn run(config: Config) -> Result<()> {
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;
    migration::run(&db_pool).await?;

    let user_repo = Arc::new(UserRepositoryImpl::new(db_pool.clone()));
    let cache_store = Arc::new(RedisCacheStore::new(&config.redis).await?);
    let cache = UserCache::new(cache_store);
    let event_log = Arc::new(RedisStreamLog::new(&config.redis, &config.events).await?);
    let sequencer = Arc::new(RedisSequencer::new(&config.redis).await?);
    let producer = Arc::new(DirectoryProducer::new(
        event_log,
        user_repo.clone(),
        sequencer,
        cache.clone(),
    ));
    let jwt_manager = JwtManager::new(&config.jwt);

    let addr = config.http_addr();
    let state = AppState {
        config: Arc::new(config),
        db_pool,
        user_repo,
        producer,
        cache,
        jwt_manager,
    };

    let listener = TcpListener::bind(&addr).await?;
    info!("API listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
