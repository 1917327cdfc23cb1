//! Configuration management for the directory service

use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration (cache + event stream substrate)
    pub redis: RedisConfig,
    /// Event stream configuration
    pub events: EventStreamConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Admin account configuration
    pub admin: AdminConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Durable-log settings. The stream is totally ordered, which gives the
/// per-key ordering the consumer relies on.
#[derive(Debug, Clone)]
pub struct EventStreamConfig {
    /// Stream key holding directory mutation envelopes
    pub stream: String,
    /// Consumer group name
    pub group: String,
    /// Consumer name within the group; must be stable across restarts so
    /// uncommitted deliveries are re-read from the pending-entries list
    pub consumer: String,
    /// Blocking poll timeout in milliseconds
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub access_token_ttl_secs: i64,
}

/// The fixed administrator identity. Only the admin may create users or
/// mutate records it does not own.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub login: String,
    /// Argon2 PHC hash of the admin password
    pub password_hash: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            events: EventStreamConfig {
                stream: env::var("EVENT_STREAM").unwrap_or_else(|_| "user_events".to_string()),
                group: env::var("EVENT_GROUP").unwrap_or_else(|_| "directory".to_string()),
                consumer: env::var("EVENT_CONSUMER").unwrap_or_else(|_| "consumer-1".to_string()),
                poll_timeout_ms: env::var("EVENT_POLL_TIMEOUT_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1000),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").context("JWT_SECRET is required")?,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "userdir".to_string()),
                access_token_ttl_secs: env::var("JWT_ACCESS_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .unwrap_or(1800),
            },
            admin: AdminConfig {
                login: env::var("ADMIN_LOGIN").unwrap_or_else(|_| "admin".to_string()),
                password_hash: env::var("ADMIN_PASSWORD_HASH")
                    .context("ADMIN_PASSWORD_HASH is required")?,
            },
        })
    }

    /// HTTP listen address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_addr() {
        let config = Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 8000,
            database: DatabaseConfig {
                url: "postgres://localhost/users_db".to_string(),
                max_connections: 10,
                min_connections: 2,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            events: EventStreamConfig {
                stream: "user_events".to_string(),
                group: "directory".to_string(),
                consumer: "consumer-1".to_string(),
                poll_timeout_ms: 1000,
            },
            jwt: JwtConfig {
                secret: "secret".to_string(),
                issuer: "userdir".to_string(),
                access_token_ttl_secs: 1800,
            },
            admin: AdminConfig {
                login: "admin".to_string(),
                password_hash: "$argon2id$stub".to_string(),
            },
        };
        assert_eq!(config.http_addr(), "127.0.0.1:8000");
    }
}
