//! Schema bootstrap

use crate::error::Result;
use sqlx::PgPool;

/// Create the directory tables if they do not exist. Run by both
/// binaries at startup; every statement is idempotent.
pub async fn run(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            login         VARCHAR(50) PRIMARY KEY,
            password_hash TEXT        NOT NULL,
            name          VARCHAR(50) NOT NULL,
            surname       VARCHAR(50) NOT NULL,
            age           INTEGER,
            email         VARCHAR(50)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_name_surname ON users (name, surname)")
        .execute(pool)
        .await?;

    // Per-login sequence watermarks; rows outlive their users so stale
    // redeliveries cannot resurrect deleted records
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_event_seq (
            login    VARCHAR(50) PRIMARY KEY,
            last_seq BIGINT      NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
