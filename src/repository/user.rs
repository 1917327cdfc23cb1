//! User repository
//!
//! The consumer is the only writer of the `users` table, so the apply
//! methods need no cross-process locking. Each apply runs in one
//! transaction together with the per-login sequence bookkeeping in
//! `user_event_seq`: a crash mid-apply rolls back both, and a redelivered
//! or stale-sequence envelope is detected inside the next transaction.
//! Sequence rows survive deletes so a late duplicate of an earlier event
//! cannot resurrect a deleted record.

use crate::domain::DirectoryUser;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;

/// Result of applying one envelope to the system of record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The mutation changed state
    Applied,
    /// Duplicate delivery: the state already reflects this mutation
    Duplicate,
    /// The envelope's sequence is not newer than the last applied one
    Stale,
    /// Update target does not exist (deleted or rewritten concurrently)
    Missing,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_login(&self, login: &str) -> Result<Option<DirectoryUser>>;
    async fn find_by_name_surname(&self, name: &str, surname: &str) -> Result<Vec<DirectoryUser>>;
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<DirectoryUser>>;
    async fn count(&self) -> Result<i64>;
    async fn exists(&self, login: &str) -> Result<bool>;

    // Consumer-side idempotent applies
    async fn apply_create(&self, user: &DirectoryUser, seq: i64) -> Result<ApplyOutcome>;
    async fn apply_update(
        &self,
        old_login: &str,
        user: &DirectoryUser,
        seq: i64,
    ) -> Result<ApplyOutcome>;
    async fn apply_delete(&self, login: &str, seq: i64) -> Result<ApplyOutcome>;
}

pub struct UserRepositoryImpl {
    pool: PgPool,
}

impl UserRepositoryImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Read the last applied sequence for a login, locking the row for the
/// duration of the transaction.
async fn last_seq_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    login: &str,
) -> Result<Option<i64>> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT last_seq FROM user_event_seq WHERE login = $1 FOR UPDATE")
            .bind(login)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row.map(|r| r.0))
}

async fn record_seq(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    login: &str,
    seq: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_event_seq (login, last_seq)
        VALUES ($1, $2)
        ON CONFLICT (login) DO UPDATE
            SET last_seq = GREATEST(user_event_seq.last_seq, EXCLUDED.last_seq)
        "#,
    )
    .bind(login)
    .bind(seq)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    async fn find_by_login(&self, login: &str) -> Result<Option<DirectoryUser>> {
        let user = sqlx::query_as::<_, DirectoryUser>(
            r#"
            SELECT login, password_hash, name, surname, age, email
            FROM users
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_name_surname(&self, name: &str, surname: &str) -> Result<Vec<DirectoryUser>> {
        let users = sqlx::query_as::<_, DirectoryUser>(
            r#"
            SELECT login, password_hash, name, surname, age, email
            FROM users
            WHERE name = $1 AND surname = $2
            ORDER BY login
            "#,
        )
        .bind(name)
        .bind(surname)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<DirectoryUser>> {
        let users = sqlx::query_as::<_, DirectoryUser>(
            r#"
            SELECT login, password_hash, name, surname, age, email
            FROM users
            ORDER BY login
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn exists(&self, login: &str) -> Result<bool> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE login = $1)")
            .bind(login)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn apply_create(&self, user: &DirectoryUser, seq: i64) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(last) = last_seq_for_update(&mut tx, &user.login).await? {
            if last >= seq {
                return Ok(ApplyOutcome::Stale);
            }
        }

        let result = sqlx::query(
            r#"
            INSERT INTO users (login, password_hash, name, surname, age, email)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (login) DO NOTHING
            "#,
        )
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(user.age)
        .bind(&user.email)
        .execute(&mut *tx)
        .await?;

        record_seq(&mut tx, &user.login, seq).await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            Ok(ApplyOutcome::Duplicate)
        } else {
            Ok(ApplyOutcome::Applied)
        }
    }

    async fn apply_update(
        &self,
        old_login: &str,
        user: &DirectoryUser,
        seq: i64,
    ) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(last) = last_seq_for_update(&mut tx, old_login).await? {
            if last >= seq {
                return Ok(ApplyOutcome::Stale);
            }
        }
        // A rename is also ordered against the target login's history, or
        // an old rename redelivered after a delete of its target would
        // resurrect the deleted login
        if user.login != old_login {
            if let Some(last) = last_seq_for_update(&mut tx, &user.login).await? {
                if last >= seq {
                    return Ok(ApplyOutcome::Stale);
                }
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE users
            SET login = $1, password_hash = $2, name = $3, surname = $4, age = $5, email = $6
            WHERE login = $7
            "#,
        )
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(user.age)
        .bind(&user.email)
        .bind(old_login)
        .execute(&mut *tx)
        .await?;

        record_seq(&mut tx, old_login, seq).await?;
        if user.login != old_login {
            // Rename: the new login inherits the sequence watermark
            record_seq(&mut tx, &user.login, seq).await?;
        }
        tx.commit().await?;

        if result.rows_affected() == 0 {
            Ok(ApplyOutcome::Missing)
        } else {
            Ok(ApplyOutcome::Applied)
        }
    }

    async fn apply_delete(&self, login: &str, seq: i64) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(last) = last_seq_for_update(&mut tx, login).await? {
            if last >= seq {
                return Ok(ApplyOutcome::Stale);
            }
        }

        let result = sqlx::query("DELETE FROM users WHERE login = $1")
            .bind(login)
            .execute(&mut *tx)
            .await?;

        // The sequence row stays behind as a tombstone
        record_seq(&mut tx, login, seq).await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            Ok(ApplyOutcome::Duplicate)
        } else {
            Ok(ApplyOutcome::Applied)
        }
    }
}
