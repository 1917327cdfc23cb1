//! Directory mutation producer
//!
//! Converts validated, authorized API mutations into durable envelopes.
//! Existence checks are best-effort reads of the current state, not
//! transactional with the publish; the consumer re-checks idempotently.
//! After a successful append the local cache is updated eagerly so reads
//! served by this process observe the write before the consumer catches
//! up. That window is bounded by the cache TTL.

use crate::cache::UserCache;
use crate::crypto;
use crate::domain::{CreateUserInput, DirectoryUser, UpdateUserInput, UserView};
use crate::error::{AppError, Result};
use crate::events::envelope::{DirectoryOp, EventEnvelope, UserKey};
use crate::events::log::EventLog;
use crate::events::sequence::Sequencer;
use crate::policy::{self, Caller};
use crate::repository::UserRepository;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub struct DirectoryProducer<L: EventLog, R: UserRepository, S: Sequencer> {
    log: Arc<L>,
    repo: Arc<R>,
    sequencer: Arc<S>,
    cache: UserCache,
}

impl<L: EventLog, R: UserRepository, S: Sequencer> DirectoryProducer<L, R, S> {
    pub fn new(log: Arc<L>, repo: Arc<R>, sequencer: Arc<S>, cache: UserCache) -> Self {
        Self {
            log,
            repo,
            sequencer,
            cache,
        }
    }

    /// Publish a create. Admin only; `Conflict` when the login is taken.
    pub async fn publish_create(&self, caller: &Caller, input: CreateUserInput) -> Result<UserView> {
        policy::require_admin(caller)?;
        input.validate()?;

        if self.login_taken(&input.login).await? {
            return Err(AppError::Conflict(format!(
                "User '{}' already exists",
                input.login
            )));
        }

        let user = DirectoryUser {
            login: input.login,
            password_hash: crypto::hash_password(&input.password)?,
            name: input.name,
            surname: input.surname,
            age: input.age,
            email: input.email,
        };

        let view = UserView::from(&user);
        let envelope = self
            .publish(DirectoryOp::Create { data: user })
            .await?;
        info!(event_id = %envelope.event_id, seq = envelope.seq, login = %view.login, "Published create");

        self.cache.put_user(&view).await?;
        Ok(view)
    }

    /// Publish an update, possibly a rename. Self-or-admin; `NotFound`
    /// when the target is missing, `Conflict` when renaming onto an
    /// occupied login.
    pub async fn publish_update(
        &self,
        caller: &Caller,
        target_login: &str,
        input: UpdateUserInput,
    ) -> Result<UserView> {
        policy::require_self_or_admin(caller, target_login)?;
        input.validate()?;

        let current = self
            .repo
            .find_by_login(target_login)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", target_login)))?;

        let renaming = input.login != target_login;
        if renaming && self.login_taken(&input.login).await? {
            return Err(AppError::Conflict(format!(
                "User '{}' already exists",
                input.login
            )));
        }

        let password_hash = match &input.password {
            Some(password) => crypto::hash_password(password)?,
            None => current.password_hash,
        };
        let user = DirectoryUser {
            login: input.login,
            password_hash,
            name: input.name,
            surname: input.surname,
            age: input.age,
            email: input.email,
        };

        let view = UserView::from(&user);
        let envelope = self
            .publish(DirectoryOp::Update {
                data: user,
                old_key: renaming.then(|| target_login.to_string()),
            })
            .await?;
        info!(event_id = %envelope.event_id, seq = envelope.seq, login = %view.login, "Published update");

        if renaming {
            self.cache.invalidate(target_login).await?;
        }
        self.cache.put_user(&view).await?;
        Ok(view)
    }

    /// Publish a delete. Self-or-admin; `NotFound` when the target is
    /// missing.
    pub async fn publish_delete(&self, caller: &Caller, login: &str) -> Result<UserView> {
        policy::require_self_or_admin(caller, login)?;

        let current = self
            .repo
            .find_by_login(login)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", login)))?;
        let view = UserView::from(&current);

        let envelope = self
            .publish(DirectoryOp::Delete {
                data: UserKey {
                    login: login.to_string(),
                },
            })
            .await?;
        info!(event_id = %envelope.event_id, seq = envelope.seq, login = %login, "Published delete");

        self.cache.invalidate(login).await?;
        Ok(view)
    }

    /// Assign a sequence, encode and append. Log failures surface as
    /// `Retryable`; there is no local queuing, the HTTP caller retries.
    async fn publish(&self, op: DirectoryOp) -> Result<EventEnvelope> {
        let seq = self.sequencer.next().await?;
        let envelope = EventEnvelope::new(seq, op);
        let payload = envelope.encode()?;
        self.log.append(envelope.key(), &payload).await?;
        Ok(envelope)
    }

    /// Best-effort existence probe: cache first, then the system of record
    async fn login_taken(&self, login: &str) -> Result<bool> {
        if self.cache.get_user(login).await?.is_some() {
            return Ok(true);
        }
        self.repo.exists(login).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockCacheStore;
    use crate::events::log::MockEventLog;
    use crate::events::sequence::MockSequencer;
    use crate::repository::user::MockUserRepository;

    fn caller(login: &str) -> Caller {
        Caller::new(login, "admin")
    }

    fn create_input(login: &str) -> CreateUserInput {
        CreateUserInput {
            login: login.to_string(),
            password: "pw".to_string(),
            name: "John".to_string(),
            surname: "Doe".to_string(),
            age: Some(30),
            email: None,
        }
    }

    fn quiet_cache() -> UserCache {
        let mut store = MockCacheStore::new();
        store.expect_get().returning(|_| Ok(None));
        store.expect_set().returning(|_, _, _| Ok(()));
        store.expect_delete().returning(|_| Ok(()));
        UserCache::new(Arc::new(store))
    }

    fn producer(
        log: MockEventLog,
        repo: MockUserRepository,
        sequencer: MockSequencer,
    ) -> DirectoryProducer<MockEventLog, MockUserRepository, MockSequencer> {
        DirectoryProducer::new(Arc::new(log), Arc::new(repo), Arc::new(sequencer), quiet_cache())
    }

    #[tokio::test]
    async fn test_create_requires_admin() {
        let producer = producer(
            MockEventLog::new(),
            MockUserRepository::new(),
            MockSequencer::new(),
        );
        let err = producer
            .publish_create(&caller("jdoe"), create_input("someone"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_create_conflict_on_existing_login() {
        let mut repo = MockUserRepository::new();
        repo.expect_exists().returning(|_| Ok(true));

        let producer = producer(MockEventLog::new(), repo, MockSequencer::new());
        let err = producer
            .publish_create(&caller("admin"), create_input("jdoe"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_publishes_and_returns_view() {
        let mut repo = MockUserRepository::new();
        repo.expect_exists().returning(|_| Ok(false));
        let mut sequencer = MockSequencer::new();
        sequencer.expect_next().returning(|| Ok(41));
        let mut log = MockEventLog::new();
        log.expect_append()
            .withf(|key, payload| {
                let envelope = EventEnvelope::decode(payload).unwrap();
                key == "jdoe" && envelope.seq == 41
            })
            .times(1)
            .returning(|_, _| Ok("1-0".to_string()));

        let producer = producer(log, repo, sequencer);
        let view = producer
            .publish_create(&caller("admin"), create_input("jdoe"))
            .await
            .unwrap();
        assert_eq!(view.login, "jdoe");
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_login().returning(|_| Ok(None));

        let producer = producer(MockEventLog::new(), repo, MockSequencer::new());
        let err = producer
            .publish_update(
                &caller("admin"),
                "ghost",
                UpdateUserInput {
                    login: "ghost".to_string(),
                    password: None,
                    name: "G".to_string(),
                    surname: "Host".to_string(),
                    age: None,
                    email: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_onto_occupied_login_is_conflict() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_login().returning(|login| {
            Ok(Some(DirectoryUser {
                login: login.to_string(),
                password_hash: "$argon2id$x".to_string(),
                name: "John".to_string(),
                surname: "Doe".to_string(),
                age: None,
                email: None,
            }))
        });
        repo.expect_exists().returning(|_| Ok(true));

        let producer = producer(MockEventLog::new(), repo, MockSequencer::new());
        let err = producer
            .publish_update(
                &caller("jdoe"),
                "jdoe",
                UpdateUserInput {
                    login: "asmith".to_string(),
                    password: None,
                    name: "John".to_string(),
                    surname: "Doe".to_string(),
                    age: None,
                    email: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_log_failure_surfaces_retryable() {
        let mut repo = MockUserRepository::new();
        repo.expect_exists().returning(|_| Ok(false));
        let mut sequencer = MockSequencer::new();
        sequencer.expect_next().returning(|| Ok(1));
        let mut log = MockEventLog::new();
        log.expect_append()
            .returning(|_, _| Err(AppError::Retryable("broker unreachable".to_string())));

        let producer = producer(log, repo, sequencer);
        let err = producer
            .publish_create(&caller("admin"), create_input("jdoe"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
