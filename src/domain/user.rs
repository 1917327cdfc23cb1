//! Directory user domain model
//!
//! `login` is the primary key of the directory and is immutable as a key:
//! a "login change" is carried on the wire as an update with the prior key
//! (`old_key`) and applied as a keyed move, never an in-place PK rename.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Authoritative representation of one directory user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DirectoryUser {
    pub login: String,
    /// Argon2 PHC string; never leaves the service
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub age: Option<i32>,
    pub email: Option<String>,
}

/// Public snapshot of a user: the explicit serialization contract used for
/// cache entries and API responses. Excludes internal-only fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub login: String,
    pub name: String,
    pub surname: String,
    pub age: Option<i32>,
    pub email: Option<String>,
}

impl From<&DirectoryUser> for UserView {
    fn from(user: &DirectoryUser) -> Self {
        Self {
            login: user.login.clone(),
            name: user.name.clone(),
            surname: user.surname.clone(),
            age: user.age,
            email: user.email.clone(),
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 50))]
    pub login: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub surname: String,
    #[validate(range(min = 0, max = 150))]
    pub age: Option<i32>,
    #[validate(email)]
    pub email: Option<String>,
}

/// Input for updating a user. `login` is the target login after the update;
/// when it differs from the path login the update is a rename.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 50))]
    pub login: String,
    #[validate(length(min = 1, max = 128))]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub surname: String,
    #[validate(range(min = 0, max = 150))]
    pub age: Option<i32>,
    #[validate(email)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_excludes_password_hash() {
        let user = DirectoryUser {
            login: "jdoe".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            name: "John".to_string(),
            surname: "Doe".to_string(),
            age: Some(30),
            email: Some("jdoe@example.com".to_string()),
        };
        let view = UserView::from(&user);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["login"], "jdoe");
    }

    #[test]
    fn test_create_user_input_validation() {
        let input = CreateUserInput {
            login: String::new(),
            password: "pw".to_string(),
            name: "John".to_string(),
            surname: "Doe".to_string(),
            age: None,
            email: Some("not-an-email".to_string()),
        };
        assert!(input.validate().is_err());

        let valid = CreateUserInput {
            login: "jdoe".to_string(),
            password: "pw".to_string(),
            name: "John".to_string(),
            surname: "Doe".to_string(),
            age: Some(30),
            email: Some("jdoe@example.com".to_string()),
        };
        assert!(valid.validate().is_ok());
    }
}
