//! Token issuance (password grant)

use crate::crypto;
use crate::error::{AppError, Result};
use crate::repository::UserRepository;
use crate::server::AppState;
use axum::{extract::State, response::IntoResponse, Form, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Exchange a username/password for an access token. The admin identity
/// is configured, everyone else is verified against the directory.
pub async fn token(
    State(state): State<AppState>,
    Form(form): Form<TokenRequest>,
) -> Result<impl IntoResponse> {
    let invalid = || AppError::Unauthorized("Invalid login or password".to_string());

    let password_hash = if form.username == state.config.admin.login {
        state.config.admin.password_hash.clone()
    } else {
        state
            .user_repo
            .find_by_login(&form.username)
            .await?
            .ok_or_else(invalid)?
            .password_hash
    };

    if !crypto::verify_password(&form.password, &password_hash)? {
        return Err(invalid());
    }

    let access_token = state.jwt_manager.issue(&form.username)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
