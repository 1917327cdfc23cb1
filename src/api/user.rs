//! User API handlers
//!
//! Reads go through the cache; writes go through the producer and reach
//! the system of record asynchronously. A successful write response means
//! "durably published", not "applied" — the cache bridges the gap for
//! reads served by this process.

use crate::api::{PaginatedResponse, PaginationQuery, SuccessResponse};
use crate::domain::{CreateUserInput, UpdateUserInput, UserView};
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::repository::UserRepository;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

/// List users
pub async fn list(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Query(pagination): Query<PaginationQuery>,
) -> Result<impl IntoResponse> {
    let (page, per_page) = pagination.clamped();
    let users = state.user_repo.list((page - 1) * per_page, per_page).await?;
    let total = state.user_repo.count().await?;

    let mut views = Vec::with_capacity(users.len());
    for user in &users {
        let view = UserView::from(user);
        // Listing warms the per-login cache on misses
        state.cache.warm_user(&view).await?;
        views.push(view);
    }

    Ok(Json(PaginatedResponse::new(views, page, per_page, total)))
}

/// Get one user by login, read-through the cache
pub async fn get(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(login): Path<String>,
) -> Result<impl IntoResponse> {
    if let Some(view) = state.cache.get_user(&login).await? {
        return Ok(Json(SuccessResponse::new(view)));
    }

    let user = state
        .user_repo
        .find_by_login(&login)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", login)))?;

    let view = UserView::from(&user);
    state.cache.put_user(&view).await?;
    Ok(Json(SuccessResponse::new(view)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: String,
    pub surname: String,
}

/// Find users by name and surname
pub async fn search(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let users = state
        .user_repo
        .find_by_name_surname(&query.name, &query.surname)
        .await?;
    if users.is_empty() {
        return Err(AppError::NotFound("No users found".to_string()));
    }

    let mut views = Vec::with_capacity(users.len());
    for user in &users {
        let view = UserView::from(user);
        state.cache.warm_user(&view).await?;
        views.push(view);
    }
    Ok(Json(SuccessResponse::new(views)))
}

/// Create a user (admin only)
pub async fn create(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(input): Json<CreateUserInput>,
) -> Result<impl IntoResponse> {
    let view = state.producer.publish_create(&caller, input).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(view))))
}

/// Update a user (self or admin); renames carry the prior login in the path
pub async fn update(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(login): Path<String>,
    Json(input): Json<UpdateUserInput>,
) -> Result<impl IntoResponse> {
    let view = state.producer.publish_update(&caller, &login, input).await?;
    Ok(Json(SuccessResponse::new(view)))
}

/// Delete a user (self or admin)
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(login): Path<String>,
) -> Result<impl IntoResponse> {
    let view = state.producer.publish_delete(&caller, &login).await?;
    Ok(Json(SuccessResponse::new(view)))
}
