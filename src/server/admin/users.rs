use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::CreateUserRequest;
use crate::server::extract::ApiJson;
use crate::server::response::{ApiError, ApiResponse};
use crate::types::User;

pub async fn create_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> impl IntoResponse {
    let email = req
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    if email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        name: req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        is_admin: req.is_admin,
        created_at: now,
        updated_at: now,
    };

    state.store.create_user(&user)?;
    tracing::info!(user_id = %user.id, is_admin = user.is_admin, "User created");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}
