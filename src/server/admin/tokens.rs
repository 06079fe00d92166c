use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};

use crate::auth::{RequireAdmin, TokenGenerator};
use crate::server::AppState;
use crate::server::dto::{CreateTokenResponse, CreateUserTokenRequest};
use crate::server::extract::ApiJson;
use crate::server::response::{ApiError, ApiResponse};

pub async fn create_user_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<ApiJson<CreateUserTokenRequest>>,
) -> impl IntoResponse {
    let req = body.map(|ApiJson(req)| req).unwrap_or_default();

    let user = state
        .store
        .get_user(&id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let expires_at = match req.expires_in_seconds {
        Some(secs) if secs <= 0 => {
            return Err(ApiError::bad_request("expires_in_seconds must be positive"));
        }
        Some(secs) => Some(Utc::now() + Duration::seconds(secs)),
        None => None,
    };

    let (token, raw_token) = TokenGenerator::new().issue(&user.id, expires_at)?;
    state.store.create_token(&token)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreateTokenResponse {
            token: raw_token,
            metadata: token.into(),
        })),
    ))
}
