use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::UpdateMemberRoleRequest;
use crate::server::extract::ApiJson;
use crate::server::response::{ApiError, ApiResponse};

pub async fn list_members(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let members = state.collections.list_members(&id, &user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(members)))
}

pub async fn update_member_role(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, member_id)): Path<(String, String)>,
    ApiJson(req): ApiJson<UpdateMemberRoleRequest>,
) -> impl IntoResponse {
    let member = state
        .collections
        .update_member_role(&id, &user.id, &member_id, req.role)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(member)))
}

pub async fn remove_member(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, member_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state.collections.remove_member(&id, &user.id, &member_id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
