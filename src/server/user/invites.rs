use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{MaybeUser, RequireUser};
use crate::server::AppState;
use crate::server::dto::{CreateInviteRequest, ResolveInviteParams};
use crate::server::extract::ApiJson;
use crate::server::response::{ApiError, ApiResponse};

pub async fn create_invite(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<ApiJson<CreateInviteRequest>>,
) -> impl IntoResponse {
    let req = body.map(|ApiJson(req)| req).unwrap_or_default();
    let created = state
        .collections
        .invite_member(&id, &user.id, req.role, &state.invites)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn resolve_invite(
    MaybeUser(viewer): MaybeUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveInviteParams>,
) -> impl IntoResponse {
    let details = state.invites.resolve(&params.token)?;

    tracing::debug!(
        invite_id = %details.invite.id,
        viewer = ?viewer.as_ref().map(|v| v.id.as_str()),
        "Invite resolved"
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(details)))
}

pub async fn accept_invite(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let accepted = state.invites.accept(&id, &user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(accepted)))
}

pub async fn reject_invite(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let rejected = state.invites.reject(&id, &user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(rejected)))
}
