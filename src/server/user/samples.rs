use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreateSampleRequest, SampleAccessParams};
use crate::server::extract::ApiJson;
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::{validate_material_type, validate_sample_title};
use crate::service::ensure_sample_access;
use crate::types::{Lifecycle, Sample};

pub async fn create_sample(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateSampleRequest>,
) -> impl IntoResponse {
    let title = validate_sample_title(&req.title)?;
    let material_type = validate_material_type(&req.material_type)?;

    let now = Utc::now();
    let sample = Sample {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        title,
        material_type,
        lifecycle: Lifecycle::Active,
        created_at: now,
        updated_at: now,
    };
    state.store.create_sample(&sample)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(sample))))
}

pub async fn get_sample(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<SampleAccessParams>,
) -> impl IntoResponse {
    let sample = state
        .store
        .get_sample(&id)?
        .filter(|s| s.lifecycle.is_active())
        .ok_or_else(|| ApiError::not_found("Sample not found"))?;

    ensure_sample_access(
        state.store.as_ref(),
        &user,
        &sample,
        params.collection_id.as_deref(),
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(sample)))
}

pub async fn delete_sample(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let sample = state
        .store
        .get_sample(&id)?
        .filter(|s| s.lifecycle.is_active())
        .ok_or_else(|| ApiError::not_found("Sample not found"))?;

    if sample.user_id != user.id && !user.is_admin() {
        return Err(ApiError::forbidden("Only the owner can delete a sample"));
    }

    state.store.soft_delete_sample(&sample.id, Utc::now())?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
