use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    AddSampleRequest, CreateCollectionRequest, ReorderSamplesRequest, UpdateCollectionRequest,
};
use crate::server::extract::ApiJson;
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::{validate_collection_name, validate_sample_ids};

pub async fn list_collections(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let collections = state.collections.list_for_user(&user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(collections)))
}

pub async fn create_collection(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateCollectionRequest>,
) -> impl IntoResponse {
    let name = validate_collection_name(&req.name)?;

    let collection = state.collections.create(&name, &user.id)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(collection))))
}

pub async fn get_collection(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let collection = state.collections.get_for_user(&id, &user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(collection)))
}

pub async fn update_collection(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateCollectionRequest>,
) -> impl IntoResponse {
    let name = validate_collection_name(&req.name)?;

    let collection = state.collections.update_for_user(&id, &user.id, &name)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(collection)))
}

pub async fn delete_collection(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.collections.delete_for_user(&id, &user.id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn add_sample(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AddSampleRequest>,
) -> impl IntoResponse {
    let link = state
        .collections
        .add_sample_for_user(&id, &user.id, &req.sample_id)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(link))))
}

pub async fn reorder_samples(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ReorderSamplesRequest>,
) -> impl IntoResponse {
    validate_sample_ids(&req.sample_ids)?;

    let samples = state
        .collections
        .reorder_samples_for_user(&id, &user.id, &req.sample_ids)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(samples)))
}

pub async fn remove_sample(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, sample_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .collections
        .remove_sample_for_user(&id, &user.id, &sample_id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
