use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::AuditLogQuery;
use crate::server::response::{ApiError, ApiResponse};
use crate::store::AuditLogFilter;

pub async fn list_audit_logs(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditLogQuery>,
) -> impl IntoResponse {
    let entries = state.audit.list(&AuditLogFilter {
        collection_id: query.collection_id,
        invite_id: query.invite_id,
    })?;

    Ok::<_, ApiError>(Json(ApiResponse::success(entries)))
}
