mod audit;
mod tokens;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // User routes
        .route("/users", post(users::create_user))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}/tokens", post(tokens::create_user_token))
        // Audit trail
        .route("/audit-logs", get(audit::list_audit_logs))
}
