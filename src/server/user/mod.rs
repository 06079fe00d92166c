mod collections;
mod invites;
mod members;
mod samples;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::server::AppState;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        // Collections
        .route("/collections", get(collections::list_collections))
        .route("/collections", post(collections::create_collection))
        .route("/collections/{id}", get(collections::get_collection))
        .route("/collections/{id}", patch(collections::update_collection))
        .route("/collections/{id}", delete(collections::delete_collection))
        // Collection samples (ordered links)
        .route("/collections/{id}/samples", post(collections::add_sample))
        .route("/collections/{id}/samples", patch(collections::reorder_samples))
        .route(
            "/collections/{id}/samples/{sample_id}",
            delete(collections::remove_sample),
        )
        // Members
        .route("/collections/{id}/members", get(members::list_members))
        .route(
            "/collections/{id}/members/{member_id}",
            patch(members::update_member_role),
        )
        .route(
            "/collections/{id}/members/{member_id}",
            delete(members::remove_member),
        )
        // Invites
        .route("/collections/{id}/invites", post(invites::create_invite))
        .route("/invites/resolve", get(invites::resolve_invite))
        .route("/invites/{id}/accept", post(invites::accept_invite))
        .route("/invites/{id}/reject", post(invites::reject_invite))
        // Samples
        .route("/samples", post(samples::create_sample))
        .route("/samples/{id}", get(samples::get_sample))
        .route("/samples/{id}", delete(samples::delete_sample))
}
