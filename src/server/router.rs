use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::user::user_router;
use crate::auth::{AuthVerifier, TokenVerifier};
use crate::service::{
    AuditLogService, CollectionService, InviteNotifier, InviteService, InviteSettings, LogNotifier,
};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub collections: Arc<CollectionService>,
    pub invites: Arc<InviteService>,
    pub audit: Arc<AuditLogService>,
    pub verifier: Arc<dyn AuthVerifier>,
}

impl AppState {
    /// Wires the services over `store` with bearer-token auth and the
    /// logging notifier.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, settings: InviteSettings) -> Self {
        let verifier = Arc::new(TokenVerifier::new(store.clone()));
        Self::with_parts(store, settings, verifier, Arc::new(LogNotifier))
    }

    #[must_use]
    pub fn with_parts(
        store: Arc<dyn Store>,
        settings: InviteSettings,
        verifier: Arc<dyn AuthVerifier>,
        notifier: Arc<dyn InviteNotifier>,
    ) -> Self {
        let audit = Arc::new(AuditLogService::new(store.clone()));
        let collections = Arc::new(CollectionService::new(store.clone()));
        let invites = Arc::new(InviteService::new(
            store.clone(),
            collections.clone(),
            audit.clone(),
            notifier,
            settings,
        ));

        Self {
            store,
            collections,
            invites,
            audit,
            verifier,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = uri.path(),
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request"
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", user_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
