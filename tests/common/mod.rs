#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use chrono::{DateTime, SecondsFormat, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

use swatchbook::auth::TokenGenerator;
use swatchbook::server::{AppState, create_router};
use swatchbook::service::InviteSettings;
use swatchbook::store::{SqliteStore, Store};
use swatchbook::types::User;

pub struct TestUser {
    pub id: String,
    pub token: String,
}

pub struct TestApp {
    _temp: TempDir,
    pub store: Arc<SqliteStore>,
    pub state: Arc<AppState>,
    pub router: Router,
    pub admin: TestUser,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(InviteSettings::default())
    }

    pub fn with_settings(settings: InviteSettings) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let store = Arc::new(SqliteStore::new(temp.path().join("test.db")).expect("open store"));
        store.initialize().expect("initialize store");

        let state = Arc::new(AppState::new(store.clone(), settings));
        let router = create_router(state.clone());

        let admin = seed_user(&store, "admin@example.com", true);

        Self {
            _temp: temp,
            store,
            state,
            router,
            admin,
        }
    }

    /// Creates a regular user and returns its id and a bearer token.
    pub fn user(&self, email: &str) -> TestUser {
        seed_user(&self.store, email, false)
    }

    /// Send a request through the app and return the response.
    pub async fn request(&self, req: Request<Body>) -> Response {
        tower::ServiceExt::oneshot(self.router.clone(), req)
            .await
            .expect("router is infallible")
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");
        self.request(req).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Response {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> Response {
        self.send(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    /// Creates a collection owned by `owner` and returns its id.
    pub async fn create_collection(&self, owner: &TestUser, name: &str) -> String {
        let resp = self
            .post(
                "/api/v1/collections",
                &owner.token,
                serde_json::json!({ "name": name }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        body["data"]["id"].as_str().expect("collection id").to_string()
    }

    /// Creates a sample owned by `owner` and returns its id.
    pub async fn create_sample(&self, owner: &TestUser, title: &str) -> String {
        let resp = self
            .post(
                "/api/v1/samples",
                &owner.token,
                serde_json::json!({ "title": title, "material_type": "linen" }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        body["data"]["id"].as_str().expect("sample id").to_string()
    }

    /// Issues an invite for `collection_id` and returns (invite id, token).
    pub async fn create_invite(&self, owner: &TestUser, collection_id: &str) -> (String, String) {
        let resp = self
            .post(
                &format!("/api/v1/collections/{collection_id}/invites"),
                &owner.token,
                serde_json::json!({}),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        (
            body["data"]["id"].as_str().expect("invite id").to_string(),
            body["data"]["token"].as_str().expect("invite token").to_string(),
        )
    }

    /// Moves an invite's deadline into the past.
    pub fn backdate_invite(&self, invite_id: &str, expires_at: DateTime<Utc>) {
        self.store
            .connection()
            .execute(
                "UPDATE invites SET expires_at = ?1 WHERE id = ?2",
                rusqlite::params![
                    expires_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                    invite_id
                ],
            )
            .expect("backdate invite");
    }
}

fn seed_user(store: &SqliteStore, email: &str, is_admin: bool) -> TestUser {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: Some(email.to_string()),
        name: email.split('@').next().map(str::to_string),
        is_admin,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user).expect("create user");

    let (token, raw) = TokenGenerator::new()
        .issue(&user.id, None)
        .expect("issue token");
    store.create_token(&token).expect("store token");

    TestUser {
        id: user.id,
        token: raw,
    }
}

/// Read the full response body as JSON.
pub async fn body_json(resp: Response) -> Value {
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse json body")
}
