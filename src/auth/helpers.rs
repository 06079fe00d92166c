use std::sync::Arc;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::Utc;
use serde::Serialize;

use super::middleware::AuthError;
use super::{TokenGenerator, parse_token};
use crate::store::Store;
use crate::types::User;

pub const ADMIN_ROLE: &str = "admin";
pub const USER_ROLE: &str = "user";

/// The authenticated caller as seen by handlers and services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub roles: Vec<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl AuthUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        let roles = if user.is_admin {
            vec![ADMIN_ROLE.to_string(), USER_ROLE.to_string()]
        } else {
            vec![USER_ROLE.to_string()]
        };

        Self {
            id: user.id.clone(),
            roles,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// Resolves request credentials to a caller.
///
/// `Ok(None)` means the request carried no credentials at all.
pub trait AuthVerifier: Send + Sync {
    fn verify(&self, headers: &HeaderMap) -> Result<Option<AuthUser>, AuthError>;
}

/// Verifies `Authorization: Bearer swb_...` API tokens against the store.
pub struct TokenVerifier {
    store: Arc<dyn Store>,
    generator: TokenGenerator,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            generator: TokenGenerator::new(),
        }
    }
}

impl AuthVerifier for TokenVerifier {
    fn verify(&self, headers: &HeaderMap) -> Result<Option<AuthUser>, AuthError> {
        let auth_header = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());

        let Some(raw_token) = extract_bearer_token(auth_header)? else {
            return Ok(None);
        };

        let (lookup, _secret) = parse_token(raw_token).map_err(|_| AuthError::InvalidToken)?;

        let token = self
            .store
            .get_token_by_lookup(&lookup)
            .map_err(|_| AuthError::InternalError)?
            .ok_or(AuthError::InvalidToken)?;

        if !self
            .generator
            .verify(raw_token, &token.token_hash)
            .map_err(|_| AuthError::InternalError)?
        {
            return Err(AuthError::InvalidToken);
        }

        if token.expires_at.is_some_and(|at| at < Utc::now()) {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .store
            .get_user(&token.user_id)
            .map_err(|_| AuthError::InternalError)?
            .ok_or(AuthError::InvalidToken)?;

        if let Err(e) = self.store.update_token_last_used(&token.id) {
            tracing::warn!("Failed to update token last_used_at: {e}");
        }

        Ok(Some(AuthUser::from(&user)))
    }
}

/// Returns the bearer credential, `None` when no header is present, or
/// `InvalidScheme` for any other scheme.
pub fn extract_bearer_token(auth_header: Option<&str>) -> Result<Option<&str>, AuthError> {
    match auth_header {
        None => Ok(None),
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim()))
            .ok_or(AuthError::InvalidScheme),
    }
}
