use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CollectionRole, Token};

// Collections

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCollectionRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddSampleRequest {
    pub sample_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderSamplesRequest {
    pub sample_ids: Vec<String>,
}

// Members and invites

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: CollectionRole,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateInviteRequest {
    #[serde(default)]
    pub role: Option<CollectionRole>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveInviteParams {
    pub token: String,
}

// Samples

#[derive(Debug, Deserialize)]
pub struct CreateSampleRequest {
    pub title: String,
    pub material_type: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SampleAccessParams {
    #[serde(default)]
    pub collection_id: Option<String>,
}

// Admin

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub invite_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            id: token.id,
            user_id: token.user_id,
            created_at: token.created_at,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: TokenResponse,
}
