use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{AuditLogFilter, Store};
use crate::types::{AuditAction, AuditLogEntry};

#[derive(Debug, Clone)]
pub struct AuditLogParams {
    pub actor_id: String,
    pub action: AuditAction,
    pub collection_id: Option<String>,
    pub target_user_id: Option<String>,
    pub invite_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Append-only sink for security-relevant actions.
pub trait AuditLogger: Send + Sync {
    fn log(&self, params: AuditLogParams) -> Result<()>;
}

pub struct AuditLogService {
    store: Arc<dyn Store>,
}

impl AuditLogService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn list(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>> {
        self.store.list_audit_logs(filter)
    }
}

impl AuditLogger for AuditLogService {
    fn log(&self, params: AuditLogParams) -> Result<()> {
        let entry = AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            actor_id: params.actor_id,
            action: params.action,
            collection_id: params.collection_id,
            target_user_id: params.target_user_id,
            invite_id: params.invite_id,
            metadata: params.metadata,
            created_at: Utc::now(),
        };

        self.store.append_audit_log(&entry)
    }
}

/// Writes an audit entry; a failure is logged and swallowed.
pub(crate) fn record(logger: &dyn AuditLogger, params: AuditLogParams) {
    let action = params.action.as_str();
    let invite_id = params.invite_id.clone();

    if let Err(e) = logger.log(params) {
        tracing::warn!(action, invite_id = ?invite_id, error = %e, "Failed to write audit log");
    }
}
