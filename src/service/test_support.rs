use std::sync::{Arc, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use tempfile::TempDir;

use super::{
    AuditLogParams, AuditLogService, AuditLogger, CollectionService, InviteService,
    InviteSettings, LogNotifier,
};
use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::store::{SqliteStore, Store};
use crate::types::{Lifecycle, Sample, User};

pub(crate) struct FailingAuditLogger;

impl AuditLogger for FailingAuditLogger {
    fn log(&self, _params: AuditLogParams) -> Result<()> {
        Err(Error::Internal("audit sink unavailable".to_string()))
    }
}

/// Services wired over a throwaway SQLite database.
pub(crate) struct Fixture {
    _temp: TempDir,
    sqlite: Arc<SqliteStore>,
    pub store: Arc<dyn Store>,
    pub collections: Arc<CollectionService>,
    pub invites: InviteService,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_audit(audit: Arc<dyn AuditLogger>) -> Self {
        Self::build(Some(audit))
    }

    fn build(audit: Option<Arc<dyn AuditLogger>>) -> Self {
        let temp = TempDir::new().unwrap();
        let sqlite = Arc::new(SqliteStore::new(temp.path().join("test.db")).unwrap());
        sqlite.initialize().unwrap();

        let store: Arc<dyn Store> = sqlite.clone();
        let audit = audit.unwrap_or_else(|| Arc::new(AuditLogService::new(store.clone())));
        let collections = Arc::new(CollectionService::new(store.clone()));
        let invites = InviteService::new(
            store.clone(),
            collections.clone(),
            audit,
            Arc::new(LogNotifier),
            InviteSettings::default(),
        );

        Self {
            _temp: temp,
            sqlite,
            store,
            collections,
            invites,
        }
    }

    pub fn store_conn(&self) -> MutexGuard<'_, Connection> {
        self.sqlite.connection()
    }

    fn insert_user(&self, id: &str, email: Option<&str>, is_admin: bool) -> AuthUser {
        let now = Utc::now();
        let user = User {
            id: id.to_string(),
            email: email.map(str::to_string),
            name: Some(id.to_string()),
            is_admin,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user).unwrap();
        AuthUser::from(&user)
    }

    pub fn user(&self, id: &str, email: Option<&str>) -> AuthUser {
        self.insert_user(id, email, false)
    }

    pub fn admin(&self, id: &str) -> AuthUser {
        self.insert_user(id, None, true)
    }

    pub fn sample(&self, id: &str, owner_id: &str) -> Sample {
        let now = Utc::now();
        let sample = Sample {
            id: id.to_string(),
            user_id: owner_id.to_string(),
            title: format!("{id} swatch"),
            material_type: "fabric".to_string(),
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.create_sample(&sample).unwrap();
        sample
    }
}
