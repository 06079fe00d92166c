use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::audit::{self, AuditLogParams, AuditLogger};
use super::collections::CollectionService;
use super::notify::{InviteMessage, InviteNotifier};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{
    AuditAction, Collection, CollectionMember, CollectionRole, CollectionSummary, Invite,
    InviteDetails, InviteStatus, InviteeBinding, User, UserSummary,
};

const INVITE_TOKEN_PREFIX: &str = "inv_";
const INVITE_TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone)]
pub struct InviteSettings {
    pub ttl: Duration,
    pub rate_limit_max: i64,
    pub rate_limit_window: Duration,
    pub deep_link_scheme: String,
    pub fallback_url: String,
    pub token_attempts: u32,
}

impl Default for InviteSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::days(7),
            rate_limit_max: 5,
            rate_limit_window: Duration::minutes(10),
            deep_link_scheme: "swatchbook".to_string(),
            fallback_url: "https://swatchbook.app/download".to_string(),
            token_attempts: 5,
        }
    }
}

impl InviteSettings {
    #[must_use]
    pub fn deep_link(&self, token: &str) -> String {
        format!("{}://invite/{token}", self.deep_link_scheme)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedInvite {
    #[serde(flatten)]
    pub invite: Invite,
    pub collection: CollectionSummary,
    pub inviter: UserSummary,
    pub deep_link: String,
    pub fallback_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedInvite {
    pub invite: Invite,
    pub membership: CollectionMember,
}

/// `inv_` followed by 16 random bytes, base64url without padding.
#[must_use]
pub fn generate_invite_token() -> String {
    let mut bytes = [0u8; INVITE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{INVITE_TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Issues invites and drives them through
/// `PENDING -> ACCEPTED | REJECTED | EXPIRED`.
///
/// Expiry is applied lazily on every resolve, accept and reject, and
/// proactively by [`InviteService::expire_invites`]. Every transition is
/// a conditional update, so concurrent callers cannot both win.
pub struct InviteService {
    store: Arc<dyn Store>,
    collections: Arc<CollectionService>,
    audit: Arc<dyn AuditLogger>,
    notifier: Arc<dyn InviteNotifier>,
    settings: InviteSettings,
}

impl InviteService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        collections: Arc<CollectionService>,
        audit: Arc<dyn AuditLogger>,
        notifier: Arc<dyn InviteNotifier>,
        settings: InviteSettings,
    ) -> Self {
        Self {
            store,
            collections,
            audit,
            notifier,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &InviteSettings {
        &self.settings
    }

    /// The caller must already hold OWNER on `collection`.
    pub fn create_invite(
        &self,
        collection: &Collection,
        inviter_id: &str,
        requested_role: Option<CollectionRole>,
    ) -> Result<CreatedInvite> {
        if requested_role == Some(CollectionRole::Owner) {
            return Err(Error::bad_request("Cannot invite a user with the OWNER role"));
        }
        // Invites never grant more than VIEW_ONLY; promotion happens via role change.
        let role = CollectionRole::ViewOnly;

        let now = Utc::now();
        let recent = self
            .store
            .count_recent_invites_by_inviter(inviter_id, now - self.settings.rate_limit_window)?;
        if recent >= self.settings.rate_limit_max {
            return Err(Error::TooManyRequests(
                "Invite rate limit exceeded for inviter".to_string(),
            ));
        }

        let inviter = self
            .store
            .get_user(inviter_id)?
            .ok_or(Error::NotFound("User"))?;

        let invite = self.insert_with_fresh_token(collection, inviter_id, role, now)?;

        audit::record(
            self.audit.as_ref(),
            AuditLogParams {
                actor_id: inviter_id.to_string(),
                action: AuditAction::InviteCreated,
                collection_id: Some(collection.id.clone()),
                target_user_id: None,
                invite_id: Some(invite.id.clone()),
                metadata: Some(json!({
                    "role": invite.role,
                    "expires_at": invite.expires_at,
                })),
            },
        );

        tracing::info!(
            invite_id = %invite.id,
            collection_id = %collection.id,
            inviter_id,
            "Invite created"
        );

        let deep_link = self.settings.deep_link(&invite.token);
        let message = InviteMessage {
            deep_link: deep_link.clone(),
            fallback_url: self.settings.fallback_url.clone(),
            identifier: None,
            collection_name: collection.name.clone(),
            inviter_name: inviter.name.clone(),
        };
        if let Err(e) = self.notifier.send_invite_notification(&message) {
            tracing::warn!(invite_id = %invite.id, error = %e, "Failed to send invite notification");
        }

        Ok(CreatedInvite {
            collection: CollectionSummary {
                id: collection.id.clone(),
                name: collection.name.clone(),
            },
            inviter: UserSummary::from(&inviter),
            deep_link,
            fallback_url: self.settings.fallback_url.clone(),
            invite,
        })
    }

    fn insert_with_fresh_token(
        &self,
        collection: &Collection,
        inviter_id: &str,
        role: CollectionRole,
        now: DateTime<Utc>,
    ) -> Result<Invite> {
        for attempt in 1..=self.settings.token_attempts {
            let invite = Invite {
                id: Uuid::new_v4().to_string(),
                collection_id: collection.id.clone(),
                inviter_id: inviter_id.to_string(),
                invitee_user_id: None,
                invitee_email: None,
                invitee_username: None,
                role,
                token: generate_invite_token(),
                status: InviteStatus::Pending,
                expires_at: now + self.settings.ttl,
                created_at: now,
                updated_at: now,
            };

            match self.store.create_invite(&invite) {
                Ok(()) => return Ok(invite),
                Err(Error::TokenCollision) => {
                    tracing::warn!(attempt, "Invite token collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Internal(
            "Failed to generate unique invite token".to_string(),
        ))
    }

    /// Public lookup by token. Past-due PENDING invites are expired here.
    pub fn resolve(&self, token: &str) -> Result<InviteDetails> {
        let invite = self
            .store
            .get_invite_by_token(token)?
            .ok_or(Error::NotFound("Invite"))?;

        if invite.status == InviteStatus::Expired {
            return Err(Error::Gone("Invite has expired".to_string()));
        }
        if invite.status == InviteStatus::Pending && invite.is_past_due(Utc::now()) {
            return Err(self.expire_lazily(&invite));
        }

        self.store
            .get_invite_details(&invite.id)?
            .ok_or(Error::NotFound("Invite"))
    }

    pub fn accept(&self, invite_id: &str, user_id: &str) -> Result<AcceptedInvite> {
        let (invite, user) = self.guard_transition(invite_id, user_id)?;

        let collection = self.store.get_collection(&invite.collection_id)?;
        if !collection.is_some_and(|c| c.lifecycle.is_active()) {
            return Err(Error::NotFound("Collection"));
        }

        let now = Utc::now();
        let binding = binding_for(&user);
        let member = CollectionMember {
            id: Uuid::new_v4().to_string(),
            collection_id: invite.collection_id.clone(),
            user_id: user.id.clone(),
            role: invite.role,
            created_at: now,
            updated_at: now,
        };

        let accepted = self
            .store
            .accept_invite(&invite.id, &binding, &member, now)?
            .ok_or_else(|| self.lost_transition(&invite.id))?;

        let membership = self.collections.ensure_membership_from_invite(
            &accepted.collection_id,
            &user.id,
            accepted.role,
        )?;

        audit::record(
            self.audit.as_ref(),
            AuditLogParams {
                actor_id: user.id.clone(),
                action: AuditAction::InviteAccepted,
                collection_id: Some(accepted.collection_id.clone()),
                target_user_id: Some(user.id.clone()),
                invite_id: Some(accepted.id.clone()),
                metadata: Some(json!({ "role": accepted.role })),
            },
        );

        tracing::info!(
            invite_id = %accepted.id,
            collection_id = %accepted.collection_id,
            user_id = %user.id,
            "Invite accepted"
        );

        Ok(AcceptedInvite {
            invite: accepted,
            membership,
        })
    }

    pub fn reject(&self, invite_id: &str, user_id: &str) -> Result<Invite> {
        let (invite, user) = self.guard_transition(invite_id, user_id)?;

        let binding = InviteeBinding {
            user_id: user.id.clone(),
            email: None,
            username: None,
        };
        let rejected = self
            .store
            .transition_invite(&invite.id, InviteStatus::Rejected, Some(&binding), Utc::now())?
            .ok_or_else(|| self.lost_transition(&invite.id))?;

        audit::record(
            self.audit.as_ref(),
            AuditLogParams {
                actor_id: user.id.clone(),
                action: AuditAction::InviteRejected,
                collection_id: Some(rejected.collection_id.clone()),
                target_user_id: Some(user.id.clone()),
                invite_id: Some(rejected.id.clone()),
                metadata: None,
            },
        );

        tracing::info!(invite_id = %rejected.id, user_id = %user.id, "Invite rejected");
        Ok(rejected)
    }

    /// Expires every overdue PENDING invite and returns how many were
    /// expired. Audit failures are logged per invite and never undo the
    /// status change.
    pub fn expire_invites(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.store.expire_pending_invites(now)?;

        for invite in &expired {
            audit::record(self.audit.as_ref(), expired_params(invite));
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired pending invites");
        }
        Ok(expired.len())
    }

    /// Guard clauses shared by accept and reject.
    fn guard_transition(&self, invite_id: &str, user_id: &str) -> Result<(Invite, User)> {
        let invite = self
            .store
            .get_invite(invite_id)?
            .ok_or(Error::NotFound("Invite"))?;

        if invite.status != InviteStatus::Pending {
            return Err(Error::conflict("Invite has already been processed"));
        }

        if invite.is_past_due(Utc::now()) {
            return Err(self.expire_lazily(&invite));
        }

        if invite
            .invitee_user_id
            .as_deref()
            .is_some_and(|bound| bound != user_id)
        {
            return Err(Error::forbidden("Invite is not intended for this user"));
        }

        let user = self
            .store
            .get_user(user_id)?
            .ok_or(Error::NotFound("User"))?;

        if let Some(bound_email) = invite.invitee_email.as_deref() {
            let matches = user
                .email
                .as_deref()
                .is_some_and(|email| email.eq_ignore_ascii_case(bound_email));
            if !matches {
                return Err(Error::forbidden(
                    "Invite email does not match the signed-in user",
                ));
            }
        }

        Ok((invite, user))
    }

    /// Error for an accept or reject whose conditional write matched no row:
    /// `Gone` if the deadline passed in between, `Conflict` otherwise.
    fn lost_transition(&self, invite_id: &str) -> Error {
        let invite = match self.store.get_invite(invite_id) {
            Ok(Some(invite)) => invite,
            Ok(None) => return Error::NotFound("Invite"),
            Err(e) => return e,
        };

        match invite.status {
            InviteStatus::Expired => Error::Gone("Invite has expired".to_string()),
            InviteStatus::Pending if invite.is_past_due(Utc::now()) => self.expire_lazily(&invite),
            _ => Error::conflict("Invite has already been processed"),
        }
    }

    /// Moves a past-due invite to EXPIRED and returns the `Gone` error for
    /// the caller. Only the call that performs the transition audits it.
    fn expire_lazily(&self, invite: &Invite) -> Error {
        match self
            .store
            .transition_invite(&invite.id, InviteStatus::Expired, None, Utc::now())
        {
            Ok(Some(expired)) => {
                audit::record(self.audit.as_ref(), expired_params(&expired));
                tracing::info!(invite_id = %expired.id, "Invite expired on access");
            }
            Ok(None) => {}
            Err(e) => return e,
        }

        Error::Gone("Invite has expired".to_string())
    }
}

fn binding_for(user: &User) -> InviteeBinding {
    InviteeBinding {
        user_id: user.id.clone(),
        email: user.email.clone(),
        username: user.name.clone(),
    }
}

fn expired_params(invite: &Invite) -> AuditLogParams {
    AuditLogParams {
        actor_id: invite.inviter_id.clone(),
        action: AuditAction::InviteExpired,
        collection_id: Some(invite.collection_id.clone()),
        target_user_id: invite.invitee_user_id.clone(),
        invite_id: Some(invite.id.clone()),
        metadata: Some(json!({
            "role": invite.role,
            "expires_at": invite.expires_at,
        })),
    }
}
