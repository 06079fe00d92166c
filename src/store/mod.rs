mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Filter for reading the audit trail.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub collection_id: Option<String>,
    pub invite_id: Option<String>,
}

/// Store defines the database interface.
///
/// Multi-statement operations (collection creation, sample renumbering,
/// invite acceptance, the expiry sweep) are atomic within one call.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn has_admin_user(&self) -> Result<bool>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Collection operations
    fn create_collection_with_owner(
        &self,
        collection: &Collection,
        owner: &CollectionMember,
    ) -> Result<()>;
    fn get_collection(&self, id: &str) -> Result<Option<Collection>>;
    fn list_member_collections(&self, user_id: &str) -> Result<Vec<Collection>>;
    fn update_collection(&self, collection: &Collection) -> Result<()>;
    fn soft_delete_collection(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    // Membership operations
    fn get_membership(&self, collection_id: &str, user_id: &str)
    -> Result<Option<CollectionMember>>;
    fn get_membership_by_id(&self, id: &str) -> Result<Option<CollectionMember>>;
    fn list_members(&self, collection_id: &str) -> Result<Vec<MemberWithUser>>;
    fn create_membership(&self, member: &CollectionMember) -> Result<()>;
    /// Inserts the membership unless one already exists for the pair, and
    /// returns whichever row is stored.
    fn ensure_membership(&self, member: &CollectionMember) -> Result<CollectionMember>;
    fn update_membership_role(&self, id: &str, role: CollectionRole) -> Result<()>;
    fn delete_membership(&self, id: &str) -> Result<bool>;

    // Sample operations
    fn create_sample(&self, sample: &Sample) -> Result<()>;
    fn get_sample(&self, id: &str) -> Result<Option<Sample>>;
    fn soft_delete_sample(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    // Collection-sample link operations
    fn get_collection_sample(
        &self,
        collection_id: &str,
        sample_id: &str,
    ) -> Result<Option<CollectionSample>>;
    /// Every link of the collection ordered by position, deleted samples included.
    fn list_collection_samples(&self, collection_id: &str) -> Result<Vec<CollectionSample>>;
    /// Links the sample at position `max + 1`.
    fn add_collection_sample(
        &self,
        collection_id: &str,
        sample_id: &str,
        added_at: DateTime<Utc>,
    ) -> Result<CollectionSample>;
    /// Unlinks the sample and renumbers the remaining links from 1.
    fn remove_collection_sample(&self, collection_id: &str, sample_id: &str) -> Result<bool>;
    /// Rewrites positions 1..N in the given order. Fails with `Conflict` if
    /// `ordered` is not exactly the collection's current set of links.
    fn write_sample_positions(&self, collection_id: &str, ordered: &[String]) -> Result<()>;
    fn is_member_of_sample_collection(
        &self,
        user_id: &str,
        sample_id: &str,
        collection_id: Option<&str>,
    ) -> Result<bool>;

    // Invite operations
    fn create_invite(&self, invite: &Invite) -> Result<()>;
    fn get_invite(&self, id: &str) -> Result<Option<Invite>>;
    fn get_invite_by_token(&self, token: &str) -> Result<Option<Invite>>;
    fn get_invite_details(&self, id: &str) -> Result<Option<InviteDetails>>;
    fn count_recent_invites_by_inviter(&self, inviter_id: &str, since: DateTime<Utc>)
    -> Result<i64>;
    /// Moves a PENDING invite to `to`, binding unset invitee fields. Any
    /// target other than EXPIRED also requires `expires_at >= at`. Returns
    /// `None` when the conditional update matched no row.
    fn transition_invite(
        &self,
        id: &str,
        to: InviteStatus,
        binding: Option<&InviteeBinding>,
        at: DateTime<Utc>,
    ) -> Result<Option<Invite>>;
    /// Accepts a PENDING, unexpired invite and materializes the membership in
    /// the same transaction. Returns `None` when the conditional update
    /// matched no row.
    fn accept_invite(
        &self,
        id: &str,
        binding: &InviteeBinding,
        member: &CollectionMember,
        now: DateTime<Utc>,
    ) -> Result<Option<Invite>>;
    /// Marks every PENDING invite with `expires_at < now` as EXPIRED and
    /// returns them.
    fn expire_pending_invites(&self, now: DateTime<Utc>) -> Result<Vec<Invite>>;

    // Audit operations
    fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()>;
    fn list_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>>;

    fn close(&self) -> Result<()>;
}
