//! Domain services for collections, invites and their audit trail.

mod access;
mod audit;
mod collections;
mod invites;
mod notify;
mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use access::{can_access_sample, ensure_sample_access};
pub use audit::{AuditLogParams, AuditLogService, AuditLogger};
pub use collections::CollectionService;
pub use invites::{AcceptedInvite, CreatedInvite, InviteService, InviteSettings, generate_invite_token};
pub use notify::{InviteMessage, InviteNotifier, LogNotifier};
pub use scheduler::{DEFAULT_SWEEP_INTERVAL, InviteExpirationScheduler};
