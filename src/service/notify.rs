use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct InviteMessage {
    pub deep_link: String,
    pub fallback_url: String,
    pub identifier: Option<String>,
    pub collection_name: String,
    pub inviter_name: Option<String>,
}

/// Delivery hook for new invites (push, email, ...).
pub trait InviteNotifier: Send + Sync {
    fn send_invite_notification(&self, message: &InviteMessage) -> Result<()>;
}

/// Logs the invite payload instead of delivering it.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl InviteNotifier for LogNotifier {
    fn send_invite_notification(&self, message: &InviteMessage) -> Result<()> {
        tracing::info!(
            deep_link = %message.deep_link,
            fallback_url = %message.fallback_url,
            identifier = ?message.identifier,
            collection_name = %message.collection_name,
            inviter_name = ?message.inviter_name,
            "Invite notification"
        );
        Ok(())
    }
}
