use std::fmt;

use serde::{Deserialize, Serialize};

/// A member's role in a collection.
///
/// Variants are declared in capability order, so the derived `Ord` is the
/// role lattice: `ViewOnly < Editor < Owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionRole {
    ViewOnly,
    Editor,
    Owner,
}

impl CollectionRole {
    /// Returns true if this role grants at least what `required` grants.
    #[must_use]
    pub fn has_at_least(self, required: CollectionRole) -> bool {
        self >= required
    }

    #[must_use]
    pub fn allows(self, capability: Capability) -> bool {
        self.has_at_least(capability.required_role())
    }

    /// Roles that may be handed out through invites or role changes.
    #[must_use]
    pub const fn is_assignable(self) -> bool {
        matches!(self, Self::Editor | Self::ViewOnly)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Editor => "EDITOR",
            Self::ViewOnly => "VIEW_ONLY",
        }
    }

    pub fn parse(s: &str) -> Option<CollectionRole> {
        match s {
            "OWNER" => Some(Self::Owner),
            "EDITOR" => Some(Self::Editor),
            "VIEW_ONLY" => Some(Self::ViewOnly),
            _ => None,
        }
    }
}

impl fmt::Display for CollectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission tiers checked by the collection service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Get the collection, list members.
    Read,
    /// Add, remove and reorder samples.
    ManageContent,
    /// Rename, delete, invite, change roles, remove members.
    ManageMeta,
}

impl Capability {
    #[must_use]
    pub const fn required_role(self) -> CollectionRole {
        match self {
            Self::Read => CollectionRole::ViewOnly,
            Self::ManageContent => CollectionRole::Editor,
            Self::ManageMeta => CollectionRole::Owner,
        }
    }
}
