use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::invites::{CreatedInvite, InviteService};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{
    Capability, Collection, CollectionMember, CollectionRole, CollectionSample,
    CollectionWithSamples, Lifecycle, MemberWithUser,
};

/// Role-based operations on collections, their sample links and members.
///
/// Every operation resolves the caller's membership row and checks it against
/// a [`Capability`] before touching data. Denials are final.
pub struct CollectionService {
    store: Arc<dyn Store>,
}

impl CollectionService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn active_collection(&self, collection_id: &str) -> Result<Collection> {
        self.store
            .get_collection(collection_id)?
            .filter(|c| c.lifecycle.is_active())
            .ok_or(Error::NotFound("Collection"))
    }

    fn authorize(
        &self,
        collection_id: &str,
        user_id: &str,
        capability: Capability,
    ) -> Result<(Collection, CollectionMember)> {
        let collection = self.active_collection(collection_id)?;

        let member = self
            .store
            .get_membership(collection_id, user_id)?
            .ok_or_else(|| Error::forbidden("You are not a member of this collection"))?;

        if !member.role.allows(capability) {
            return Err(Error::forbidden(format!(
                "{} role cannot perform this action",
                member.role
            )));
        }

        Ok((collection, member))
    }

    fn active_samples(&self, collection_id: &str) -> Result<Vec<CollectionSample>> {
        Ok(self
            .store
            .list_collection_samples(collection_id)?
            .into_iter()
            .filter(|link| !link.sample.is_deleted)
            .collect())
    }

    pub fn get_for_user(&self, collection_id: &str, user_id: &str) -> Result<CollectionWithSamples> {
        let (collection, _) = self.authorize(collection_id, user_id, Capability::Read)?;
        let samples = self.active_samples(collection_id)?;
        Ok(CollectionWithSamples {
            collection,
            samples,
        })
    }

    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Collection>> {
        self.store.list_member_collections(user_id)
    }

    pub fn create(&self, name: &str, owner_id: &str) -> Result<Collection> {
        let now = Utc::now();
        let collection = Collection {
            id: Uuid::new_v4().to_string(),
            user_id: owner_id.to_string(),
            name: name.to_string(),
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };
        let owner = CollectionMember {
            id: Uuid::new_v4().to_string(),
            collection_id: collection.id.clone(),
            user_id: owner_id.to_string(),
            role: CollectionRole::Owner,
            created_at: now,
            updated_at: now,
        };

        self.store.create_collection_with_owner(&collection, &owner)?;
        tracing::info!(collection_id = %collection.id, owner_id, "Collection created");
        Ok(collection)
    }

    pub fn update_for_user(&self, collection_id: &str, user_id: &str, name: &str) -> Result<Collection> {
        let (mut collection, _) = self.authorize(collection_id, user_id, Capability::ManageMeta)?;

        collection.name = name.to_string();
        collection.updated_at = Utc::now();
        self.store.update_collection(&collection)?;

        Ok(collection)
    }

    pub fn delete_for_user(&self, collection_id: &str, user_id: &str) -> Result<()> {
        self.authorize(collection_id, user_id, Capability::ManageMeta)?;
        self.store.soft_delete_collection(collection_id, Utc::now())?;
        tracing::info!(collection_id, user_id, "Collection deleted");
        Ok(())
    }

    pub fn add_sample_for_user(
        &self,
        collection_id: &str,
        user_id: &str,
        sample_id: &str,
    ) -> Result<CollectionSample> {
        self.authorize(collection_id, user_id, Capability::ManageContent)?;

        let sample = self
            .store
            .get_sample(sample_id)?
            .filter(|s| s.lifecycle.is_active())
            .ok_or(Error::NotFound("Sample"))?;

        if self
            .store
            .get_membership(collection_id, &sample.user_id)?
            .is_none()
        {
            return Err(Error::forbidden(
                "The sample's owner is not a member of this collection",
            ));
        }

        if self
            .store
            .get_collection_sample(collection_id, sample_id)?
            .is_some()
        {
            return Err(Error::conflict("Sample already exists in collection"));
        }

        self.store
            .add_collection_sample(collection_id, sample_id, Utc::now())
    }

    pub fn remove_sample_for_user(
        &self,
        collection_id: &str,
        user_id: &str,
        sample_id: &str,
    ) -> Result<()> {
        self.authorize(collection_id, user_id, Capability::ManageContent)?;

        if !self.store.remove_collection_sample(collection_id, sample_id)? {
            return Err(Error::NotFound("Sample"));
        }
        Ok(())
    }

    pub fn reorder_samples_for_user(
        &self,
        collection_id: &str,
        user_id: &str,
        ordered_ids: &[String],
    ) -> Result<Vec<CollectionSample>> {
        self.authorize(collection_id, user_id, Capability::ManageContent)?;

        let current: Vec<String> = self
            .store
            .list_collection_samples(collection_id)?
            .into_iter()
            .map(|link| link.sample_id)
            .collect();

        let merged = merge_sample_order(&current, ordered_ids)?;
        self.store.write_sample_positions(collection_id, &merged)?;

        self.active_samples(collection_id)
    }

    pub fn list_members(&self, collection_id: &str, user_id: &str) -> Result<Vec<MemberWithUser>> {
        self.authorize(collection_id, user_id, Capability::Read)?;
        self.store.list_members(collection_id)
    }

    pub fn invite_member(
        &self,
        collection_id: &str,
        user_id: &str,
        requested_role: Option<CollectionRole>,
        invites: &InviteService,
    ) -> Result<CreatedInvite> {
        let (collection, _) = self.authorize(collection_id, user_id, Capability::ManageMeta)?;
        invites.create_invite(&collection, user_id, requested_role)
    }

    pub fn update_member_role(
        &self,
        collection_id: &str,
        user_id: &str,
        member_id: &str,
        role: CollectionRole,
    ) -> Result<CollectionMember> {
        self.authorize(collection_id, user_id, Capability::ManageMeta)?;

        if !role.is_assignable() {
            return Err(Error::bad_request(format!("Role {role} cannot be assigned")));
        }

        let target = self.member_of(collection_id, member_id)?;
        if target.role == CollectionRole::Owner {
            return Err(Error::bad_request("The owner's role cannot be changed"));
        }
        if target.role == role {
            return Ok(target);
        }

        self.store.update_membership_role(member_id, role)?;
        self.member_of(collection_id, member_id)
    }

    pub fn remove_member(&self, collection_id: &str, user_id: &str, member_id: &str) -> Result<()> {
        self.authorize(collection_id, user_id, Capability::ManageMeta)?;

        let target = self.member_of(collection_id, member_id)?;
        if target.role == CollectionRole::Owner {
            return Err(Error::bad_request("The owner cannot be removed"));
        }

        if !self.store.delete_membership(member_id)? {
            return Err(Error::NotFound("Member"));
        }
        tracing::info!(collection_id, member_id, removed_user = %target.user_id, "Member removed");
        Ok(())
    }

    /// Creates the membership an accepted invite grants, or returns the
    /// existing one. The invite itself is the authorization.
    pub fn ensure_membership_from_invite(
        &self,
        collection_id: &str,
        user_id: &str,
        role: CollectionRole,
    ) -> Result<CollectionMember> {
        let now = Utc::now();
        self.store.ensure_membership(&CollectionMember {
            id: Uuid::new_v4().to_string(),
            collection_id: collection_id.to_string(),
            user_id: user_id.to_string(),
            role,
            created_at: now,
            updated_at: now,
        })
    }

    fn member_of(&self, collection_id: &str, member_id: &str) -> Result<CollectionMember> {
        self.store
            .get_membership_by_id(member_id)?
            .filter(|m| m.collection_id == collection_id)
            .ok_or(Error::NotFound("Member"))
    }
}

/// Places `requested` first, then every other id of `current` in its
/// existing relative order.
pub(crate) fn merge_sample_order(current: &[String], requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Err(Error::bad_request("sample_ids must not be empty"));
    }

    let known: HashSet<&str> = current.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(requested.len());

    for id in requested {
        if !known.contains(id.as_str()) {
            return Err(Error::bad_request(format!(
                "Sample {id} is not in this collection"
            )));
        }
        if !seen.insert(id.as_str()) {
            return Err(Error::bad_request(format!("Duplicate sample id {id}")));
        }
    }

    let mut merged = requested.to_vec();
    merged.extend(
        current
            .iter()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned(),
    );
    Ok(merged)
}
