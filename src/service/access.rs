use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::Sample;

/// Returns true if the user may read the sample.
///
/// Owners and admins always can. Anyone else needs a membership in an
/// active collection that links the sample, optionally restricted to
/// `collection_id`.
pub fn can_access_sample(
    store: &dyn Store,
    user: &AuthUser,
    sample: &Sample,
    collection_id: Option<&str>,
) -> Result<bool> {
    if sample.user_id == user.id || user.is_admin() {
        return Ok(true);
    }

    store.is_member_of_sample_collection(&user.id, &sample.id, collection_id)
}

pub fn ensure_sample_access(
    store: &dyn Store,
    user: &AuthUser,
    sample: &Sample,
    collection_id: Option<&str>,
) -> Result<()> {
    if can_access_sample(store, user, sample, collection_id)? {
        Ok(())
    } else {
        Err(Error::forbidden("You do not have access to this sample"))
    }
}
