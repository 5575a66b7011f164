//! Resolves who may take part in a conversation.
//!
//! Every chat and call operation funnels through [`resolve_participants`]
//! before anything is stored or emitted, so the friendship/membership
//! rules live in exactly one place.

use crate::error::EventError;
use crate::store::{FriendshipStore, GroupStore, StoreError};

/// Resolve the full participant set for a conversation target.
///
/// For a direct target the result is `[acting, target]`; for a group
/// target it is every member of the group, acting user included.
pub async fn resolve_participants(
    friendships: &dyn FriendshipStore,
    groups: &dyn GroupStore,
    acting_user_id: &str,
    target_id: &str,
    is_group: bool,
) -> Result<Vec<String>, EventError> {
    if is_group {
        let members = match groups.group_member_ids(target_id).await {
            Ok(members) => members,
            Err(StoreError::NotFound(_)) => {
                return Err(EventError::forbidden("You are not a member of this group"));
            }
            Err(err) => return Err(err.into()),
        };
        if !members.iter().any(|m| m == acting_user_id) {
            return Err(EventError::forbidden("You are not a member of this group"));
        }
        return Ok(members);
    }

    if friendships.are_blocked(acting_user_id, target_id).await? {
        return Err(EventError::forbidden(
            "Messaging is blocked between these users",
        ));
    }
    if !friendships.are_friends(acting_user_id, target_id).await? {
        return Err(EventError::forbidden("You can only chat with your friends"));
    }

    Ok(vec![acting_user_id.to_string(), target_id.to_string()])
}
