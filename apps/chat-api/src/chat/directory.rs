//! Conversation directory: maps participant sets to chat rooms.

use confab_common::id::{prefix, prefixed_ulid};

use crate::chat::participants::resolve_participants;
use crate::error::EventError;
use crate::store::{ChatRoom, ChatStore, FriendshipStore, GroupStore, UserStore};

/// Find the room for a conversation target, creating it on first use.
///
/// Authorization is re-checked here rather than trusted from the caller,
/// since room creation is reachable from several gateway actions. A fresh
/// room id is generated speculatively; the store discards it when a room
/// for the same pair or group already exists.
pub async fn get_or_create_room(
    users: &dyn UserStore,
    friendships: &dyn FriendshipStore,
    groups: &dyn GroupStore,
    chat: &dyn ChatStore,
    acting_user_id: &str,
    target_id: &str,
    is_group: bool,
) -> Result<ChatRoom, EventError> {
    if !is_group && users.find_by_id(target_id).await?.is_none() {
        return Err(EventError::not_found("User not found"));
    }

    resolve_participants(friendships, groups, acting_user_id, target_id, is_group).await?;

    let new_room_id = prefixed_ulid(prefix::ROOM);
    let room = if is_group {
        chat.create_or_get_group_room(target_id, &new_room_id).await?
    } else {
        chat.create_or_get_direct_room(acting_user_id, target_id, &new_room_id)
            .await?
    };
    Ok(room)
}
