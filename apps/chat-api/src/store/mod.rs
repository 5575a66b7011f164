//! Collaborator contracts the gateway depends on.
//!
//! Each trait is backed by Postgres in production and an in-memory map
//! in tests (and when no `DATABASE_URL` is configured).

pub mod db;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use db::DbStore;
pub use memory::{MemoryChatStore, MemoryFriendshipStore, MemoryGroupStore, MemoryUserStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A user as the gateway sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Conversation kind: exactly two users, or one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Direct,
    Group,
}

/// A durable conversation. The `room_id` doubles as the real-time
/// routing key connections subscribe to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub room_id: String,
    pub kind: RoomKind,
    /// The two participants for direct rooms, empty for group rooms.
    pub user_ids: Vec<String>,
    pub group_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
}

/// A persisted message. The durable record is the source of truth for
/// what gets broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for [`ChatStore::save_message`]. The id is allocated by the
/// caller (snowflake) so broadcast payloads match the stored record.
#[derive(Debug, Clone)]
pub struct NewStoredMessage {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;
}

#[async_trait]
pub trait FriendshipStore: Send + Sync {
    /// Whether an accepted friendship exists between the two users.
    async fn are_friends(&self, a: &str, b: &str) -> Result<bool, StoreError>;
    /// Whether either user has blocked the other.
    async fn are_blocked(&self, a: &str, b: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Member ids of a group, or `StoreError::NotFound` if the group
    /// does not exist.
    async fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Get the direct room for an unordered user pair, creating it with
    /// `new_room_id` if absent. Concurrent callers for the same pair
    /// must converge on one room; the backend's uniqueness constraint
    /// is the arbiter (insert, on conflict re-fetch the winner).
    async fn create_or_get_direct_room(
        &self,
        user_a: &str,
        user_b: &str,
        new_room_id: &str,
    ) -> Result<ChatRoom, StoreError>;

    /// Same pattern keyed by group id: at most one room per group.
    async fn create_or_get_group_room(
        &self,
        group_id: &str,
        new_room_id: &str,
    ) -> Result<ChatRoom, StoreError>;

    async fn save_message(&self, message: NewStoredMessage) -> Result<StoredMessage, StoreError>;

    /// Messages in a room, newest first, with the total count.
    async fn list_messages(
        &self,
        room_id: &str,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<StoredMessage>, i64), StoreError>;

    /// Mark unread messages in the room as read on behalf of `reader_id`.
    /// `sender_filter` limits the update to one counterpart's messages
    /// (direct rooms); `None` marks everything not sent by the reader
    /// (group rooms). Returns the number of rows updated.
    async fn mark_read(
        &self,
        room_id: &str,
        reader_id: &str,
        sender_filter: Option<&str>,
    ) -> Result<u64, StoreError>;

    /// Unread message tallies for a user, keyed by sender id for direct
    /// rooms and `group_{id}` for group rooms.
    async fn unread_counts(&self, user_id: &str) -> Result<HashMap<String, i64>, StoreError>;

    /// All rooms the user participates in, most recent first.
    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>, StoreError>;
}

/// Normalize a user pair so direct rooms are keyed order-independently.
pub(crate) fn direct_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
