//! In-memory store implementations.
//!
//! Used by the test harness and as the default wiring when no
//! `DATABASE_URL` is configured.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    direct_pair, ChatRoom, ChatStore, FriendshipStore, GroupStore, MessageKind, NewStoredMessage,
    RoomKind, StoreError, StoredMessage, UserRecord, UserStore,
};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserRecord) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.lock().unwrap().get(user_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Friendships and blocks
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryFriendshipStore {
    /// Accepted friendships, stored as normalized pairs.
    friends: Mutex<HashSet<(String, String)>>,
    /// Directional blocks: (blocker, blocked).
    blocks: Mutex<HashSet<(String, String)>>,
}

impl MemoryFriendshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_friends(&self, a: &str, b: &str) {
        self.friends.lock().unwrap().insert(direct_pair(a, b));
    }

    pub fn block(&self, blocker: &str, blocked: &str) {
        self.blocks
            .lock()
            .unwrap()
            .insert((blocker.to_string(), blocked.to_string()));
    }
}

#[async_trait]
impl FriendshipStore for MemoryFriendshipStore {
    async fn are_friends(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        Ok(self.friends.lock().unwrap().contains(&direct_pair(a, b)))
    }

    async fn are_blocked(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        let blocks = self.blocks.lock().unwrap();
        Ok(blocks.contains(&(a.to_string(), b.to_string()))
            || blocks.contains(&(b.to_string(), a.to_string())))
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryGroupStore {
    groups: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_group(&self, group_id: &str, member_ids: &[&str]) {
        self.groups.lock().unwrap().insert(
            group_id.to_string(),
            member_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    fn members(&self, group_id: &str) -> Option<Vec<String>> {
        self.groups.lock().unwrap().get(group_id).cloned()
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        self.members(group_id).ok_or(StoreError::NotFound("Group"))
    }
}

// ---------------------------------------------------------------------------
// Chat rooms and messages
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChatInner {
    /// Direct rooms keyed by normalized user pair.
    direct: HashMap<(String, String), String>,
    /// Group rooms keyed by group id.
    group: HashMap<String, String>,
    rooms: HashMap<String, ChatRoom>,
    messages: Vec<StoredMessage>,
}

/// Group membership lives in the group store; room queries consult it
/// the same way the Postgres backend consults `group_members`.
pub struct MemoryChatStore {
    inner: Mutex<ChatInner>,
    groups: Arc<MemoryGroupStore>,
}

impl MemoryChatStore {
    pub fn new(groups: Arc<MemoryGroupStore>) -> Self {
        Self {
            inner: Mutex::default(),
            groups,
        }
    }

    fn is_group_member(&self, group_id: &str, user_id: &str) -> bool {
        self.groups
            .members(group_id)
            .is_some_and(|members| members.iter().any(|id| id == user_id))
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_or_get_direct_room(
        &self,
        user_a: &str,
        user_b: &str,
        new_room_id: &str,
    ) -> Result<ChatRoom, StoreError> {
        let pair = direct_pair(user_a, user_b);
        let mut inner = self.inner.lock().unwrap();
        if let Some(room_id) = inner.direct.get(&pair) {
            return Ok(inner.rooms[room_id].clone());
        }
        let room = ChatRoom {
            room_id: new_room_id.to_string(),
            kind: RoomKind::Direct,
            user_ids: vec![pair.0.clone(), pair.1.clone()],
            group_id: None,
            created_at: Utc::now(),
        };
        inner.direct.insert(pair, new_room_id.to_string());
        inner.rooms.insert(new_room_id.to_string(), room.clone());
        Ok(room)
    }

    async fn create_or_get_group_room(
        &self,
        group_id: &str,
        new_room_id: &str,
    ) -> Result<ChatRoom, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(room_id) = inner.group.get(group_id) {
            return Ok(inner.rooms[room_id].clone());
        }
        let room = ChatRoom {
            room_id: new_room_id.to_string(),
            kind: RoomKind::Group,
            user_ids: Vec::new(),
            group_id: Some(group_id.to_string()),
            created_at: Utc::now(),
        };
        inner.group.insert(group_id.to_string(), new_room_id.to_string());
        inner.rooms.insert(new_room_id.to_string(), room.clone());
        Ok(room)
    }

    async fn save_message(&self, message: NewStoredMessage) -> Result<StoredMessage, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.rooms.contains_key(&message.room_id) {
            return Err(StoreError::NotFound("Chat room"));
        }
        let stored = StoredMessage {
            id: message.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            kind: message.kind,
            content: message.content,
            file_url: message.file_url,
            file_name: message.file_name,
            file_size: message.file_size,
            mime_type: message.mime_type,
            is_read: false,
            created_at: Utc::now(),
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        room_id: &str,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<StoredMessage>, i64), StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut messages: Vec<StoredMessage> = inner
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        let total = messages.len() as i64;
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let skip = ((page - 1).max(0) * limit) as usize;
        let page_items = messages
            .into_iter()
            .skip(skip)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page_items, total))
    }

    async fn mark_read(
        &self,
        room_id: &str,
        reader_id: &str,
        sender_filter: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0u64;
        for message in inner.messages.iter_mut() {
            if message.room_id != room_id || message.is_read || message.sender_id == reader_id {
                continue;
            }
            if let Some(sender) = sender_filter {
                if message.sender_id != sender {
                    continue;
                }
            }
            message.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_counts(&self, user_id: &str) -> Result<HashMap<String, i64>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut counts = HashMap::new();
        for message in &inner.messages {
            if message.is_read || message.sender_id == user_id {
                continue;
            }
            let Some(room) = inner.rooms.get(&message.room_id) else {
                continue;
            };
            let key = match room.kind {
                RoomKind::Direct => {
                    if !room.user_ids.iter().any(|id| id == user_id) {
                        continue;
                    }
                    message.sender_id.clone()
                }
                RoomKind::Group => match &room.group_id {
                    Some(group_id) if self.is_group_member(group_id, user_id) => {
                        format!("group_{group_id}")
                    }
                    _ => continue,
                },
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rooms: Vec<ChatRoom> = inner
            .rooms
            .values()
            .filter(|room| match room.kind {
                RoomKind::Direct => room.user_ids.iter().any(|id| id == user_id),
                RoomKind::Group => room
                    .group_id
                    .as_deref()
                    .is_some_and(|group_id| self.is_group_member(group_id, user_id)),
            })
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }
}
