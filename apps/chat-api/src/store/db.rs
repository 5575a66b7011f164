//! Postgres-backed store implementations.
//!
//! One `DbStore` implements every collaborator trait; `main` hands out
//! `Arc` clones per concern. Room uniqueness relies on the database's
//! unique indexes over `(user_low, user_high)` and `(group_id)`: insert
//! with `ON CONFLICT DO NOTHING`, then re-fetch whichever row won.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;

use crate::db::pool::DbPool;
use crate::db::schema::{blocks, chat_rooms, friendships, group_members, groups, messages, users};
use crate::models::chat_room::{ChatRoomRow, NewChatRoomRow, ROOM_KIND_DIRECT, ROOM_KIND_GROUP};
use crate::models::message::{kind_to_i16, MessageRow, NewMessageRow};
use crate::models::user::User;

use super::{
    direct_pair, ChatRoom, ChatStore, FriendshipStore, GroupStore, NewStoredMessage, StoreError,
    StoredMessage, UserRecord, UserStore,
};

const FRIENDSHIP_ACCEPTED: &str = "accepted";

#[derive(Clone)]
pub struct DbStore {
    pool: DbPool,
}

impl DbStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for StoreError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
impl UserStore for DbStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let mut conn = self.pool.get().await?;
        let user: Option<User> = diesel_async::RunQueryDsl::get_result(
            users::table.find(user_id).select(User::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(user.map(UserRecord::from))
    }
}

#[async_trait]
impl FriendshipStore for DbStore {
    async fn are_friends(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = diesel_async::RunQueryDsl::get_result(
            friendships::table
                .filter(
                    friendships::requester_id
                        .eq(a)
                        .and(friendships::addressee_id.eq(b))
                        .or(friendships::requester_id
                            .eq(b)
                            .and(friendships::addressee_id.eq(a))),
                )
                .filter(friendships::status.eq(FRIENDSHIP_ACCEPTED))
                .count(),
            &mut conn,
        )
        .await?;
        Ok(count > 0)
    }

    async fn are_blocked(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = diesel_async::RunQueryDsl::get_result(
            blocks::table
                .filter(
                    blocks::blocker_id
                        .eq(a)
                        .and(blocks::blocked_id.eq(b))
                        .or(blocks::blocker_id.eq(b).and(blocks::blocked_id.eq(a))),
                )
                .count(),
            &mut conn,
        )
        .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl GroupStore for DbStore {
    async fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get().await?;

        let exists: Option<String> = diesel_async::RunQueryDsl::get_result(
            groups::table.find(group_id).select(groups::id),
            &mut conn,
        )
        .await
        .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound("Group"));
        }

        let member_ids: Vec<String> = diesel_async::RunQueryDsl::load(
            group_members::table
                .filter(group_members::group_id.eq(group_id))
                .select(group_members::user_id),
            &mut conn,
        )
        .await?;
        Ok(member_ids)
    }
}

#[async_trait]
impl ChatStore for DbStore {
    async fn create_or_get_direct_room(
        &self,
        user_a: &str,
        user_b: &str,
        new_room_id: &str,
    ) -> Result<ChatRoom, StoreError> {
        let (low, high) = direct_pair(user_a, user_b);
        let mut conn = self.pool.get().await?;

        let existing: Option<ChatRoomRow> = diesel_async::RunQueryDsl::get_result(
            chat_rooms::table
                .filter(chat_rooms::user_low.eq(&low))
                .filter(chat_rooms::user_high.eq(&high))
                .select(ChatRoomRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        if let Some(row) = existing {
            return Ok(row.into());
        }

        // Insert-then-refetch: the unique index on (user_low, user_high)
        // arbitrates concurrent creation for the same pair.
        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(chat_rooms::table)
                .values(NewChatRoomRow {
                    room_id: new_room_id,
                    kind: ROOM_KIND_DIRECT,
                    user_low: Some(&low),
                    user_high: Some(&high),
                    group_id: None,
                    created_at: Utc::now(),
                })
                .on_conflict_do_nothing(),
            &mut conn,
        )
        .await?;

        let row: ChatRoomRow = diesel_async::RunQueryDsl::get_result(
            chat_rooms::table
                .filter(chat_rooms::user_low.eq(&low))
                .filter(chat_rooms::user_high.eq(&high))
                .select(ChatRoomRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(row.into())
    }

    async fn create_or_get_group_room(
        &self,
        group_id: &str,
        new_room_id: &str,
    ) -> Result<ChatRoom, StoreError> {
        let mut conn = self.pool.get().await?;

        let existing: Option<ChatRoomRow> = diesel_async::RunQueryDsl::get_result(
            chat_rooms::table
                .filter(chat_rooms::group_id.eq(group_id))
                .select(ChatRoomRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        if let Some(row) = existing {
            return Ok(row.into());
        }

        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(chat_rooms::table)
                .values(NewChatRoomRow {
                    room_id: new_room_id,
                    kind: ROOM_KIND_GROUP,
                    user_low: None,
                    user_high: None,
                    group_id: Some(group_id),
                    created_at: Utc::now(),
                })
                .on_conflict_do_nothing(),
            &mut conn,
        )
        .await?;

        let row: ChatRoomRow = diesel_async::RunQueryDsl::get_result(
            chat_rooms::table
                .filter(chat_rooms::group_id.eq(group_id))
                .select(ChatRoomRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(row.into())
    }

    async fn save_message(&self, message: NewStoredMessage) -> Result<StoredMessage, StoreError> {
        let mut conn = self.pool.get().await?;
        let row: MessageRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(messages::table)
                .values(NewMessageRow {
                    id: message.id,
                    room_id: &message.room_id,
                    sender_id: &message.sender_id,
                    kind: kind_to_i16(message.kind),
                    content: message.content.as_deref(),
                    file_url: message.file_url.as_deref(),
                    file_name: message.file_name.as_deref(),
                    file_size: message.file_size,
                    mime_type: message.mime_type.as_deref(),
                    is_read: false,
                    created_at: Utc::now(),
                })
                .returning(MessageRow::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(row.into())
    }

    async fn list_messages(
        &self,
        room_id: &str,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<StoredMessage>, i64), StoreError> {
        let mut conn = self.pool.get().await?;

        let total: i64 = diesel_async::RunQueryDsl::get_result(
            messages::table.filter(messages::room_id.eq(room_id)).count(),
            &mut conn,
        )
        .await?;

        let rows: Vec<MessageRow> = diesel_async::RunQueryDsl::load(
            messages::table
                .filter(messages::room_id.eq(room_id))
                .order(messages::created_at.desc())
                .then_order_by(messages::id.desc())
                .offset((page - 1).max(0) * limit)
                .limit(limit.max(0))
                .select(MessageRow::as_select()),
            &mut conn,
        )
        .await?;

        Ok((rows.into_iter().map(StoredMessage::from).collect(), total))
    }

    async fn mark_read(
        &self,
        room_id: &str,
        reader_id: &str,
        sender_filter: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.get().await?;
        let updated = match sender_filter {
            Some(sender) => {
                diesel_async::RunQueryDsl::execute(
                    diesel::update(
                        messages::table
                            .filter(messages::room_id.eq(room_id))
                            .filter(messages::is_read.eq(false))
                            .filter(messages::sender_id.eq(sender)),
                    )
                    .set(messages::is_read.eq(true)),
                    &mut conn,
                )
                .await?
            }
            None => {
                diesel_async::RunQueryDsl::execute(
                    diesel::update(
                        messages::table
                            .filter(messages::room_id.eq(room_id))
                            .filter(messages::is_read.eq(false))
                            .filter(messages::sender_id.ne(reader_id)),
                    )
                    .set(messages::is_read.eq(true)),
                    &mut conn,
                )
                .await?
            }
        };
        Ok(updated as u64)
    }

    async fn unread_counts(&self, user_id: &str) -> Result<HashMap<String, i64>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rooms = load_rooms_for_user(&mut conn, user_id).await?;
        if rooms.is_empty() {
            return Ok(HashMap::new());
        }

        let room_ids: Vec<&str> = rooms.iter().map(|r| r.room_id.as_str()).collect();
        let unread: Vec<(String, String)> = diesel_async::RunQueryDsl::load(
            messages::table
                .filter(messages::room_id.eq_any(room_ids))
                .filter(messages::is_read.eq(false))
                .filter(messages::sender_id.ne(user_id))
                .select((messages::sender_id, messages::room_id)),
            &mut conn,
        )
        .await?;

        let by_room: HashMap<&str, &ChatRoomRow> =
            rooms.iter().map(|r| (r.room_id.as_str(), r)).collect();
        let mut counts = HashMap::new();
        for (sender_id, room_id) in &unread {
            let Some(room) = by_room.get(room_id.as_str()) else {
                continue;
            };
            let key = match (room.kind, &room.group_id) {
                (ROOM_KIND_GROUP, Some(group_id)) => format!("group_{group_id}"),
                _ => sender_id.clone(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>, StoreError> {
        let mut conn = self.pool.get().await?;
        let mut rows = load_rooms_for_user(&mut conn, user_id).await?;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows.into_iter().map(ChatRoom::from).collect())
    }
}

async fn load_rooms_for_user(
    conn: &mut diesel_async::AsyncPgConnection,
    user_id: &str,
) -> Result<Vec<ChatRoomRow>, StoreError> {
    let mut rows: Vec<ChatRoomRow> = diesel_async::RunQueryDsl::load(
        chat_rooms::table
            .filter(
                chat_rooms::user_low
                    .eq(user_id)
                    .or(chat_rooms::user_high.eq(user_id)),
            )
            .select(ChatRoomRow::as_select()),
        conn,
    )
    .await?;

    let group_ids: Vec<String> = diesel_async::RunQueryDsl::load(
        group_members::table
            .filter(group_members::user_id.eq(user_id))
            .select(group_members::group_id),
        conn,
    )
    .await?;

    if !group_ids.is_empty() {
        let group_rows: Vec<ChatRoomRow> = diesel_async::RunQueryDsl::load(
            chat_rooms::table
                .filter(chat_rooms::group_id.eq_any(&group_ids))
                .select(ChatRoomRow::as_select()),
            conn,
        )
        .await?;
        rows.extend(group_rows);
    }

    Ok(rows)
}
