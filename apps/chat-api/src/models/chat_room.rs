use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::chat_rooms;
use crate::store::{ChatRoom, RoomKind};

pub const ROOM_KIND_DIRECT: i16 = 0;
pub const ROOM_KIND_GROUP: i16 = 1;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = chat_rooms)]
pub struct ChatRoomRow {
    pub room_id: String,
    pub kind: i16,
    pub user_low: Option<String>,
    pub user_high: Option<String>,
    pub group_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_rooms)]
pub struct NewChatRoomRow<'a> {
    pub room_id: &'a str,
    pub kind: i16,
    pub user_low: Option<&'a str>,
    pub user_high: Option<&'a str>,
    pub group_id: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

impl From<ChatRoomRow> for ChatRoom {
    fn from(row: ChatRoomRow) -> Self {
        let kind = if row.kind == ROOM_KIND_GROUP {
            RoomKind::Group
        } else {
            RoomKind::Direct
        };
        let user_ids = match (&row.user_low, &row.user_high) {
            (Some(low), Some(high)) => vec![low.clone(), high.clone()],
            _ => Vec::new(),
        };
        Self {
            room_id: row.room_id,
            kind,
            user_ids,
            group_id: row.group_id,
            created_at: row.created_at,
        }
    }
}
