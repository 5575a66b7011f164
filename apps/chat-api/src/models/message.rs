use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::messages;
use crate::store::{MessageKind, StoredMessage};

pub const MESSAGE_KIND_TEXT: i16 = 0;
pub const MESSAGE_KIND_FILE: i16 = 1;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = messages)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub kind: i16,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessageRow<'a> {
    pub id: i64,
    pub room_id: &'a str,
    pub sender_id: &'a str,
    pub kind: i16,
    pub content: Option<&'a str>,
    pub file_url: Option<&'a str>,
    pub file_name: Option<&'a str>,
    pub file_size: Option<i64>,
    pub mime_type: Option<&'a str>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

pub fn kind_to_i16(kind: MessageKind) -> i16 {
    match kind {
        MessageKind::Text => MESSAGE_KIND_TEXT,
        MessageKind::File => MESSAGE_KIND_FILE,
    }
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        let kind = if row.kind == MESSAGE_KIND_FILE {
            MessageKind::File
        } else {
            MessageKind::Text
        };
        Self {
            id: row.id,
            room_id: row.room_id,
            sender_id: row.sender_id,
            kind,
            content: row.content,
            file_url: row.file_url,
            file_name: row.file_name,
            file_size: row.file_size,
            mime_type: row.mime_type,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}
