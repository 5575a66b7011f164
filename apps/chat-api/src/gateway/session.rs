//! Per-connection gateway session state.

use std::collections::HashSet;

use parking_lot::RwLock;

use super::fanout::{OutboundEvent, Recipient};

/// State for a single WebSocket connection.
pub struct GatewaySession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub connection_id: String,
    /// Authenticated user ID.
    pub user_id: String,
    /// Authenticated username (cached at connect time).
    pub username: String,
    /// Room keys this connection has joined.
    joined_rooms: RwLock<HashSet<String>>,
}

impl GatewaySession {
    pub fn new(connection_id: String, user_id: String, username: String) -> Self {
        Self {
            connection_id,
            user_id,
            username,
            joined_rooms: RwLock::new(HashSet::new()),
        }
    }

    /// Subscribe this connection to a room key.
    pub fn join_room(&self, room_id: &str) {
        self.joined_rooms.write().insert(room_id.to_string());
    }

    pub fn is_joined(&self, room_id: &str) -> bool {
        self.joined_rooms.read().contains(room_id)
    }

    /// Whether an outbound event addresses this connection.
    pub fn should_receive(&self, outbound: &OutboundEvent) -> bool {
        if outbound.except.as_deref() == Some(self.connection_id.as_str()) {
            return false;
        }
        match &outbound.recipient {
            Recipient::All => true,
            Recipient::User(user_id) => *user_id == self.user_id,
            Recipient::Users(user_ids) => user_ids.iter().any(|id| *id == self.user_id),
            Recipient::Room(room_id) => self.is_joined(room_id),
            Recipient::Connection(connection_id) => *connection_id == self.connection_id,
        }
    }
}
