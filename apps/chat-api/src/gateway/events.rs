//! Gateway wire protocol.
//!
//! Inbound frames are `{"action": ..., "data": ...}`, outbound frames are
//! `{"event": ..., "data": ...}`. Each action additionally gets a reply
//! frame (`ActionReply`) on the originating connection only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EventError;
use crate::store::StoredMessage;

/// An action sent by a connected client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum ClientAction {
    JoinRoom(RoomTarget),
    SendMessage(SendMessagePayload),
    GetMessages(GetMessagesPayload),
    MarkAsRead(MarkAsReadPayload),
    Typing(TypingPayload),
    GetOnlineStatus(OnlineStatusPayload),
    GetUnreadCount,
    GetChatRooms,
    StartCall(StartCallPayload),
    AcceptCall(RoomTarget),
    RejectCall(RejectCallPayload),
    EndCall(RoomTarget),
}

/// A conversation target: exactly one of `receiverId` or `groupId`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTarget {
    pub receiver_id: Option<String>,
    pub group_id: Option<String>,
}

impl RoomTarget {
    /// Returns `(target_id, is_group)`. `groupId` wins when both are set.
    pub fn resolve(&self) -> Result<(&str, bool), EventError> {
        if let Some(group_id) = self.group_id.as_deref() {
            return Ok((group_id, true));
        }
        if let Some(receiver_id) = self.receiver_id.as_deref() {
            return Ok((receiver_id, false));
        }
        Err(EventError::invalid_payload(
            "receiverId or groupId is required",
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[serde(flatten)]
    pub target: RoomTarget,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesPayload {
    #[serde(flatten)]
    pub target: RoomTarget,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Read receipts address the counterpart by sender, not receiver.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadPayload {
    pub sender_id: Option<String>,
    pub group_id: Option<String>,
}

impl MarkAsReadPayload {
    pub fn resolve(&self) -> Result<(&str, bool), EventError> {
        if let Some(group_id) = self.group_id.as_deref() {
            return Ok((group_id, true));
        }
        if let Some(sender_id) = self.sender_id.as_deref() {
            return Ok((sender_id, false));
        }
        Err(EventError::invalid_payload("senderId or groupId is required"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    #[serde(flatten)]
    pub target: RoomTarget,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatusPayload {
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallPayload {
    #[serde(flatten)]
    pub target: RoomTarget,
    pub call_type: Option<CallType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectCallPayload {
    #[serde(flatten)]
    pub target: RoomTarget,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallType {
    Audio,
    Video,
}

impl Default for CallType {
    fn default() -> Self {
        Self::Video
    }
}

/// An event pushed to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: String },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: String },
    #[serde(rename_all = "camelCase")]
    UserJoinedRoom { user_id: String, room_id: String },
    #[serde(rename_all = "camelCase")]
    NewMessage {
        message: StoredMessage,
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageSent {
        message: StoredMessage,
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        reader_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: String,
        is_typing: bool,
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        from_user_id: String,
        call_type: CallType,
        is_group: bool,
        target_id: String,
        room_id: String,
        channel: String,
        expire_at: i64,
    },
    #[serde(rename_all = "camelCase")]
    CallAccepted {
        by_user_id: String,
        room_id: String,
        channel: String,
    },
    #[serde(rename_all = "camelCase")]
    CallRejected {
        by_user_id: String,
        room_id: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    CallEnded {
        by_user_id: String,
        room_id: String,
        channel: String,
    },
    #[serde(rename_all = "camelCase")]
    Notification { message: String },
}

/// Reply frame for a single action, sent to the originating connection.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl ActionReply {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: EventError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_deserialize_from_tagged_frames() {
        let action: ClientAction = serde_json::from_str(
            r#"{"action":"sendMessage","data":{"receiverId":"usr_b","content":"hi"}}"#,
        )
        .unwrap();
        match action {
            ClientAction::SendMessage(payload) => {
                assert_eq!(payload.target.receiver_id.as_deref(), Some("usr_b"));
                assert_eq!(payload.content.as_deref(), Some("hi"));
                assert!(payload.file_url.is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn unit_actions_need_no_data() {
        let action: ClientAction =
            serde_json::from_str(r#"{"action":"getUnreadCount"}"#).unwrap();
        assert!(matches!(action, ClientAction::GetUnreadCount));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let result: Result<ClientAction, _> =
            serde_json::from_str(r#"{"action":"selfDestruct","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn room_target_requires_one_side() {
        let target = RoomTarget::default();
        let err = target.resolve().unwrap_err();
        assert_eq!(err.message, "receiverId or groupId is required");

        let target = RoomTarget {
            receiver_id: None,
            group_id: Some("grp_1".to_string()),
        };
        assert_eq!(target.resolve().unwrap(), ("grp_1", true));
    }

    #[test]
    fn mark_as_read_addresses_sender() {
        let payload: MarkAsReadPayload = serde_json::from_str(r#"{"senderId":"usr_a"}"#).unwrap();
        assert_eq!(payload.resolve().unwrap(), ("usr_a", false));

        let payload: MarkAsReadPayload = serde_json::from_str("{}").unwrap();
        let err = payload.resolve().unwrap_err();
        assert_eq!(err.message, "senderId or groupId is required");
    }

    #[test]
    fn events_serialize_with_camel_case_tags() {
        let event = ServerEvent::UserTyping {
            user_id: "usr_a".to_string(),
            is_typing: true,
            room_id: "room_1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "userTyping");
        assert_eq!(json["data"]["userId"], "usr_a");
        assert_eq!(json["data"]["isTyping"], true);
    }

    #[test]
    fn messages_read_omits_room_for_direct() {
        let event = ServerEvent::MessagesRead {
            reader_id: "usr_a".to_string(),
            room_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "messagesRead");
        assert!(json["data"].get("roomId").is_none());
    }

    #[test]
    fn reply_frames_carry_ok_flag() {
        let reply = ActionReply::failure(EventError::forbidden(
            "You can only chat with your friends",
        ));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["kind"], "forbidden");
        assert!(json.get("data").is_none());
    }
}
