//! Per-action gateway logic.
//!
//! Each handler validates, touches the collaborators, emits events
//! through the dispatch hub, and returns the reply payload for the
//! originating connection. Failures come back as `EventError` and are
//! never broadcast.

use serde_json::{json, Value};

use crate::call::signaling;
use crate::chat::directory::get_or_create_room;
use crate::error::EventError;
use crate::store::{MessageKind, NewStoredMessage};
use crate::AppState;

use super::events::{
    ActionReply, ClientAction, GetMessagesPayload, MarkAsReadPayload, OnlineStatusPayload,
    RoomTarget, SendMessagePayload, ServerEvent, TypingPayload,
};
use super::fanout::Recipient;
use super::session::GatewaySession;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Dispatch a single client action and produce its reply frame.
pub async fn handle_action(
    state: &AppState,
    session: &GatewaySession,
    action: ClientAction,
) -> ActionReply {
    let result = match action {
        ClientAction::JoinRoom(target) => join_room(state, session, target).await,
        ClientAction::SendMessage(payload) => send_message(state, session, payload).await,
        ClientAction::GetMessages(payload) => get_messages(state, session, payload).await,
        ClientAction::MarkAsRead(payload) => mark_as_read(state, session, payload).await,
        ClientAction::Typing(payload) => typing(state, session, payload).await,
        ClientAction::GetOnlineStatus(payload) => get_online_status(state, payload),
        ClientAction::GetUnreadCount => get_unread_count(state, session).await,
        ClientAction::GetChatRooms => get_chat_rooms(state, session).await,
        ClientAction::StartCall(payload) => signaling::start_call(state, session, payload).await,
        ClientAction::AcceptCall(target) => signaling::accept_call(state, session, target).await,
        ClientAction::RejectCall(payload) => signaling::reject_call(state, session, payload).await,
        ClientAction::EndCall(target) => signaling::end_call(state, session, target).await,
    };

    match result {
        Ok(data) => ActionReply::success(data),
        Err(error) => {
            tracing::debug!(user_id = %session.user_id, %error, "action failed");
            ActionReply::failure(error)
        }
    }
}

/// Resolve a target and return its room, creating it on first use.
async fn room_for_target(
    state: &AppState,
    session: &GatewaySession,
    target_id: &str,
    is_group: bool,
) -> Result<crate::store::ChatRoom, EventError> {
    get_or_create_room(
        state.users.as_ref(),
        state.friendships.as_ref(),
        state.groups.as_ref(),
        state.chat.as_ref(),
        &session.user_id,
        target_id,
        is_group,
    )
    .await
}

async fn join_room(
    state: &AppState,
    session: &GatewaySession,
    target: RoomTarget,
) -> Result<Value, EventError> {
    let (target_id, is_group) = target.resolve()?;
    let room = room_for_target(state, session, target_id, is_group).await?;

    session.join_room(&room.room_id);

    // Joining a conversation implies having seen its backlog.
    let sender_filter = (!is_group).then_some(target_id);
    state
        .chat
        .mark_read(&room.room_id, &session.user_id, sender_filter)
        .await?;

    state.dispatch.dispatch_except(
        Recipient::Room(room.room_id.clone()),
        Some(session.connection_id.clone()),
        ServerEvent::UserJoinedRoom {
            user_id: session.user_id.clone(),
            room_id: room.room_id.clone(),
        },
    );

    tracing::debug!(user_id = %session.user_id, room_id = %room.room_id, "joined room");
    Ok(json!({ "roomId": room.room_id }))
}

async fn send_message(
    state: &AppState,
    session: &GatewaySession,
    payload: SendMessagePayload,
) -> Result<Value, EventError> {
    let (target_id, is_group) = payload.target.resolve()?;

    let kind = if payload.file_url.is_some() {
        MessageKind::File
    } else {
        MessageKind::Text
    };
    if kind == MessageKind::Text
        && payload
            .content
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
    {
        return Err(EventError::invalid_payload("Message content is required"));
    }

    // Includes the friendship/block/membership checks.
    let room = room_for_target(state, session, target_id, is_group).await?;

    let message = state
        .chat
        .save_message(NewStoredMessage {
            id: state.snowflake.generate(),
            room_id: room.room_id.clone(),
            sender_id: session.user_id.clone(),
            kind,
            content: payload.content,
            file_url: payload.file_url,
            file_name: payload.file_name,
            file_size: payload.file_size,
            mime_type: payload.mime_type,
        })
        .await?;

    let new_message = ServerEvent::NewMessage {
        message: message.clone(),
        room_id: room.room_id.clone(),
    };
    if is_group {
        // Room members minus the originating connection; the sender's
        // other devices still see it.
        state.dispatch.dispatch_except(
            Recipient::Room(room.room_id.clone()),
            Some(session.connection_id.clone()),
            new_message,
        );
    } else {
        // Direct recipients need no join; address the user directly.
        state
            .dispatch
            .dispatch(Recipient::User(target_id.to_string()), new_message);
    }

    state.dispatch.dispatch(
        Recipient::Connection(session.connection_id.clone()),
        ServerEvent::MessageSent {
            message: message.clone(),
            room_id: room.room_id.clone(),
        },
    );

    Ok(json!({ "message": message, "roomId": room.room_id }))
}

async fn get_messages(
    state: &AppState,
    session: &GatewaySession,
    payload: GetMessagesPayload,
) -> Result<Value, EventError> {
    let (target_id, is_group) = payload.target.resolve()?;
    let room = room_for_target(state, session, target_id, is_group).await?;

    let page = payload.page.unwrap_or(1).max(1);
    let limit = payload
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let (messages, total) = state.chat.list_messages(&room.room_id, page, limit).await?;

    Ok(json!({
        "messages": messages,
        "total": total,
        "page": page,
        "limit": limit,
    }))
}

async fn mark_as_read(
    state: &AppState,
    session: &GatewaySession,
    payload: MarkAsReadPayload,
) -> Result<Value, EventError> {
    let (target_id, is_group) = payload.resolve()?;
    let room = room_for_target(state, session, target_id, is_group).await?;

    if is_group {
        let updated = state
            .chat
            .mark_read(&room.room_id, &session.user_id, None)
            .await?;
        state.dispatch.dispatch_except(
            Recipient::Room(room.room_id.clone()),
            Some(session.connection_id.clone()),
            ServerEvent::MessagesRead {
                reader_id: session.user_id.clone(),
                room_id: Some(room.room_id.clone()),
            },
        );
        Ok(json!({ "updated": updated, "roomId": room.room_id }))
    } else {
        let updated = state
            .chat
            .mark_read(&room.room_id, &session.user_id, Some(target_id))
            .await?;
        // The counterpart gets a lightweight receipt on all devices.
        state.dispatch.emit_to_user(
            target_id,
            ServerEvent::MessagesRead {
                reader_id: session.user_id.clone(),
                room_id: None,
            },
        );
        Ok(json!({ "updated": updated, "roomId": room.room_id }))
    }
}

async fn typing(
    state: &AppState,
    session: &GatewaySession,
    payload: TypingPayload,
) -> Result<Value, EventError> {
    let (target_id, is_group) = payload.target.resolve()?;
    let room = room_for_target(state, session, target_id, is_group).await?;

    let event = ServerEvent::UserTyping {
        user_id: session.user_id.clone(),
        is_typing: payload.is_typing,
        room_id: room.room_id.clone(),
    };
    if is_group {
        state.dispatch.dispatch_except(
            Recipient::Room(room.room_id.clone()),
            Some(session.connection_id.clone()),
            event,
        );
    } else {
        // Direct counterparts have not necessarily joined the room.
        state.dispatch.emit_to_user(target_id, event);
    }

    Ok(json!({ "roomId": room.room_id }))
}

fn get_online_status(state: &AppState, payload: OnlineStatusPayload) -> Result<Value, EventError> {
    let status = state.presence.online_status(&payload.user_ids);
    Ok(json!({ "onlineStatus": status }))
}

async fn get_unread_count(
    state: &AppState,
    session: &GatewaySession,
) -> Result<Value, EventError> {
    let counts = state.chat.unread_counts(&session.user_id).await?;
    Ok(json!({ "unread": counts }))
}

async fn get_chat_rooms(state: &AppState, session: &GatewaySession) -> Result<Value, EventError> {
    let rooms = state.chat.rooms_for_user(&session.user_id).await?;
    Ok(json!({ "rooms": rooms }))
}
