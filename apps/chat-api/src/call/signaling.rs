//! Call signaling: a stateless relay over the gateway fan-out.
//!
//! No call session state is kept server-side. Each control action
//! re-resolves the participant set, emits to everyone except the acting
//! user, and answers the acting connection with whatever it needs to
//! join the media channel. Token issuance failures surface to the caller
//! only; nothing is broadcast.

use serde_json::{json, Value};

use crate::chat::directory::get_or_create_room;
use crate::chat::participants::resolve_participants;
use crate::error::EventError;
use crate::gateway::events::{RejectCallPayload, RoomTarget, ServerEvent, StartCallPayload};
use crate::gateway::session::GatewaySession;
use crate::store::ChatRoom;
use crate::AppState;

use super::token::RtcRole;

/// Participants and room for a call target, acting user excluded from
/// the recipient list.
async fn resolve_call(
    state: &AppState,
    session: &GatewaySession,
    target: &RoomTarget,
) -> Result<(ChatRoom, Vec<String>), EventError> {
    let (target_id, is_group) = target.resolve()?;
    let participants = resolve_participants(
        state.friendships.as_ref(),
        state.groups.as_ref(),
        &session.user_id,
        target_id,
        is_group,
    )
    .await?;
    let room = get_or_create_room(
        state.users.as_ref(),
        state.friendships.as_ref(),
        state.groups.as_ref(),
        state.chat.as_ref(),
        &session.user_id,
        target_id,
        is_group,
    )
    .await?;
    let others = participants
        .into_iter()
        .filter(|id| *id != session.user_id)
        .collect();
    Ok((room, others))
}

fn channel_for(room: &ChatRoom) -> String {
    format!("call:{}", room.room_id)
}

pub async fn start_call(
    state: &AppState,
    session: &GatewaySession,
    payload: StartCallPayload,
) -> Result<Value, EventError> {
    let (target_id, is_group) = payload.target.resolve()?;
    let target_id = target_id.to_string();
    let (room, others) = resolve_call(state, session, &payload.target).await?;
    let channel = channel_for(&room);

    let token = state
        .rtc
        .issue_token(
            &channel,
            &session.user_id,
            RtcRole::Publisher,
            state.config.rtc_token_ttl_secs,
        )
        .await?;

    let call_type = payload.call_type.unwrap_or_default();
    tracing::info!(
        user_id = %session.user_id,
        room_id = %room.room_id,
        is_group,
        "call started"
    );

    state.dispatch.emit_to_users(
        others,
        ServerEvent::IncomingCall {
            from_user_id: session.user_id.clone(),
            call_type,
            is_group,
            target_id,
            room_id: room.room_id.clone(),
            channel: channel.clone(),
            expire_at: token.expire_at,
        },
    );

    Ok(json!({
        "channel": channel,
        "roomId": room.room_id,
        "token": token.token,
        "expireAt": token.expire_at,
    }))
}

pub async fn accept_call(
    state: &AppState,
    session: &GatewaySession,
    target: RoomTarget,
) -> Result<Value, EventError> {
    let (room, others) = resolve_call(state, session, &target).await?;
    let channel = channel_for(&room);

    let token = state
        .rtc
        .issue_token(
            &channel,
            &session.user_id,
            RtcRole::Publisher,
            state.config.rtc_token_ttl_secs,
        )
        .await?;

    state.dispatch.emit_to_users(
        others,
        ServerEvent::CallAccepted {
            by_user_id: session.user_id.clone(),
            room_id: room.room_id.clone(),
            channel: channel.clone(),
        },
    );

    Ok(json!({
        "channel": channel,
        "roomId": room.room_id,
        "token": token.token,
        "expireAt": token.expire_at,
    }))
}

pub async fn reject_call(
    state: &AppState,
    session: &GatewaySession,
    payload: RejectCallPayload,
) -> Result<Value, EventError> {
    let (room, others) = resolve_call(state, session, &payload.target).await?;
    let reason = payload.reason.unwrap_or_else(|| "rejected".to_string());

    state.dispatch.emit_to_users(
        others,
        ServerEvent::CallRejected {
            by_user_id: session.user_id.clone(),
            room_id: room.room_id.clone(),
            reason,
        },
    );

    Ok(json!({ "roomId": room.room_id }))
}

pub async fn end_call(
    state: &AppState,
    session: &GatewaySession,
    target: RoomTarget,
) -> Result<Value, EventError> {
    let (room, others) = resolve_call(state, session, &target).await?;
    let channel = channel_for(&room);

    state.dispatch.emit_to_users(
        others,
        ServerEvent::CallEnded {
            by_user_id: session.user_id.clone(),
            room_id: room.room_id.clone(),
            channel,
        },
    );

    Ok(json!({ "roomId": room.room_id }))
}
