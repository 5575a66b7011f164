//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;

use confab_common::id::{prefix, prefixed_ulid};

use crate::error::EventError;
use crate::store::UserRecord;
use crate::AppState;

use super::events::{ActionReply, ClientAction, ServerEvent};
use super::fanout::{OutboundEvent, Recipient};
use super::handler::handle_action;
use super::session::GatewaySession;

/// Close code for failed connect-time authentication (4000-range for
/// application-level).
const CLOSE_AUTH_FAILED: u16 = 4004;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = query.token.or_else(|| bearer_token(&headers));
    ws.on_upgrade(move |socket| handle_connection(socket, state, token))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn handle_connection(socket: WebSocket, state: AppState, token: Option<String>) {
    let (mut ws_tx, ws_rx) = socket.split();

    // Connect-time auth is the only terminal failure path; everything
    // after this point answers on the reply channel instead of closing.
    let user = match authenticate(&state, token.as_deref()).await {
        Ok(user) => user,
        Err(err) => {
            tracing::debug!(%err, "gateway auth failed");
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, &err.message).await;
            return;
        }
    };

    let session = Arc::new(GatewaySession::new(
        prefixed_ulid(prefix::CONNECTION),
        user.id,
        user.username,
    ));

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        "gateway session established"
    );

    // Subscribe before registering so this session sees every event from
    // its own online transition onward.
    let broadcast_rx = state.dispatch.subscribe();
    if state.presence.register(&session.user_id, &session.connection_id) {
        state.dispatch.dispatch(
            Recipient::All,
            ServerEvent::UserOnline {
                user_id: session.user_id.clone(),
            },
        );
    }

    run_session(&state, session.clone(), ws_tx, ws_rx, broadcast_rx).await;

    if state
        .presence
        .unregister(&session.user_id, &session.connection_id)
    {
        state.dispatch.dispatch(
            Recipient::All,
            ServerEvent::UserOffline {
                user_id: session.user_id.clone(),
            },
        );
    }

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        "gateway session ended"
    );
}

async fn authenticate(state: &AppState, token: Option<&str>) -> Result<UserRecord, EventError> {
    let token = token.ok_or_else(|| EventError::unauthorized("Missing access token"))?;
    let user_id = state.verifier.verify(token)?;
    state
        .users
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| EventError::unauthorized("Invalid or expired token"))
}

/// Main session event loop: handle client actions in order, forward
/// addressed broadcasts.
async fn run_session(
    state: &AppState,
    session: Arc<GatewaySession>,
    mut ws_tx: futures_util::stream::SplitSink<WebSocket, Message>,
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
    mut broadcast_rx: broadcast::Receiver<Arc<OutboundEvent>>,
) {
    loop {
        tokio::select! {
            // Client sends us an action frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientAction>(&text) {
                            Ok(action) => handle_action(state, &session, action).await,
                            Err(e) => {
                                tracing::debug!(?e, connection_id = %session.connection_id, "unparsable action frame");
                                ActionReply::failure(EventError::invalid_payload(
                                    "Unrecognized action frame",
                                ))
                            }
                        };
                        let json = serde_json::to_string(&reply).unwrap();
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Event from the dispatch hub.
            result = broadcast_rx.recv() => {
                match result {
                    Ok(outbound) => {
                        if !session.should_receive(&outbound) {
                            continue;
                        }
                        let json = serde_json::to_string(&outbound.event).unwrap();
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            connection_id = %session.connection_id,
                            skipped = n,
                            "gateway session lagged behind broadcast"
                        );
                        // Continue — we just drop the missed events.
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
