//! Broadcast hub for dispatching events to connected sessions.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connected session
//! subscribes and filters events locally by recipient. This is efficient
//! for the single-process architecture.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::events::ServerEvent;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip events (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// Who an outbound event is addressed to.
#[derive(Debug, Clone)]
pub enum Recipient {
    /// Every connected session.
    All,
    /// Every connection of one user.
    User(String),
    /// Every connection of each listed user.
    Users(Vec<String>),
    /// Every connection subscribed to a room key.
    Room(String),
    /// One specific connection.
    Connection(String),
}

/// An event traveling through the fanout channel.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub recipient: Recipient,
    /// Connection id to skip even when the recipient matches, used to
    /// keep an acting user's own connection out of room broadcasts.
    pub except: Option<String>,
    pub event: ServerEvent,
}

/// The global dispatch hub. Cloneable — store in AppState.
#[derive(Clone)]
pub struct GatewayDispatch {
    sender: broadcast::Sender<Arc<OutboundEvent>>,
}

impl GatewayDispatch {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the dispatch channel. Each gateway session should call
    /// this once to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OutboundEvent>> {
        self.sender.subscribe()
    }

    /// Dispatch an event to the addressed sessions.
    pub fn dispatch(&self, recipient: Recipient, event: ServerEvent) {
        self.dispatch_except(recipient, None, event);
    }

    pub fn dispatch_except(
        &self,
        recipient: Recipient,
        except: Option<String>,
        event: ServerEvent,
    ) {
        // send() returns Err if there are no receivers — that's fine.
        let _ = self.sender.send(Arc::new(OutboundEvent {
            recipient,
            except,
            event,
        }));
    }

    /// Push an event to every connection of one user, independent of room
    /// subscriptions. Usable from outside the action handlers.
    pub fn emit_to_user(&self, user_id: impl Into<String>, event: ServerEvent) {
        self.dispatch(Recipient::User(user_id.into()), event);
    }

    /// Push an event to every connection of each listed user.
    pub fn emit_to_users(&self, user_ids: Vec<String>, event: ServerEvent) {
        self.dispatch(Recipient::Users(user_ids), event);
    }
}

impl Default for GatewayDispatch {
    fn default() -> Self {
        Self::new()
    }
}
