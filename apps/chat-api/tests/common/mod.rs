#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::time;
use tokio_tungstenite::tungstenite;

use confab_common::SnowflakeGenerator;

use chat_api::auth::{Claims, TokenVerifier};
use chat_api::call::token::{HmacTokenIssuer, RtcTokenIssuer};
use chat_api::config::Config;
use chat_api::gateway::fanout::GatewayDispatch;
use chat_api::gateway::presence::PresenceRegistry;
use chat_api::store::{
    ChatStore, FriendshipStore, GroupStore, MemoryChatStore, MemoryFriendshipStore,
    MemoryGroupStore, MemoryUserStore, UserRecord, UserStore,
};
use chat_api::AppState;

pub const TEST_JWT_SECRET: &str = "test-secret";

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// In-memory backend plus the state wired over it, with the concrete
/// store handles kept around for seeding.
pub struct TestBackend {
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub friendships: Arc<MemoryFriendshipStore>,
    pub groups: Arc<MemoryGroupStore>,
    pub chat: Arc<MemoryChatStore>,
}

impl TestBackend {
    pub fn new() -> Self {
        let users = Arc::new(MemoryUserStore::new());
        let friendships = Arc::new(MemoryFriendshipStore::new());
        let groups = Arc::new(MemoryGroupStore::new());
        let chat = Arc::new(MemoryChatStore::new(groups.clone()));

        let config = Config {
            port: 0,
            jwt_secret: TEST_JWT_SECRET.to_string(),
            database_url: None,
            rtc_app_id: "test-app".to_string(),
            rtc_app_certificate: "test-certificate".to_string(),
            rtc_token_ttl_secs: 600,
        };

        let state = AppState {
            users: users.clone() as Arc<dyn UserStore>,
            friendships: friendships.clone() as Arc<dyn FriendshipStore>,
            groups: groups.clone() as Arc<dyn GroupStore>,
            chat: chat.clone() as Arc<dyn ChatStore>,
            rtc: Arc::new(HmacTokenIssuer::new("test-app", "test-certificate"))
                as Arc<dyn RtcTokenIssuer>,
            verifier: TokenVerifier::new(TEST_JWT_SECRET),
            config: Arc::new(config),
            snowflake: Arc::new(SnowflakeGenerator::new(0)),
            presence: Arc::new(PresenceRegistry::new()),
            dispatch: Arc::new(GatewayDispatch::new()),
        };

        Self {
            state,
            users,
            friendships,
            groups,
            chat,
        }
    }

    pub fn add_user(&self, id: &str, username: &str) {
        self.users.insert(UserRecord {
            id: id.to_string(),
            username: username.to_string(),
            display_name: username.to_string(),
            avatar_url: None,
        });
    }
}

/// Bind a real listener on an ephemeral port and serve the app on it.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = chat_api::routes::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Mint a gateway access token for a user.
pub fn mint_token(user_id: &str) -> String {
    let claims = Claims {
        id: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 600,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Connect to the gateway with a token in the query string.
pub async fn connect(addr: SocketAddr, token: &str) -> WsStream {
    let url = format!("ws://{addr}/gateway?token={token}");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws_stream
}

pub async fn send_action(ws: &mut WsStream, frame: serde_json::Value) {
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("send action");
}

/// Read the next text frame as JSON.
pub async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse frame")
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Read frames until the next action reply (a frame carrying `ok`),
/// skipping any interleaved events.
pub async fn recv_reply(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let frame = recv_json(ws).await;
        if frame.get("ok").is_some() {
            return frame;
        }
    }
}

/// Read frames until an event with the given name arrives, skipping
/// everything else (presence broadcasts, replies).
pub async fn recv_event(ws: &mut WsStream, event: &str) -> serde_json::Value {
    loop {
        let frame = recv_json(ws).await;
        if frame["event"] == event {
            return frame;
        }
    }
}

/// Consume whatever is already queued on the socket until it goes quiet.
pub async fn drain(ws: &mut WsStream) {
    loop {
        match time::timeout(Duration::from_millis(200), ws.next()).await {
            Ok(Some(Ok(_))) => continue,
            _ => return,
        }
    }
}

/// Assert the socket receives no text frame within the window.
pub async fn assert_silent(ws: &mut WsStream) {
    if let Ok(Some(Ok(tungstenite::Message::Text(text)))) =
        time::timeout(Duration::from_millis(300), ws.next()).await
    {
        panic!("expected silence, got frame: {text}");
    }
}
