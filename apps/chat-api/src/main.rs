use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use confab_common::SnowflakeGenerator;

use chat_api::auth::TokenVerifier;
use chat_api::call::token::{HmacTokenIssuer, RtcTokenIssuer};
use chat_api::config::Config;
use chat_api::gateway::fanout::GatewayDispatch;
use chat_api::gateway::presence::PresenceRegistry;
use chat_api::store::{
    ChatStore, DbStore, FriendshipStore, GroupStore, MemoryChatStore, MemoryFriendshipStore,
    MemoryGroupStore, MemoryUserStore, UserStore,
};
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let (users, friendships, groups, chat): (
        Arc<dyn UserStore>,
        Arc<dyn FriendshipStore>,
        Arc<dyn GroupStore>,
        Arc<dyn ChatStore>,
    ) = match &config.database_url {
        Some(database_url) => {
            let pool = chat_api::db::pool::connect(database_url).await;
            let store = Arc::new(DbStore::new(pool));
            (store.clone(), store.clone(), store.clone(), store)
        }
        None => {
            tracing::info!("DATABASE_URL not set; running on in-memory stores");
            let groups = Arc::new(MemoryGroupStore::new());
            (
                Arc::new(MemoryUserStore::new()),
                Arc::new(MemoryFriendshipStore::new()),
                groups.clone(),
                Arc::new(MemoryChatStore::new(groups)),
            )
        }
    };

    let rtc: Arc<dyn RtcTokenIssuer> = Arc::new(HmacTokenIssuer::new(
        config.rtc_app_id.clone(),
        config.rtc_app_certificate.clone(),
    ));
    let verifier = TokenVerifier::new(&config.jwt_secret);

    let state = AppState {
        users,
        friendships,
        groups,
        chat,
        rtc,
        verifier,
        config: Arc::new(config),
        snowflake: Arc::new(SnowflakeGenerator::new(0)),
        presence: Arc::new(PresenceRegistry::new()),
        dispatch: Arc::new(GatewayDispatch::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutdown signal received");
}
