pub mod auth;
pub mod call;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod store;

use std::sync::Arc;

use auth::TokenVerifier;
use call::token::RtcTokenIssuer;
use config::Config;
use confab_common::SnowflakeGenerator;
use gateway::fanout::GatewayDispatch;
use gateway::presence::PresenceRegistry;
use store::{ChatStore, FriendshipStore, GroupStore, UserStore};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub friendships: Arc<dyn FriendshipStore>,
    pub groups: Arc<dyn GroupStore>,
    pub chat: Arc<dyn ChatStore>,
    pub rtc: Arc<dyn RtcTokenIssuer>,
    pub verifier: TokenVerifier,
    pub config: Arc<Config>,
    pub snowflake: Arc<SnowflakeGenerator>,
    pub presence: Arc<PresenceRegistry>,
    pub dispatch: Arc<GatewayDispatch>,
}
