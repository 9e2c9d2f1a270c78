//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::TopicHub;
use crate::config::Config;
use market_chat_core::ports::{ChatHistoryStore, UserDirectory};
use market_chat_core::{ChatTopicRouter, TokenCodec};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// Everything here is read-only or internally synchronized; no per-user session
/// lives in it.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<TokenCodec>,
    pub store: Arc<dyn ChatHistoryStore>,
    pub users: Arc<dyn UserDirectory>,
    pub hub: Arc<TopicHub>,
    pub router: ChatTopicRouter,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ChatHistoryStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let tokens = Arc::new(TokenCodec::new(config.jwt_secret.as_bytes(), config.token_ttl));
        let hub = Arc::new(TopicHub::new());
        let router = ChatTopicRouter::new(store.clone(), hub.clone());
        Self {
            config,
            tokens,
            store,
            users,
            hub,
            router,
        }
    }
}
