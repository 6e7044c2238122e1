//! Web server — Axum router + shared state.

pub mod api;
pub mod ws;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use promptbot_core::events::BotEvent;
use promptbot_core::handler::TurnHandler;
use promptbot_core::tracker::ConversationTracker;

/// Shared application state — one handler per bot endpoint, one tracker for all.
pub struct AppState {
    pub bots: BTreeMap<String, Arc<TurnHandler>>,
    pub default_bot: String,
    pub tracker: Arc<ConversationTracker>,
    pub events: broadcast::Sender<BotEvent>,
    /// Cancelled on shutdown; each turn gets a child token.
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::very_permissive();

    Router::new()
        .merge(api::routes())
        .merge(ws::routes())
        .layer(cors)
        .with_state(state)
}
