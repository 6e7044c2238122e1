//! REST API endpoints — activity intake plus read-only views of the tracker.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::error;

use promptbot_core::activity::Activity;
use promptbot_core::handler::{ActivityHandler, TurnHandler};
use promptbot_core::turn::{BufferedSender, TurnContext};

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/messages", post(post_default_message))
        .route("/api/bots", get(list_bots))
        .route("/api/bots/{bot}/messages", post(post_bot_message))
        .route("/api/conversations", get(list_conversations))
        .route("/api/health", get(health))
}

// --- Turn intake ---

async fn post_default_message(
    State(state): State<Arc<AppState>>,
    Json(activity): Json<Activity>,
) -> (StatusCode, Json<Value>) {
    match state.bots.get(&state.default_bot) {
        Some(handler) => process_activity(&state, handler, activity).await,
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no default bot configured"})),
        ),
    }
}

async fn post_bot_message(
    State(state): State<Arc<AppState>>,
    Path(bot): Path<String>,
    Json(activity): Json<Activity>,
) -> (StatusCode, Json<Value>) {
    match state.bots.get(&bot) {
        Some(handler) => process_activity(&state, handler, activity).await,
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("bot '{}' not found", bot)})),
        ),
    }
}

/// Run one turn and answer with every activity the bot sent during it.
///
/// Turn failures are logged and surfaced as 500; nothing sent before the
/// failure is returned.
async fn process_activity(
    state: &AppState,
    handler: &TurnHandler,
    activity: Activity,
) -> (StatusCode, Json<Value>) {
    if activity.conversation.id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "conversation.id is required"})),
        );
    }

    let sender = Arc::new(BufferedSender::new());
    let mut ctx = TurnContext::new(activity, sender.clone());
    let cancel = state.shutdown.child_token();

    match handler.on_turn(&mut ctx, &cancel).await {
        Ok(()) => {
            let activities = sender.drain().await;
            (StatusCode::OK, Json(json!({ "activities": activities })))
        }
        Err(e) => {
            error!(conversation = %ctx.conversation_id(), "Turn failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        }
    }
}

// --- Views ---

async fn list_bots(State(state): State<Arc<AppState>>) -> Json<Value> {
    let bots: Vec<Value> = state
        .bots
        .iter()
        .map(|(name, handler)| {
            json!({
                "name": name,
                "dialog": handler.dialog_id(),
                "default": *name == state.default_bot,
            })
        })
        .collect();
    Json(json!(bots))
}

async fn list_conversations(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "timeout_seconds": state.tracker.timeout_seconds(),
        "conversations": state.tracker.snapshot(),
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "conversations": state.tracker.len(),
    }))
}
