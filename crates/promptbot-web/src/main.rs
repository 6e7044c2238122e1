//! promptbot-web — Axum host for the prompt bots.
//! Builds the shared tracker and state, one handler per dialog, starts the
//! sweeper and serves the activity endpoint.

mod dialogs;
mod server;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use promptbot_core::config::Config;
use promptbot_core::dialog::Dialog;
use promptbot_core::handler::TurnHandler;
use promptbot_core::state::BotState;
use promptbot_core::storage::{MemoryStorage, Storage};
use promptbot_core::sweeper::{SweepConfig, TrackerSweeper};
use promptbot_core::tracker::ConversationTracker;

use dialogs::PromptDialog;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load_or_default(&project_root.join("config.yaml"))?;
    info!(
        timeout_seconds = config.conversation_timeout_seconds,
        retention_seconds = config.retention_seconds(),
        "Configuration loaded"
    );

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let conversation_state = Arc::new(BotState::conversation(Arc::clone(&storage)));
    let user_state = Arc::new(BotState::user(storage));
    let tracker = Arc::new(ConversationTracker::new(config.conversation_timeout_seconds));
    let (events, _) = broadcast::channel(256);

    // One handler per endpoint; all share the tracker and state partitions.
    let dialogs: Vec<Arc<dyn Dialog>> = vec![
        Arc::new(PromptDialog::profile()),
        Arc::new(PromptDialog::feedback()),
    ];
    let mut bots = BTreeMap::new();
    for dialog in dialogs {
        let name = dialog.id().to_string();
        let handler = TurnHandler::new(
            &config,
            Arc::clone(&tracker),
            Arc::clone(&conversation_state),
            Arc::clone(&user_state),
            dialog,
        )
        .with_events(events.clone());
        bots.insert(name, Arc::new(handler));
    }
    let names: Vec<&str> = bots.keys().map(String::as_str).collect();
    eprintln!("\n  Bots: {}", names.join(", "));

    let sweeper = TrackerSweeper::new(Arc::clone(&tracker), SweepConfig::from(&config))
        .with_conversation_state(Arc::clone(&conversation_state))
        .with_events(events.clone());
    let sweeper_shutdown = sweeper.shutdown_token();
    let sweeper_handle = sweeper.spawn();

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        bots,
        default_bot: "profile".to_string(),
        tracker,
        events,
        shutdown: shutdown.clone(),
    });
    let app = server::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3978);
    let addr = format!("0.0.0.0:{}", port);

    eprintln!("  POST activities to http://localhost:{}/api/messages\n", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Graceful shutdown on Ctrl+C
    let signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Shutdown signal received");
        shutdown.cancel();
        sweeper_shutdown.cancel();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .context("Server error")?;

    sweeper_handle.await.context("Sweeper task panicked")?;
    info!("Server stopped.");
    Ok(())
}
