//! promptbot-core — turn handling for a multi-turn prompt bot, no transport.
//!
//! Inbound activities become turns. A shared [`tracker::ConversationTracker`]
//! decides whether a conversation went idle for too long; the
//! [`handler::TurnHandler`] resets the dialog when it did, runs the injected
//! dialog and saves state at turn end. Hosts (the web crate) subscribe to
//! [`events::BotEvent`] via tokio::broadcast.

pub mod activity;
pub mod config;
pub mod dialog;
pub mod error;
pub mod events;
pub mod handler;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod tracker;
pub mod turn;

pub use error::{BotError, Result};
