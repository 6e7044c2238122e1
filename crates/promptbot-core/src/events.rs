//! BotEvent enum — broadcast from handlers and the sweeper to observers via tokio::broadcast.

use serde::{Deserialize, Serialize};

use crate::tracker::TimeoutStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnData {
    pub conversation_id: String,
    pub activity_type: String,
    pub status: TimeoutStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetData {
    pub conversation_id: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetingData {
    pub conversation_id: String,
    pub member_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepData {
    pub removed: usize,
    pub remaining: usize,
}

/// Events broadcast to all subscribers (WebSocket clients, tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum BotEvent {
    /// A turn was received and the tracker consulted
    #[serde(rename = "turn")]
    Turn(TurnData),

    /// An idle conversation was reset
    #[serde(rename = "reset")]
    Reset(ResetData),

    /// A newly added member was greeted
    #[serde(rename = "greeting")]
    Greeting(GreetingData),

    /// The sweeper evicted idle records
    #[serde(rename = "sweep")]
    Sweep(SweepData),
}
