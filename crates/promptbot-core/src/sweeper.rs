//! Background sweeper for the conversation tracker.
//!
//! Periodically evicts records idle longer than the retention window and
//! deletes their conversation state, so the shared table stays bounded by the
//! number of recently active conversations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::events::{BotEvent, SweepData};
use crate::state::BotState;
use crate::tracker::ConversationTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub interval_seconds: u64,
    pub retention_seconds: u64,
}

impl From<&Config> for SweepConfig {
    fn from(config: &Config) -> Self {
        Self {
            interval_seconds: config.sweep_interval_seconds,
            retention_seconds: config.retention_seconds(),
        }
    }
}

/// Statistics from a sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepStats {
    pub removed: usize,
    pub state_cleared: usize,
    pub remaining: usize,
    pub duration_ms: u64,
}

/// Evicts idle tracker records, and optionally their conversation state.
///
/// A conversation idle longer than the retention window is forgotten. Its
/// next turn is `Fresh`, so it restarts from the beginning with no welcome-back
/// notice, even though any gap past the timeout would otherwise be `Stale`.
/// Retention is never shorter than the timeout and defaults to twice it.
///
/// State is deleted before the record is removed. A turn that arrives while
/// a candidate is being evicted still finds its record, gets `Stale`, and
/// keeps whatever it saves.
pub struct TrackerSweeper {
    tracker: Arc<ConversationTracker>,
    conversation_state: Option<Arc<BotState>>,
    config: SweepConfig,
    events: Option<broadcast::Sender<BotEvent>>,
    shutdown: CancellationToken,
}

impl TrackerSweeper {
    pub fn new(tracker: Arc<ConversationTracker>, config: SweepConfig) -> Self {
        Self {
            tracker,
            conversation_state: None,
            config,
            events: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Also delete each evicted conversation's persisted state.
    pub fn with_conversation_state(mut self, state: Arc<BotState>) -> Self {
        self.conversation_state = Some(state);
        self
    }

    pub fn with_events(mut self, tx: broadcast::Sender<BotEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Cancel this token to stop the worker.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let interval = Duration::from_secs(self.config.interval_seconds.max(1));
        info!(
            ?interval,
            retention_seconds = self.config.retention_seconds,
            "Starting tracker sweeper"
        );

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    match self.run_once().await {
                        Ok(stats) if stats.removed > 0 => {
                            info!(
                                removed = stats.removed,
                                state_cleared = stats.state_cleared,
                                remaining = stats.remaining,
                                duration_ms = stats.duration_ms,
                                "Sweep completed"
                            );
                        }
                        Ok(_) => debug!("Sweep completed with nothing to remove"),
                        Err(err) => warn!(?err, "Sweep failed"),
                    }
                }
                () = self.shutdown.cancelled() => {
                    info!("Tracker sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single sweep pass.
    ///
    /// A record whose state cannot be deleted stays in the tracker, so its
    /// next turn is still reset. The first state error is returned after the
    /// pass completes.
    pub async fn run_once(&self) -> Result<SweepStats> {
        let start = Instant::now();
        let retention = self.config.retention_seconds;
        let candidates = self.tracker.idle_records(retention);

        let mut stats = SweepStats::default();
        let mut first_error = None;

        for record in &candidates {
            let id = &record.conversation_id;
            if let Some(state) = &self.conversation_state {
                if !self.tracker.is_idle(id, retention) {
                    continue;
                }
                match state.delete_for_reference(&record.conversation_reference).await {
                    Ok(true) => stats.state_cleared += 1,
                    Ok(false) => debug!(conversation = %id, "No state to clear"),
                    Err(err) => {
                        warn!(conversation = %id, ?err, "Failed to clear state");
                        first_error.get_or_insert(err);
                        continue;
                    }
                }
            }
            if self.tracker.remove_if_idle(id, retention).is_some() {
                stats.removed += 1;
            } else {
                debug!(conversation = %id, "Conversation resumed during sweep");
            }
        }

        stats.remaining = self.tracker.len();
        stats.duration_ms = start.elapsed().as_millis() as u64;

        if stats.removed > 0 {
            if let Some(tx) = &self.events {
                let _ = tx.send(BotEvent::Sweep(SweepData {
                    removed: stats.removed,
                    remaining: stats.remaining,
                }));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ConversationReference;
    use crate::error::BotError;
    use crate::storage::{MemoryStorage, Storage};
    use crate::tracker::ManualClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    /// Holds one document and refuses to delete it.
    struct ReadOnlyStorage;

    #[async_trait]
    impl Storage for ReadOnlyStorage {
        async fn read(&self, _key: &str) -> Result<Option<Value>> {
            Ok(Some(json!({"DialogState": {}})))
        }

        async fn write(&self, _key: &str, _value: Value) -> Result<()> {
            Err(BotError::Storage("read-only".to_string()))
        }

        async fn delete_if_unchanged(&self, _key: &str, _expected: &Value) -> Result<bool> {
            Err(BotError::Storage("read-only".to_string()))
        }
    }

    fn reference(id: &str) -> ConversationReference {
        let mut r = ConversationReference::default();
        r.conversation.id = id.to_string();
        r.channel_id = "test".to_string();
        r
    }

    #[test]
    fn test_config_from_app_config() {
        let config = Config {
            conversation_timeout_seconds: 100,
            sweep_interval_seconds: 7,
            ..Config::default()
        };
        let sweep = SweepConfig::from(&config);
        assert_eq!(sweep.interval_seconds, 7);
        assert_eq!(sweep.retention_seconds, 200);
    }

    #[tokio::test]
    async fn test_run_once_evicts_and_clears_state() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let tracker = Arc::new(ConversationTracker::with_clock(60, clock.clone()));
        let storage = Arc::new(MemoryStorage::new());
        storage
            .write("test/conversations/idle", json!({"DialogState": {}}))
            .await
            .unwrap();
        storage
            .write("test/conversations/busy", json!({"DialogState": {}}))
            .await
            .unwrap();

        tracker.touch("idle", || reference("idle"));
        clock.advance(chrono::Duration::minutes(5));
        tracker.touch("busy", || reference("busy"));

        let (tx, mut rx) = broadcast::channel(4);
        let shared: Arc<dyn Storage> = storage.clone();
        let sweeper = TrackerSweeper::new(
            Arc::clone(&tracker),
            SweepConfig {
                interval_seconds: 1,
                retention_seconds: 120,
            },
        )
        .with_conversation_state(Arc::new(BotState::conversation(shared)))
        .with_events(tx);

        let stats = sweeper.run_once().await.unwrap();
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.state_cleared, 1);
        assert_eq!(stats.remaining, 1);
        assert!(tracker.get("idle").is_none());
        assert!(!storage.contains_key("test/conversations/idle"));
        assert!(storage.contains_key("test/conversations/busy"));
        assert!(matches!(rx.try_recv(), Ok(BotEvent::Sweep(_))));
    }

    #[tokio::test]
    async fn test_run_once_with_nothing_idle() {
        let tracker = Arc::new(ConversationTracker::new(60));
        tracker.touch("c1", || reference("c1"));
        let sweeper = TrackerSweeper::new(
            Arc::clone(&tracker),
            SweepConfig {
                interval_seconds: 1,
                retention_seconds: 60,
            },
        );

        let stats = sweeper.run_once().await.unwrap();
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.remaining, 1);
    }

    #[tokio::test]
    async fn test_failed_state_delete_keeps_record() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let tracker = Arc::new(ConversationTracker::with_clock(60, clock.clone()));
        tracker.touch("c1", || reference("c1"));
        clock.advance(chrono::Duration::minutes(10));

        let sweeper = TrackerSweeper::new(
            Arc::clone(&tracker),
            SweepConfig {
                interval_seconds: 1,
                retention_seconds: 120,
            },
        )
        .with_conversation_state(Arc::new(BotState::conversation(Arc::new(ReadOnlyStorage))));

        let err = sweeper.run_once().await.unwrap_err();
        assert!(matches!(err, BotError::Storage(_)));
        assert!(tracker.get("c1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_runs_and_stops() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let tracker = Arc::new(ConversationTracker::with_clock(10, clock.clone()));
        tracker.touch("c1", || reference("c1"));
        clock.advance(chrono::Duration::minutes(1));

        let sweeper = TrackerSweeper::new(
            Arc::clone(&tracker),
            SweepConfig {
                interval_seconds: 5,
                retention_seconds: 20,
            },
        );
        let shutdown = sweeper.shutdown_token();
        let handle = sweeper.spawn();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(tracker.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
