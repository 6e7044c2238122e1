//! Conversation tracker — last-access bookkeeping that drives the idle timeout.
//!
//! One record per conversation id, shared by every handler in the process.
//! Insert-or-update goes through the dashmap entry API, which holds the shard
//! lock across the read-compare-write, so two turns racing on the same id
//! never lose an update.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::activity::ConversationReference;

/// Upper bound for configured windows; keeps the chrono arithmetic in range.
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Source of "now" for the tracker.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Outcome of a touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutStatus {
    /// First turn seen for this conversation.
    Fresh,
    /// Seen before, within the timeout.
    Active,
    /// Seen before, but idle longer than the timeout.
    Stale,
}

impl std::fmt::Display for TimeoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutStatus::Fresh => write!(f, "fresh"),
            TimeoutStatus::Active => write!(f, "active"),
            TimeoutStatus::Stale => write!(f, "stale"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub last_accessed: DateTime<Utc>,
    pub conversation_reference: ConversationReference,
}

pub struct ConversationTracker {
    records: DashMap<String, ConversationRecord>,
    timeout: Duration,
    timeout_seconds: u64,
    clock: Arc<dyn Clock>,
}

impl ConversationTracker {
    pub fn new(timeout_seconds: u64) -> Self {
        Self::with_clock(timeout_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(timeout_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            timeout: window(timeout_seconds),
            timeout_seconds,
            clock,
        }
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record a turn for `conversation_id` at the clock's current time.
    ///
    /// `reference_factory` runs only when the conversation is new.
    pub fn touch<F>(&self, conversation_id: &str, reference_factory: F) -> TimeoutStatus
    where
        F: FnOnce() -> ConversationReference,
    {
        self.touch_at(conversation_id, self.clock.now(), reference_factory)
    }

    /// Same as [`touch`](Self::touch) with an explicit clock reading.
    pub fn touch_at<F>(
        &self,
        conversation_id: &str,
        now: DateTime<Utc>,
        reference_factory: F,
    ) -> TimeoutStatus
    where
        F: FnOnce() -> ConversationReference,
    {
        match self.records.entry(conversation_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                let stale = is_expired(record.last_accessed, self.timeout, now);
                // Never move backwards when turns race with skewed readings.
                record.last_accessed = record.last_accessed.max(now);
                if stale {
                    TimeoutStatus::Stale
                } else {
                    TimeoutStatus::Active
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(ConversationRecord {
                    conversation_id: conversation_id.to_string(),
                    last_accessed: now,
                    conversation_reference: reference_factory(),
                });
                TimeoutStatus::Fresh
            }
        }
    }

    pub fn get(&self, conversation_id: &str) -> Option<ConversationRecord> {
        self.records.get(conversation_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, most recently accessed first.
    pub fn snapshot(&self) -> Vec<ConversationRecord> {
        let mut records: Vec<ConversationRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        records
    }

    /// Records idle longer than `retention_seconds`. Nothing is removed.
    pub fn idle_records(&self, retention_seconds: u64) -> Vec<ConversationRecord> {
        let retention = window(retention_seconds);
        let now = self.clock.now();
        self.records
            .iter()
            .filter(|r| is_expired(r.last_accessed, retention, now))
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn is_idle(&self, conversation_id: &str, retention_seconds: u64) -> bool {
        let now = self.clock.now();
        self.records
            .get(conversation_id)
            .is_some_and(|r| is_expired(r.last_accessed, window(retention_seconds), now))
    }

    /// Remove the record only if it is still idle.
    ///
    /// The check runs under the key lock, so a turn that touched the record
    /// after it was picked as a candidate keeps it alive.
    pub fn remove_if_idle(
        &self,
        conversation_id: &str,
        retention_seconds: u64,
    ) -> Option<ConversationRecord> {
        let retention = window(retention_seconds);
        let now = self.clock.now();
        self.records
            .remove_if(conversation_id, |_, r| is_expired(r.last_accessed, retention, now))
            .map(|(_, record)| record)
    }
}

fn window(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_WINDOW_SECS) as i64)
}

/// `last + window < now`, strictly.
fn is_expired(last_accessed: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    match last_accessed.checked_add_signed(window) {
        Some(deadline) => deadline < now,
        None => false,
    }
}
