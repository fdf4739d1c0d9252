use super::types::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// A consumer counts as active while it has talked to us this recently.
/// Three default heartbeat intervals: long enough to ride out a slow
/// poll, short enough that a dead pool drops out of the backpressure
/// denominator.
pub const ACTIVE_CONSUMER_WINDOW_MS: u64 = 15_000;

const FAILURE_RING_CAP: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerConsumerStats {
    pub processed: u64,
    pub failed: u64,
    pub last_seen: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureNote {
    pub task_id: TaskId,
    pub consumer_id: Option<String>,
    pub reason: String,
    pub at: u64,
}

/// Coordinator-side accounting: which consumers we have heard from and
/// what they reported, plus a bounded ring of recent failure reasons.
/// Consumers never register; a row appears the first time an id shows up
/// in a request.
#[derive(Debug, Default)]
pub struct ConsumerLedger {
    consumers: HashMap<String, PerConsumerStats>,
    failures: VecDeque<FailureNote>,
}

impl ConsumerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&mut self, consumer_id: &str, now: u64) {
        let entry = self.consumers.entry(consumer_id.to_string()).or_default();
        entry.last_seen = now;
    }

    pub fn record_processed(&mut self, consumer_id: &str, now: u64) {
        let entry = self.consumers.entry(consumer_id.to_string()).or_default();
        entry.processed += 1;
        entry.last_seen = now;
    }

    pub fn record_failed(&mut self, consumer_id: &str, now: u64) {
        let entry = self.consumers.entry(consumer_id.to_string()).or_default();
        entry.failed += 1;
        entry.last_seen = now;
    }

    pub fn push_failure(&mut self, note: FailureNote) {
        if self.failures.len() == FAILURE_RING_CAP {
            self.failures.pop_front();
        }
        self.failures.push_back(note);
    }

    pub fn active_consumers(&self, now: u64) -> usize {
        self.consumers
            .values()
            .filter(|c| now.saturating_sub(c.last_seen) <= ACTIVE_CONSUMER_WINDOW_MS)
            .count()
    }

    pub fn snapshot(&self) -> HashMap<String, PerConsumerStats> {
        self.consumers.clone()
    }

    pub fn recent_failures(&self) -> Vec<FailureNote> {
        self.failures.iter().cloned().collect()
    }
}
