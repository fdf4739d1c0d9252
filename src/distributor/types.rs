use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// Task metadata that lives in the queue. The log payload is stored
/// separately and looked up by id, keeping the backlog light.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub assignee: Option<String>,
    pub assigned_at: Option<u64>,
    pub last_heartbeat: Option<u64>,
    pub retries: u32,
    pub created_at: u64,
}

impl Task {
    pub fn new() -> Self {
        Self {
            id: TaskId::new(),
            state: TaskState::Queued,
            assignee: None,
            assigned_at: None,
            last_heartbeat: None,
            retries: 0,
            created_at: now_ms(),
        }
    }

    pub fn assign(&mut self, consumer_id: &str, now: u64) {
        self.state = TaskState::InProgress;
        self.assignee = Some(consumer_id.to_string());
        self.assigned_at = Some(now);
        self.last_heartbeat = Some(now);
    }

    /// Reset for requeuing after a heartbeat timeout.
    pub fn reset_for_requeue(&mut self) {
        self.state = TaskState::Queued;
        self.assignee = None;
        self.assigned_at = None;
        self.last_heartbeat = None;
        self.retries += 1;
    }

    pub fn heartbeat_expired(&self, timeout_ms: u64, now: u64) -> bool {
        match self.last_heartbeat {
            Some(beat) => now.saturating_sub(beat) > timeout_ms,
            None => false,
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

/// The payload a producer submits. Opaque to the queue core; only logged
/// for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default = "now_ms")]
    pub timestamp: u64,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
