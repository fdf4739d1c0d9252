use super::stats::{FailureNote, PerConsumerStats};
use super::types::{LogRecord, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Endpoints
pub const ENDPOINT_SUBMIT: &str = "/submit";
pub const ENDPOINT_GET_WORK: &str = "/get_work";
pub const ENDPOINT_STATUS: &str = "/status";
pub const ENDPOINT_STATS: &str = "/stats";
pub const ENDPOINT_METRICS: &str = "/metrics";
pub const ENDPOINT_HEALTH: &str = "/health";

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
}

// Work request (consumer pull)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    pub consumer_id: String,
    pub weight: f64,
    pub current_tasks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkResponse {
    pub has_work: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<LogRecord>,
}

impl WorkResponse {
    pub fn empty() -> Self {
        Self {
            has_work: false,
            task_id: None,
            payload: None,
        }
    }
}

/// Terminal states and heartbeats share one update message; an
/// `in_progress` update is the heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    InProgress,
    Completed,
    Failed,
}

// Consumers written in other stacks report "COMPLETED" as readily as
// "completed"; accept either casing.
impl<'de> Deserialize<'de> for ReportedStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "in_progress" => Ok(ReportedStatus::InProgress),
            "completed" => Ok(ReportedStatus::Completed),
            "failed" => Ok(ReportedStatus::Failed),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["in_progress", "completed", "failed"],
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub consumer_id: String,
    pub task_id: TaskId,
    pub status: ReportedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub queue_depth: usize,
    pub in_flight: usize,
    pub received: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    pub backpressure: f64,
    pub per_consumer: HashMap<String, PerConsumerStats>,
    pub recent_failures: Vec<FailureNote>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub queue_depth: usize,
    pub in_flight: usize,
    pub active_consumers: usize,
    pub backpressure: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}
