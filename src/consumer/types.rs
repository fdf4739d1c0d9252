use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Weight is clamped to this range; the concurrency cap is derived as
/// `max(1, floor(weight * 10))`.
pub const MIN_WEIGHT: f64 = 0.05;
pub const MAX_WEIGHT: f64 = 1.0;

pub fn max_concurrent_for(weight: f64) -> usize {
    ((weight * 10.0).floor() as usize).max(1)
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub id: String,
    pub distributor_url: String,
    pub weight: f64,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub processing_delay: Duration,
}

impl ConsumerConfig {
    pub fn new(id: &str, distributor_url: &str, weight: f64) -> Self {
        Self {
            id: id.to_string(),
            distributor_url: distributor_url.to_string(),
            weight: weight.clamp(MIN_WEIGHT, MAX_WEIGHT),
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(5),
            processing_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerStats {
    pub id: String,
    pub weight: f64,
    pub max_concurrent: usize,
    pub active_tasks: usize,
    pub processed: u64,
    pub failed: u64,
    pub transport_errors: u64,
    pub uptime_seconds: f64,
    pub tasks_per_second: f64,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub size: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub current_processed: u64,
    pub scaled_down_processed: u64,
    pub scaled_down_failed: u64,
    pub scale_ups: u64,
    pub scale_downs: u64,
    pub consumers: Vec<ConsumerStats>,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionEntry {
    pub processed: u64,
    pub weight: f64,
    pub actual_percentage: f64,
    pub expected_percentage: f64,
    pub deviation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionReport {
    pub total_processed: u64,
    pub per_consumer: HashMap<String, DistributionEntry>,
}
