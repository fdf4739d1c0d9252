use std::time::Duration;

/// Coordinator configuration, read from the environment. The `--port`
/// flag of the binary overrides `PORT`.
#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub port: u16,
    pub monitor_interval: Duration,
    pub task_timeout_ms: u64,
    pub max_retries: u32,
    pub log_level: tracing::Level,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            monitor_interval: Duration::from_millis(5000),
            task_timeout_ms: 30_000,
            max_retries: 3,
            log_level: tracing::Level::INFO,
        }
    }
}

impl DistributorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let monitor_interval_ms = std::env::var("MONITOR_INTERVAL_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(defaults.monitor_interval.as_millis() as u64);

        let task_timeout_ms = std::env::var("TASK_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(defaults.task_timeout_ms);

        let max_retries = std::env::var("MAX_RETRIES")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        let log_level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|value| value.parse::<tracing::Level>().ok())
            .unwrap_or(defaults.log_level);

        Self {
            port,
            monitor_interval: Duration::from_millis(monitor_interval_ms),
            task_timeout_ms,
            max_retries,
            log_level,
        }
    }
}
