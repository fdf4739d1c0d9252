//! Consumer Pool & Autoscaler
//!
//! The pool owns a dynamic set of consumer runtimes. It starts them with
//! configured weights, scales the set up and down from backlog depth
//! reported by the coordinator's `/metrics`, and archives the counters of
//! every consumer it retires so throughput and distribution summaries
//! survive scale-down and shutdown.

use super::autoscaler::{decide, AutoscaleConfig, ScaleAction};
use super::runtime::{Consumer, TaskProcessor};
use super::types::{ConsumerConfig, DistributionEntry, DistributionReport, PoolStats};
use crate::client::DistributorClient;

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How the pool assigns weights to the consumers it creates.
#[derive(Debug, Clone)]
pub enum WeightSpec {
    /// Cycle through `[0.4, 0.3, 0.2, 0.1]`.
    Default,
    /// One weight for every consumer.
    Uniform(f64),
    /// Explicit weights, cycled if shorter than the pool.
    List(Vec<f64>),
}

const DEFAULT_WEIGHT_PATTERN: [f64; 4] = [0.4, 0.3, 0.2, 0.1];

pub fn resolve_weights(spec: &WeightSpec, count: usize) -> Vec<f64> {
    match spec {
        WeightSpec::Uniform(weight) => vec![*weight; count],
        WeightSpec::List(weights) if !weights.is_empty() => {
            (0..count).map(|i| weights[i % weights.len()]).collect()
        }
        _ => (0..count)
            .map(|i| DEFAULT_WEIGHT_PATTERN[i % DEFAULT_WEIGHT_PATTERN.len()])
            .collect(),
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub distributor_url: String,
    pub initial_size: usize,
    pub weights: WeightSpec,
    pub consumer_prefix: String,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub processing_delay: Duration,
    pub autoscale: Option<AutoscaleConfig>,
}

impl PoolConfig {
    pub fn new(distributor_url: &str, initial_size: usize) -> Self {
        Self {
            distributor_url: distributor_url.to_string(),
            initial_size,
            weights: WeightSpec::Default,
            consumer_prefix: "consumer".to_string(),
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(5),
            processing_delay: Duration::from_millis(100),
            autoscale: None,
        }
    }
}

pub struct ConsumerPool {
    config: PoolConfig,
    client: DistributorClient,
    consumers: Mutex<Vec<Arc<Consumer>>>,
    processor: Option<TaskProcessor>,
    // Monotonic id counter so retired and live consumers never share a
    // name in the coordinator's ledger.
    spawned: AtomicUsize,
    archived_processed: AtomicU64,
    archived_failed: AtomicU64,
    scale_ups: AtomicU64,
    scale_downs: AtomicU64,
    last_scale: std::sync::Mutex<Option<Instant>>,
    running: AtomicBool,
    autoscale_handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ConsumerPool {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// Build a pool whose consumers run a caller-supplied processor
    /// instead of the opaque delay.
    pub fn with_processor(config: PoolConfig, processor: TaskProcessor) -> Arc<Self> {
        Self::build(config, Some(processor))
    }

    fn build(config: PoolConfig, processor: Option<TaskProcessor>) -> Arc<Self> {
        let client = DistributorClient::new(&config.distributor_url);
        Arc::new(Self {
            config,
            client,
            consumers: Mutex::new(Vec::new()),
            processor,
            spawned: AtomicUsize::new(0),
            archived_processed: AtomicU64::new(0),
            archived_failed: AtomicU64::new(0),
            scale_ups: AtomicU64::new(0),
            scale_downs: AtomicU64::new(0),
            last_scale: std::sync::Mutex::new(None),
            running: AtomicBool::new(false),
            autoscale_handle: std::sync::Mutex::new(None),
        })
    }

    /// Start the initial consumers and, if configured, the autoscaler
    /// control loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("consumer pool already running");
            return Ok(());
        }

        if let Some(autoscale) = &self.config.autoscale {
            autoscale.validate()?;
        }

        let weights = resolve_weights(&self.config.weights, self.config.initial_size);
        for weight in &weights {
            self.add_consumer(*weight).await;
        }

        tracing::info!(
            "consumer pool started: {} consumer(s), weights={:?}",
            self.config.initial_size,
            weights
        );

        if let Some(autoscale) = self.config.autoscale.clone() {
            let pool = self.clone();
            let handle = tokio::spawn(async move {
                pool.autoscale_loop(autoscale).await;
            });
            *self
                .autoscale_handle
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(handle);
        }

        Ok(())
    }

    /// Stop every consumer gracefully and fold its counters into the
    /// archive, so pool totals are preserved across shutdown.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let handle = self
            .autoscale_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }

        let consumers: Vec<Arc<Consumer>> = {
            let mut guard = self.consumers.lock().await;
            guard.drain(..).collect()
        };

        tracing::info!("stopping {} consumer(s)", consumers.len());
        for consumer in consumers {
            consumer.stop().await;
            self.archive(&consumer);
        }
        tracing::info!("consumer pool stopped");
    }

    pub async fn scale_up(&self, count: usize, weight: f64) {
        if !self.running.load(Ordering::SeqCst) {
            tracing::warn!("cannot scale up: pool not running");
            return;
        }

        for _ in 0..count {
            self.add_consumer(weight).await;
        }

        let size = self.size().await;
        tracing::info!("scaled up by {}, pool size now {}", count, size);
    }

    /// Remove the most recently added consumers first; long-lived
    /// consumers keep their warm state and their share of the ledger.
    pub async fn scale_down(&self, count: usize) {
        let removed: Vec<Arc<Consumer>> = {
            let mut guard = self.consumers.lock().await;
            let keep = guard.len().saturating_sub(count);
            guard.split_off(keep)
        };

        if removed.is_empty() {
            return;
        }

        for consumer in removed.iter().rev() {
            consumer.stop().await;
            self.archive(consumer);
        }

        let size = self.size().await;
        tracing::info!("scaled down by {}, pool size now {}", removed.len(), size);
    }

    async fn add_consumer(&self, weight: f64) {
        let seq = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}-{}", self.config.consumer_prefix, seq);

        let mut config = ConsumerConfig::new(&id, &self.config.distributor_url, weight);
        config.poll_interval = self.config.poll_interval;
        config.heartbeat_interval = self.config.heartbeat_interval;
        config.processing_delay = self.config.processing_delay;

        let consumer = match &self.processor {
            Some(processor) => Consumer::with_processor(config, processor.clone()),
            None => Consumer::new(config),
        };
        consumer.start();

        self.consumers.lock().await.push(consumer);
    }

    fn archive(&self, consumer: &Arc<Consumer>) {
        let stats = consumer.stats();
        self.archived_processed
            .fetch_add(stats.processed, Ordering::Relaxed);
        self.archived_failed
            .fetch_add(stats.failed, Ordering::Relaxed);
        tracing::debug!(
            "archived {}: processed={} failed={}",
            stats.id,
            stats.processed,
            stats.failed
        );
    }

    async fn autoscale_loop(self: Arc<Self>, config: AutoscaleConfig) {
        tracing::info!(
            "autoscaler started: min={} max={} thresholds=({}, {})",
            config.min_size,
            config.max_size,
            config.scale_down_threshold,
            config.scale_up_threshold
        );
        let mut ticker = tokio::time::interval(config.check_interval);
        ticker.tick().await; // immediate first tick

        loop {
            ticker.tick().await;

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let depth = match self.client.metrics().await {
                Ok(metrics) => metrics.queue_depth,
                Err(e) => {
                    tracing::warn!("autoscaler failed to fetch metrics: {}", e);
                    continue;
                }
            };

            let since_last = self
                .last_scale
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .map(|t| t.elapsed());
            let size = self.size().await;

            match decide(depth, size, since_last, &config) {
                Some(ScaleAction::Up(count)) => {
                    tracing::info!(
                        "scaling up: queue_depth={} size={} adding={}",
                        depth,
                        size,
                        count
                    );
                    self.scale_up(count, config.scale_weight).await;
                    self.mark_scaled();
                    self.scale_ups.fetch_add(1, Ordering::Relaxed);
                }
                Some(ScaleAction::Down(count)) => {
                    tracing::info!(
                        "scaling down: queue_depth={} size={} removing={}",
                        depth,
                        size,
                        count
                    );
                    self.scale_down(count).await;
                    self.mark_scaled();
                    self.scale_downs.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    tracing::debug!("no scaling action: queue_depth={} size={}", depth, size);
                }
            }
        }
    }

    fn mark_scaled(&self) {
        *self.last_scale.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    pub async fn size(&self) -> usize {
        self.consumers.lock().await.len()
    }

    pub async fn stats(&self) -> PoolStats {
        let consumers = self.consumers.lock().await;
        let snapshots: Vec<_> = consumers.iter().map(|c| c.stats()).collect();
        drop(consumers);

        let current_processed: u64 = snapshots.iter().map(|s| s.processed).sum();
        let current_failed: u64 = snapshots.iter().map(|s| s.failed).sum();
        let archived_processed = self.archived_processed.load(Ordering::Relaxed);
        let archived_failed = self.archived_failed.load(Ordering::Relaxed);

        PoolStats {
            size: snapshots.len(),
            total_processed: current_processed + archived_processed,
            total_failed: current_failed + archived_failed,
            current_processed,
            scaled_down_processed: archived_processed,
            scaled_down_failed: archived_failed,
            scale_ups: self.scale_ups.load(Ordering::Relaxed),
            scale_downs: self.scale_downs.load(Ordering::Relaxed),
            consumers: snapshots,
            running: self.running.load(Ordering::SeqCst),
        }
    }

    /// Actual vs expected work share per live consumer, where expected is
    /// the consumer's fraction of the pool's total weight.
    pub async fn distribution(&self) -> DistributionReport {
        let stats = self.stats().await;
        let total = stats.total_processed;
        let weight_sum: f64 = stats.consumers.iter().map(|c| c.weight).sum();

        let mut per_consumer = HashMap::new();
        if total > 0 {
            for consumer in &stats.consumers {
                let actual = consumer.processed as f64 / total as f64 * 100.0;
                let expected = if weight_sum > 0.0 {
                    consumer.weight / weight_sum * 100.0
                } else {
                    0.0
                };
                per_consumer.insert(
                    consumer.id.clone(),
                    DistributionEntry {
                        processed: consumer.processed,
                        weight: consumer.weight,
                        actual_percentage: actual,
                        expected_percentage: expected,
                        deviation: actual - expected,
                    },
                );
            }
        }

        DistributionReport {
            total_processed: total,
            per_consumer,
        }
    }

    /// Resolve once every live consumer's local in-flight set is empty,
    /// or give up after `timeout`.
    pub async fn wait_for_idle(&self, timeout: Duration, check_interval: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let all_idle = {
                let consumers = self.consumers.lock().await;
                consumers.iter().all(|c| c.is_idle())
            };
            if all_idle {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!("timeout waiting for consumers to become idle");
                return false;
            }
            tokio::time::sleep(check_interval).await;
        }
    }
}
