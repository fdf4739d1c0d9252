//! Consumer Runtime
//!
//! A consumer is a long-running pull loop with a bounded set of concurrent
//! task executions. It polls the coordinator for work, dispatches each
//! assignment to a background worker, keeps the task's heartbeat fresh
//! while the work runs, and reports a terminal status when it finishes.
//!
//! The concurrency cap comes from the consumer's weight
//! (`max(1, floor(weight * 10))`). Load balancing is implicit: a consumer
//! with more free slots finishes more work per unit time and therefore
//! polls more often, so its share of assignments converges to its weight
//! fraction without any coordinator-side routing.

use super::types::{max_concurrent_for, ConsumerConfig, ConsumerStats};
use crate::client::DistributorClient;
use crate::distributor::protocol::{ReportedStatus, StatusUpdate, WorkRequest};
use crate::distributor::types::{LogRecord, TaskId};

use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub type TaskProcessor =
    Arc<dyn Fn(LogRecord) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// The default "work": an opaque delay standing in for parsing, indexing
/// and alerting.
fn delay_processor(delay: std::time::Duration) -> TaskProcessor {
    Arc::new(move |_record: LogRecord| {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(())
        }) as Pin<Box<dyn Future<Output = Result<()>> + Send>>
    })
}

pub struct Consumer {
    config: ConsumerConfig,
    max_concurrent: usize,
    client: DistributorClient,
    processor: TaskProcessor,
    active: DashMap<TaskId, ()>,
    processed: AtomicU64,
    failed: AtomicU64,
    transport_errors: AtomicU64,
    running: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    pull_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Consumer {
    pub fn new(config: ConsumerConfig) -> Arc<Self> {
        let processor = delay_processor(config.processing_delay);
        Self::with_processor(config, processor)
    }

    /// Build a consumer whose work is a caller-supplied processor instead
    /// of the opaque delay.
    pub fn with_processor(config: ConsumerConfig, processor: TaskProcessor) -> Arc<Self> {
        let client = DistributorClient::new(&config.distributor_url);
        let max_concurrent = max_concurrent_for(config.weight);

        tracing::info!(
            "consumer {} initialized: weight={}, max_concurrent={}",
            config.id,
            config.weight,
            max_concurrent
        );

        Arc::new(Self {
            config,
            max_concurrent,
            client,
            processor,
            active: DashMap::new(),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            running: AtomicBool::new(false),
            started_at: Mutex::new(None),
            pull_handle: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn weight(&self) -> f64 {
        self.config.weight
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());

        let consumer = self.clone();
        let handle = tokio::spawn(async move {
            consumer.pull_loop().await;
        });
        *self.pull_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        tracing::info!("consumer {} started", self.config.id);
    }

    /// Graceful stop: quit pulling, then let the in-flight workers run to
    /// completion before returning.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let handle = self
            .pull_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        if !self.active.is_empty() {
            tracing::info!(
                "consumer {} waiting for {} active task(s) to complete",
                self.config.id,
                self.active.len()
            );
        }
        while !self.active.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        tracing::info!("consumer {} stopped", self.config.id);
    }

    async fn pull_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            if self.active.len() >= self.max_concurrent {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            let request = WorkRequest {
                consumer_id: self.config.id.clone(),
                weight: self.config.weight,
                current_tasks: self.active.len(),
            };

            match self.client.get_work(&request).await {
                Ok(work) if work.has_work => {
                    if let (Some(task_id), Some(payload)) = (work.task_id, work.payload) {
                        self.clone().spawn_task_worker(task_id, payload);
                    }
                    // Free slots left; pull again immediately.
                }
                Ok(_) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    self.transport_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("consumer {} failed to get work: {}", self.config.id, e);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    fn spawn_task_worker(self: Arc<Self>, task_id: TaskId, payload: LogRecord) {
        self.active.insert(task_id.clone(), ());

        tokio::spawn(async move {
            self.process_task(task_id.clone(), payload).await;
            self.active.remove(&task_id);
        });
    }

    async fn process_task(&self, task_id: TaskId, payload: LogRecord) {
        tracing::debug!(
            "consumer {} processing task {} ({})",
            self.config.id,
            task_id,
            payload.source
        );

        self.send_status(&task_id, ReportedStatus::InProgress, None)
            .await;

        let heartbeat = self.spawn_heartbeat(&task_id);
        let result = (self.processor)(payload).await;
        heartbeat.abort();

        match result {
            Ok(()) => {
                self.send_status(&task_id, ReportedStatus::Completed, None)
                    .await;
                self.processed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("consumer {} completed task {}", self.config.id, task_id);
            }
            Err(e) => {
                self.send_status(&task_id, ReportedStatus::Failed, Some(e.to_string()))
                    .await;
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "consumer {} failed task {}: {}",
                    self.config.id,
                    task_id,
                    e
                );
            }
        }
    }

    /// Keep refreshing the coordinator-side heartbeat while the work runs
    /// longer than one heartbeat interval. Aborted as soon as the work
    /// finishes.
    fn spawn_heartbeat(&self, task_id: &TaskId) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let consumer_id = self.config.id.clone();
        let task_id = task_id.clone();
        let interval = self.config.heartbeat_interval;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let update = StatusUpdate {
                    consumer_id: consumer_id.clone(),
                    task_id: task_id.clone(),
                    status: ReportedStatus::InProgress,
                    reason: None,
                };

                if let Err(e) = client.send_status(&update).await {
                    tracing::warn!("heartbeat for task {} failed: {}", task_id, e);
                }
            }
        })
    }

    async fn send_status(&self, task_id: &TaskId, status: ReportedStatus, reason: Option<String>) {
        let update = StatusUpdate {
            consumer_id: self.config.id.clone(),
            task_id: task_id.clone(),
            status,
            reason,
        };

        // A lost report is the coordinator's problem to recover from: the
        // task will time out and requeue.
        if let Err(e) = self.client.send_status(&update).await {
            self.transport_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "consumer {} failed to send status for {}: {}",
                self.config.id,
                task_id,
                e
            );
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        let uptime = self
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let processed = self.processed.load(Ordering::Relaxed);

        ConsumerStats {
            id: self.config.id.clone(),
            weight: self.config.weight,
            max_concurrent: self.max_concurrent,
            active_tasks: self.active.len(),
            processed,
            failed: self.failed.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            tasks_per_second: if uptime > 0.0 {
                processed as f64 / uptime
            } else {
                0.0
            },
            running: self.running.load(Ordering::SeqCst),
        }
    }
}
