use super::protocol::{MetricsResponse, ReportedStatus, StatsResponse, StatusUpdate, WorkRequest, WorkResponse};
use super::stats::{ConsumerLedger, FailureNote};
use super::types::{now_ms, LogRecord, Task, TaskId};

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Everything a task transition touches, guarded by one lock so each
/// operation commits atomically: a task id lives in exactly one of the
/// backlog, the in-flight table, or the terminal counters, and a payload
/// exists iff its task is in one of the first two.
struct CoreState {
    backlog: VecDeque<Task>,
    in_flight: HashMap<TaskId, Task>,
    payloads: HashMap<TaskId, LogRecord>,
    received: u64,
    completed: u64,
    failed: u64,
    requeued: u64,
    ledger: ConsumerLedger,
}

pub struct Distributor {
    state: Mutex<CoreState>,
    task_timeout_ms: u64,
    max_retries: u32,
}

impl Distributor {
    pub fn new(task_timeout_ms: u64, max_retries: u32) -> Self {
        Self {
            state: Mutex::new(CoreState {
                backlog: VecDeque::new(),
                in_flight: HashMap::new(),
                payloads: HashMap::new(),
                received: 0,
                completed: 0,
                failed: 0,
                requeued: 0,
                ledger: ConsumerLedger::new(),
            }),
            task_timeout_ms,
            max_retries,
        }
    }

    // The lock only guards short panic-free sections; if a holder did
    // panic, the state is still the last committed one.
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept a log record for processing. The task is visible to
    /// `get_work` as soon as this returns.
    pub fn submit(&self, record: LogRecord) -> TaskId {
        let task = Task::new();
        let task_id = task.id.clone();

        let mut state = self.lock();
        debug_assert!(
            !state.backlog.iter().any(|t| t.id == task_id),
            "duplicate task id in backlog"
        );
        tracing::debug!(
            "received log | task={} source={} level={:?} queue_depth={}",
            task_id,
            record.source,
            record.level,
            state.backlog.len() + 1
        );
        state.payloads.insert(task_id.clone(), record);
        state.backlog.push_back(task);
        state.received += 1;

        task_id
    }

    /// Hand the head of the backlog to a polling consumer. Pop, assign
    /// and publish to the in-flight table in one critical section, so a
    /// task id is held by at most one consumer until its next terminal
    /// or requeue event.
    pub fn get_work(&self, request: &WorkRequest) -> WorkResponse {
        let now = now_ms();
        let mut state = self.lock();
        state.ledger.touch(&request.consumer_id, now);

        let Some(mut task) = state.backlog.pop_front() else {
            return WorkResponse::empty();
        };

        task.assign(&request.consumer_id, now);
        let task_id = task.id.clone();

        let Some(payload) = state.payloads.get(&task_id).cloned() else {
            // Payload lifetime is tied to queue membership; missing data
            // here is a logic bug. Drop the task rather than hand out an
            // empty assignment.
            tracing::error!("payload missing for task {}, dropping", task_id);
            state.failed += 1;
            return WorkResponse::empty();
        };

        state.in_flight.insert(task_id.clone(), task);

        tracing::debug!(
            "assigned work | task={} to={} queue_depth={}",
            task_id,
            request.consumer_id,
            state.backlog.len()
        );

        WorkResponse {
            has_work: true,
            task_id: Some(task_id),
            payload: Some(payload),
        }
    }

    /// Apply a consumer status report. `in_progress` is the heartbeat;
    /// `completed`/`failed` are terminal and idempotent. Updates for
    /// unknown or already-requeued tasks are accepted no-ops: with
    /// at-least-once delivery a late report is normal, not an error.
    pub fn update_status(&self, update: &StatusUpdate) {
        let now = now_ms();
        let mut state = self.lock();
        state.ledger.touch(&update.consumer_id, now);

        match update.status {
            ReportedStatus::InProgress => {
                match state.in_flight.get_mut(&update.task_id) {
                    Some(task) if task.assignee.as_deref() == Some(&update.consumer_id) => {
                        task.last_heartbeat = Some(now);
                        tracing::debug!(
                            "heartbeat | task={} from={}",
                            update.task_id,
                            update.consumer_id
                        );
                    }
                    Some(_) => {
                        // Reassigned after a timeout; the current
                        // assignee's heartbeat governs.
                        tracing::debug!(
                            "stale heartbeat | task={} from={}",
                            update.task_id,
                            update.consumer_id
                        );
                    }
                    None => {
                        tracing::debug!(
                            "heartbeat for unknown task {} from {}",
                            update.task_id,
                            update.consumer_id
                        );
                    }
                }
            }
            ReportedStatus::Completed => {
                if state.in_flight.remove(&update.task_id).is_some() {
                    state.payloads.remove(&update.task_id);
                    state.completed += 1;
                    state.ledger.record_processed(&update.consumer_id, now);
                    tracing::debug!(
                        "task completed | task={} by={}",
                        update.task_id,
                        update.consumer_id
                    );
                } else {
                    tracing::debug!(
                        "stale completion for task {} from {}",
                        update.task_id,
                        update.consumer_id
                    );
                }
            }
            ReportedStatus::Failed => {
                if state.in_flight.remove(&update.task_id).is_some() {
                    state.payloads.remove(&update.task_id);
                    state.failed += 1;
                    state.ledger.record_failed(&update.consumer_id, now);
                    let reason = update
                        .reason
                        .clone()
                        .unwrap_or_else(|| "unspecified".to_string());
                    tracing::warn!(
                        "task failed | task={} by={} reason={}",
                        update.task_id,
                        update.consumer_id,
                        reason
                    );
                    state.ledger.push_failure(FailureNote {
                        task_id: update.task_id.clone(),
                        consumer_id: Some(update.consumer_id.clone()),
                        reason,
                        at: now,
                    });
                } else {
                    tracing::debug!(
                        "stale failure for task {} from {}",
                        update.task_id,
                        update.consumer_id
                    );
                }
            }
        }
    }

    /// One monitor pass: requeue every in-flight task whose heartbeat
    /// has expired, failing tasks that are out of retries. Returns how
    /// many tasks were moved back to the backlog.
    ///
    /// The in-flight keys are snapshotted first and each id is then
    /// re-checked under the lock, so a terminal report racing this scan
    /// wins or loses atomically but never half-applies.
    pub fn requeue_expired(&self) -> usize {
        let candidates: Vec<TaskId> = {
            let state = self.lock();
            state.in_flight.keys().cloned().collect()
        };

        let now = now_ms();
        let mut moved = 0;

        for task_id in candidates {
            let mut state = self.lock();

            let expired = match state.in_flight.get(&task_id) {
                Some(task) => task.heartbeat_expired(self.task_timeout_ms, now),
                None => false,
            };
            if !expired {
                continue;
            }

            let Some(mut task) = state.in_flight.remove(&task_id) else {
                continue;
            };
            let previous = task.assignee.take();

            if task.retries < self.max_retries {
                task.reset_for_requeue();
                tracing::warn!(
                    "task {} timed out (assigned to {}), requeued (retry {}/{})",
                    task_id,
                    previous.as_deref().unwrap_or("?"),
                    task.retries,
                    self.max_retries
                );
                debug_assert!(
                    !state.backlog.iter().any(|t| t.id == task_id),
                    "duplicate task id in backlog"
                );
                state.backlog.push_front(task);
                state.requeued += 1;
                moved += 1;
            } else {
                state.payloads.remove(&task_id);
                state.failed += 1;
                state.ledger.push_failure(FailureNote {
                    task_id: task_id.clone(),
                    consumer_id: previous,
                    reason: "max retries exceeded".to_string(),
                    at: now,
                });
                tracing::error!("task {} exceeded max retries, marked as failed", task_id);
            }
        }

        moved
    }

    pub fn metrics(&self) -> MetricsResponse {
        let now = now_ms();
        let state = self.lock();
        let queue_depth = state.backlog.len();
        let active_consumers = state.ledger.active_consumers(now);

        MetricsResponse {
            queue_depth,
            in_flight: state.in_flight.len(),
            active_consumers,
            backpressure: queue_depth as f64 / active_consumers.max(1) as f64,
        }
    }

    pub fn stats(&self) -> StatsResponse {
        let now = now_ms();
        let state = self.lock();
        let queue_depth = state.backlog.len();
        let active = state.ledger.active_consumers(now);

        StatsResponse {
            queue_depth,
            in_flight: state.in_flight.len(),
            received: state.received,
            completed: state.completed,
            failed: state.failed,
            retries: state.requeued,
            backpressure: queue_depth as f64 / active.max(1) as f64,
            per_consumer: state.ledger.snapshot(),
            recent_failures: state.ledger.recent_failures(),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.lock().backlog.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    #[cfg(test)]
    pub(crate) fn payload_exists(&self, task_id: &TaskId) -> bool {
        self.lock().payloads.contains_key(task_id)
    }

    #[cfg(test)]
    pub(crate) fn in_flight_task(&self, task_id: &TaskId) -> Option<Task> {
        self.lock().in_flight.get(task_id).cloned()
    }
}
