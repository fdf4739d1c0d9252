//! Coordinator Module Tests
//!
//! State-machine tests for the task lifecycle engine, exercised directly
//! against the `Distributor` without HTTP in between.
//!
//! ## Test Scopes
//! - **Placement**: a task id lives in exactly one of backlog, in-flight
//!   table, or terminal counters.
//! - **Liveness protocol**: heartbeats, timeout requeue, retry exhaustion.
//! - **Idempotence**: duplicate and stale status reports are no-ops.
//! - **Accounting**: received = completed + failed + queued + in-flight.

#[cfg(test)]
mod tests {
    use crate::distributor::protocol::{ReportedStatus, StatusUpdate, WorkRequest};
    use crate::distributor::queue::Distributor;
    use crate::distributor::types::{LogLevel, LogRecord, now_ms};
    use std::collections::HashMap;
    use std::time::Duration;

    fn record(message: &str) -> LogRecord {
        LogRecord {
            timestamp: now_ms(),
            level: LogLevel::Info,
            message: message.to_string(),
            source: "test-suite".to_string(),
            metadata: HashMap::new(),
        }
    }

    fn pull(consumer_id: &str) -> WorkRequest {
        WorkRequest {
            consumer_id: consumer_id.to_string(),
            weight: 0.3,
            current_tasks: 0,
        }
    }

    fn report(
        consumer_id: &str,
        task_id: &crate::distributor::types::TaskId,
        status: ReportedStatus,
        reason: Option<&str>,
    ) -> StatusUpdate {
        StatusUpdate {
            consumer_id: consumer_id.to_string(),
            task_id: task_id.clone(),
            status,
            reason: reason.map(|r| r.to_string()),
        }
    }

    // ============================================================
    // Submission and assignment
    // ============================================================

    #[test]
    fn test_submit_appends_to_tail_in_order() {
        let distributor = Distributor::new(30_000, 3);

        let first = distributor.submit(record("first"));
        let second = distributor.submit(record("second"));

        let stats = distributor.stats();
        assert_eq!(stats.queue_depth, 2);
        assert_eq!(stats.received, 2);

        let work = distributor.get_work(&pull("a"));
        assert_eq!(work.task_id, Some(first));
        let work = distributor.get_work(&pull("a"));
        assert_eq!(work.task_id, Some(second));
    }

    #[test]
    fn test_get_work_on_empty_backlog() {
        let distributor = Distributor::new(30_000, 3);

        let work = distributor.get_work(&pull("a"));

        assert!(!work.has_work);
        assert!(work.task_id.is_none());
        assert!(work.payload.is_none());
    }

    #[test]
    fn test_assignment_moves_task_to_in_flight() {
        let distributor = Distributor::new(30_000, 3);
        distributor.submit(record("payload"));

        let work = distributor.get_work(&pull("consumer-a"));

        assert!(work.has_work);
        assert_eq!(work.payload.as_ref().map(|p| p.message.as_str()), Some("payload"));
        assert_eq!(distributor.queue_depth(), 0);
        assert_eq!(distributor.in_flight_count(), 1);

        let task_id = work.task_id.expect("assigned task id");
        let task = distributor.in_flight_task(&task_id).expect("in flight");
        assert_eq!(task.assignee.as_deref(), Some("consumer-a"));
        assert!(task.last_heartbeat.is_some());
    }

    #[test]
    fn test_task_assigned_at_most_once() {
        let distributor = Distributor::new(30_000, 3);
        distributor.submit(record("only one"));

        let first = distributor.get_work(&pull("a"));
        let second = distributor.get_work(&pull("b"));

        assert!(first.has_work);
        assert!(!second.has_work);
    }

    // ============================================================
    // Terminal reports
    // ============================================================

    #[test]
    fn test_completed_drops_payload_and_counts() {
        let distributor = Distributor::new(30_000, 3);
        distributor.submit(record("done soon"));
        let work = distributor.get_work(&pull("a"));
        let task_id = work.task_id.expect("task id");

        distributor.update_status(&report("a", &task_id, ReportedStatus::Completed, None));

        let stats = distributor.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.per_consumer["a"].processed, 1);
        assert!(!distributor.payload_exists(&task_id));
    }

    #[test]
    fn test_terminal_status_is_idempotent() {
        // ARRANGE: one completed task
        let distributor = Distributor::new(30_000, 3);
        distributor.submit(record("counted once"));
        let work = distributor.get_work(&pull("a"));
        let task_id = work.task_id.expect("task id");
        distributor.update_status(&report("a", &task_id, ReportedStatus::Completed, None));

        // ACT: the same terminal report again
        distributor.update_status(&report("a", &task_id, ReportedStatus::Completed, None));
        distributor.update_status(&report("a", &task_id, ReportedStatus::Failed, Some("late")));

        // ASSERT: nothing moved on the second and third submission
        let stats = distributor.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.per_consumer["a"].processed, 1);
        assert_eq!(stats.per_consumer["a"].failed, 0);
    }

    #[test]
    fn test_failed_records_reason_in_ring() {
        let distributor = Distributor::new(30_000, 3);
        distributor.submit(record("doomed"));
        let work = distributor.get_work(&pull("a"));
        let task_id = work.task_id.expect("task id");

        distributor.update_status(&report(
            "a",
            &task_id,
            ReportedStatus::Failed,
            Some("parse error"),
        ));

        let stats = distributor.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.per_consumer["a"].failed, 1);
        assert_eq!(stats.recent_failures.len(), 1);
        assert_eq!(stats.recent_failures[0].reason, "parse error");
        assert_eq!(stats.recent_failures[0].task_id, task_id);
        assert!(!distributor.payload_exists(&task_id));
    }

    #[test]
    fn test_status_for_unknown_task_is_noop() {
        let distributor = Distributor::new(30_000, 3);
        let ghost = crate::distributor::types::TaskId::new();

        distributor.update_status(&report("a", &ghost, ReportedStatus::InProgress, None));
        distributor.update_status(&report("a", &ghost, ReportedStatus::Completed, None));
        distributor.update_status(&report("a", &ghost, ReportedStatus::Failed, Some("x")));

        let stats = distributor.stats();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.in_flight, 0);
    }

    // ============================================================
    // Heartbeats
    // ============================================================

    #[test]
    fn test_heartbeat_refreshes_only_for_current_assignee() {
        let distributor = Distributor::new(30_000, 3);
        distributor.submit(record("ticking"));
        let work = distributor.get_work(&pull("owner"));
        let task_id = work.task_id.expect("task id");

        let before = distributor
            .in_flight_task(&task_id)
            .and_then(|t| t.last_heartbeat)
            .expect("initial heartbeat");

        std::thread::sleep(Duration::from_millis(5));
        distributor.update_status(&report("stranger", &task_id, ReportedStatus::InProgress, None));
        let after_stranger = distributor
            .in_flight_task(&task_id)
            .and_then(|t| t.last_heartbeat)
            .expect("still in flight");
        assert_eq!(after_stranger, before);

        std::thread::sleep(Duration::from_millis(5));
        distributor.update_status(&report("owner", &task_id, ReportedStatus::InProgress, None));
        let after_owner = distributor
            .in_flight_task(&task_id)
            .and_then(|t| t.last_heartbeat)
            .expect("still in flight");
        assert!(after_owner > before);
    }

    // ============================================================
    // Timeout requeue
    // ============================================================

    #[test]
    fn test_requeue_puts_expired_task_at_head_with_same_payload() {
        // ARRANGE: short timeout; one assigned task, one fresh task behind it
        let distributor = Distributor::new(20, 3);
        let first = distributor.submit(record("went quiet"));
        distributor.submit(record("fresh"));
        let work = distributor.get_work(&pull("silent"));
        assert_eq!(work.task_id.as_ref(), Some(&first));

        // ACT: let the heartbeat expire, then run the monitor pass
        std::thread::sleep(Duration::from_millis(60));
        let moved = distributor.requeue_expired();

        // ASSERT: the expired task is back at the head, retried once,
        // with its original payload
        assert_eq!(moved, 1);
        let stats = distributor.stats();
        assert_eq!(stats.queue_depth, 2);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.retries, 1);

        let work = distributor.get_work(&pull("next"));
        assert_eq!(work.task_id.as_ref(), Some(&first));
        assert_eq!(
            work.payload.as_ref().map(|p| p.message.as_str()),
            Some("went quiet")
        );
        let task = distributor.in_flight_task(&first).expect("reassigned");
        assert_eq!(task.retries, 1);
        assert_eq!(task.assignee.as_deref(), Some("next"));
    }

    #[test]
    fn test_live_heartbeat_prevents_requeue() {
        let distributor = Distributor::new(200, 3);
        distributor.submit(record("alive"));
        let work = distributor.get_work(&pull("beating"));
        let task_id = work.task_id.expect("task id");

        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(50));
            distributor.update_status(&report("beating", &task_id, ReportedStatus::InProgress, None));
            assert_eq!(distributor.requeue_expired(), 0);
        }

        assert_eq!(distributor.in_flight_count(), 1);
        assert_eq!(distributor.stats().retries, 0);
    }

    #[test]
    fn test_max_retries_exhaustion_fails_task() {
        let distributor = Distributor::new(10, 2);
        let task_id = distributor.submit(record("cursed"));

        for round in 0..3 {
            let work = distributor.get_work(&pull(&format!("silent-{round}")));
            assert_eq!(work.task_id.as_ref(), Some(&task_id));
            std::thread::sleep(Duration::from_millis(40));
            distributor.requeue_expired();
        }

        let stats = distributor.stats();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.queue_depth, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.retries, 2);
        assert!(stats
            .recent_failures
            .iter()
            .any(|f| f.reason == "max retries exceeded"));
        assert!(!distributor.payload_exists(&task_id));
    }

    #[test]
    fn test_late_completion_after_requeue_is_noop() {
        let distributor = Distributor::new(10, 3);
        distributor.submit(record("slowpoke"));
        let work = distributor.get_work(&pull("slow"));
        let task_id = work.task_id.expect("task id");

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(distributor.requeue_expired(), 1);

        // The original assignee finally reports in; the task is queued
        // again, so coordinator state must not move.
        distributor.update_status(&report("slow", &task_id, ReportedStatus::Completed, None));

        let stats = distributor.stats();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.queue_depth, 1);
        assert!(distributor.payload_exists(&task_id));
    }

    // ============================================================
    // Accounting and metrics
    // ============================================================

    #[test]
    fn test_accounting_invariant_holds() {
        let distributor = Distributor::new(30_000, 3);

        for i in 0..5 {
            distributor.submit(record(&format!("record {i}")));
        }
        let first = distributor.get_work(&pull("a")).task_id.expect("task");
        let second = distributor.get_work(&pull("b")).task_id.expect("task");
        distributor.update_status(&report("a", &first, ReportedStatus::Completed, None));
        distributor.update_status(&report("b", &second, ReportedStatus::Failed, Some("bad")));

        let stats = distributor.stats();
        assert_eq!(
            stats.received,
            stats.completed + stats.failed + stats.queue_depth as u64 + stats.in_flight as u64
        );
    }

    #[test]
    fn test_backpressure_divides_by_active_consumers() {
        let distributor = Distributor::new(30_000, 3);
        for i in 0..4 {
            distributor.submit(record(&format!("record {i}")));
        }

        // Nobody has polled yet: the depth itself is the backpressure.
        let metrics = distributor.metrics();
        assert_eq!(metrics.queue_depth, 4);
        assert_eq!(metrics.active_consumers, 0);
        assert_eq!(metrics.backpressure, 4.0);

        // One consumer pulls one task: 3 queued over 1 active.
        distributor.get_work(&pull("a"));
        let metrics = distributor.metrics();
        assert_eq!(metrics.queue_depth, 3);
        assert_eq!(metrics.active_consumers, 1);
        assert_eq!(metrics.backpressure, 3.0);
    }
}
