//! Coordinator Module
//!
//! The task lifecycle engine at the center of the pull-based work queue.
//!
//! ## Architecture Overview
//! 1. **Submission**: Producers post log records to `/submit`. Each record
//!    becomes a `Queued` task at the tail of the backlog; the payload is
//!    stored separately so the backlog stays light.
//! 2. **Assignment**: Consumers poll `/get_work`. The head of the backlog
//!    moves to the in-flight table, stamped with the assignee and an
//!    initial heartbeat. Retried tasks sit at the head, so they are
//!    delivered before fresh work.
//! 3. **Liveness**: `in_progress` reports refresh the heartbeat. The
//!    background monitor requeues any in-flight task whose heartbeat has
//!    expired, up to a retry cap (at-least-once semantics).
//! 4. **Completion**: Terminal reports drop the payload and feed the
//!    counters; duplicates and late reports are harmless no-ops.
//!
//! ## Submodules
//! - **`queue`**: Backlog, in-flight table and payload store behind a
//!   single lock, with all task transitions.
//! - **`monitor`**: The periodic timeout/requeue scan.
//! - **`stats`**: Per-consumer counters and the recent-failure ring.
//! - **`protocol`**: HTTP API contracts.
//! - **`handlers`**: Axum route handlers and router assembly.

pub mod types;
pub mod protocol;
pub mod stats;
pub mod queue;
pub mod monitor;
pub mod handlers;

#[cfg(test)]
mod tests;
