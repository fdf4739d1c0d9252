//! Pull-Based Distributed Work Queue for Log Processing
//!
//! This library crate defines the components of the system; the binary
//! (`main.rs`) runs the coordinator.
//!
//! ## Architecture Modules
//!
//! - **`distributor`**: The coordinator: backlog, in-flight table,
//!   payload store, timeout monitor and the HTTP API that producers and
//!   consumers talk to.
//! - **`consumer`**: The worker side: pull-loop consumer runtimes, the
//!   pool that owns them, and the backlog-driven autoscaler.
//! - **`emitter`**: The producer-side submit client.
//! - **`client`**: Typed reqwest client for the coordinator API, shared
//!   by consumers, the pool and emitters.
//! - **`config`**: Environment configuration for the coordinator.

pub mod client;
pub mod config;
pub mod consumer;
pub mod distributor;
pub mod emitter;
