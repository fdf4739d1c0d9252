//! Producer-side client: submits log records to the coordinator.

use crate::client::DistributorClient;
use crate::distributor::types::{now_ms, LogLevel, LogRecord, TaskId};

use anyhow::Result;
use std::collections::HashMap;

pub struct LogEmitter {
    emitter_id: String,
    client: DistributorClient,
}

impl LogEmitter {
    pub fn new(distributor_url: &str, emitter_id: &str) -> Self {
        tracing::debug!(
            "emitter {} initialized (distributor: {})",
            emitter_id,
            distributor_url
        );
        Self {
            emitter_id: emitter_id.to_string(),
            client: DistributorClient::new(distributor_url),
        }
    }

    /// Submit one record; returns the id of the task created for it.
    pub async fn emit(
        &self,
        message: &str,
        level: LogLevel,
        source: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<TaskId> {
        let record = LogRecord {
            timestamp: now_ms(),
            level,
            message: message.to_string(),
            source: source.to_string(),
            metadata,
        };
        self.emit_record(&record).await
    }

    pub async fn emit_record(&self, record: &LogRecord) -> Result<TaskId> {
        let task_id = self.client.submit(record).await?;
        tracing::debug!("emitter {} submitted task {}", self.emitter_id, task_id);
        Ok(task_id)
    }
}
