use crate::distributor::protocol::{
    AckResponse, HealthResponse, MetricsResponse, StatsResponse, StatusUpdate, SubmitResponse,
    WorkRequest, WorkResponse, ENDPOINT_GET_WORK, ENDPOINT_HEALTH, ENDPOINT_METRICS,
    ENDPOINT_STATS, ENDPOINT_STATUS, ENDPOINT_SUBMIT,
};
use crate::distributor::types::{LogRecord, TaskId};

use anyhow::Result;
use std::time::Duration;

const GET_WORK_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Typed client for the coordinator API, shared by consumers, the pool
/// and emitters.
#[derive(Clone)]
pub struct DistributorClient {
    base_url: String,
    http: reqwest::Client,
}

impl DistributorClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn submit(&self, record: &LogRecord) -> Result<TaskId> {
        let response = self
            .post_with_retry(ENDPOINT_SUBMIT, record, STATUS_TIMEOUT, 3)
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("submit failed: {}", response.status()));
        }

        let submit: SubmitResponse = response.json().await?;
        Ok(submit.task_id)
    }

    pub async fn get_work(&self, request: &WorkRequest) -> Result<WorkResponse> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, ENDPOINT_GET_WORK))
            .json(request)
            .timeout(GET_WORK_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("get_work failed: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    pub async fn send_status(&self, update: &StatusUpdate) -> Result<()> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, ENDPOINT_STATUS))
            .json(update)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("status failed: {}", response.status()));
        }

        let ack: AckResponse = response.json().await?;
        if !ack.ok {
            return Err(anyhow::anyhow!("status update not acknowledged"));
        }

        Ok(())
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        let response = self.get(ENDPOINT_STATS).await?;
        Ok(response.json().await?)
    }

    pub async fn metrics(&self) -> Result<MetricsResponse> {
        let response = self.get(ENDPOINT_METRICS).await?;
        Ok(response.json().await?)
    }

    pub async fn health(&self) -> Result<bool> {
        let response = self.get(ENDPOINT_HEALTH).await?;
        let health: HealthResponse = response.json().await?;
        Ok(health.ok)
    }

    async fn get(&self, endpoint: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, endpoint))
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("GET {} failed: {}", endpoint, response.status()));
        }

        Ok(response)
    }

    async fn post_with_retry<T: serde::Serialize>(
        &self,
        endpoint: &str,
        payload: &T,
        timeout: Duration,
        attempts: usize,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http
                .post(format!("{}{}", self.base_url, endpoint))
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}
