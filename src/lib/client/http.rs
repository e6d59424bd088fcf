use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{ClientError, ClientResult, DispatchOutcome, WorkerClient};
use crate::tasks::{ErrResponse, Task, TaskEvent};
use crate::worker::Stats;

/// reqwest-backed client. Every call is bounded by the configured timeout so
/// one unreachable worker cannot stall a whole loop pass.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: Client,
}

impl HttpWorkerClient {
    pub fn new(timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(HttpWorkerClient { client })
    }
}

fn unreachable(target: &str, e: reqwest::Error) -> ClientError {
    ClientError::Unreachable {
        target: target.to_string(),
        message: e.to_string(),
    }
}

async fn decode<T: DeserializeOwned>(target: &str, resp: reqwest::Response) -> ClientResult<T> {
    resp.json().await.map_err(|e| ClientError::Decode {
        target: target.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn send_event(&self, worker: &str, event: &TaskEvent) -> ClientResult<DispatchOutcome> {
        let url = format!("http://{worker}/tasks");
        let resp = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|e| unreachable(&url, e))?;

        if resp.status() == StatusCode::CREATED {
            let task: Task = decode(&url, resp).await?;
            Ok(DispatchOutcome::Accepted(task))
        } else {
            let err: ErrResponse = decode(&url, resp).await?;
            Ok(DispatchOutcome::Rejected(err))
        }
    }

    async fn stop_task(&self, worker: &str, task_id: &str) -> ClientResult<()> {
        let url = format!("http://{worker}/tasks/{task_id}");
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| unreachable(&url, e))?;

        if resp.status() != StatusCode::NO_CONTENT {
            return Err(ClientError::Status {
                target: url,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn get_tasks(&self, worker: &str) -> ClientResult<Vec<Task>> {
        let url = format!("http://{worker}/tasks");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(&url, e))?;

        if resp.status() != StatusCode::OK {
            return Err(ClientError::Status {
                target: url,
                status: resp.status().as_u16(),
            });
        }
        decode(&url, resp).await
    }

    async fn get_stats(&self, worker: &str) -> ClientResult<Stats> {
        let url = format!("http://{worker}/stats");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(&url, e))?;

        if resp.status() != StatusCode::OK {
            return Err(ClientError::Status {
                target: url,
                status: resp.status().as_u16(),
            });
        }
        decode(&url, resp).await
    }

    async fn health_check(&self, url: &str) -> ClientResult<()> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(url, e))?;

        debug!(%url, status = %resp.status(), "health check response");
        if resp.status() != StatusCode::OK {
            return Err(ClientError::Status {
                target: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
