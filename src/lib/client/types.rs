use async_trait::async_trait;
use thiserror::Error;

use crate::tasks::{ErrResponse, Task, TaskEvent};
use crate::worker::Stats;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(String),

    #[error("error connecting to {target}: {message}")]
    Unreachable { target: String, message: String },

    #[error("unexpected status {status} from {target}")]
    Status { target: String, status: u16 },

    #[error("error decoding response from {target}: {message}")]
    Decode { target: String, message: String },
}

impl ClientError {
    /// The request may never have reached its target.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Unreachable { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// How a worker answered `POST /tasks`.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 201 with the task as the worker queued it.
    Accepted(Task),
    /// Any other status, with the worker's error body.
    Rejected(ErrResponse),
}

/// Calls a worker makes available over HTTP. `worker` is its `host:port`.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn send_event(&self, worker: &str, event: &TaskEvent) -> ClientResult<DispatchOutcome>;

    async fn stop_task(&self, worker: &str, task_id: &str) -> ClientResult<()>;

    async fn get_tasks(&self, worker: &str) -> ClientResult<Vec<Task>>;

    async fn get_stats(&self, worker: &str) -> ClientResult<Stats>;

    /// `Ok` only for a 200 from `url`.
    async fn health_check(&self, url: &str) -> ClientResult<()>;
}
