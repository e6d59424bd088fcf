//! Container runtime capability consumed by the worker.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{PortMap, Task};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("image pull failed for {image}: {message}")]
    Pull { image: String, message: String },

    #[error("container create failed: {0}")]
    Create(String),

    #[error("container start failed: {0}")]
    Start(String),

    #[error("container stop failed: {0}")]
    Stop(String),

    #[error("container inspect failed: {0}")]
    Inspect(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// What the runtime reports about a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInspection {
    pub status: String,
    pub host_ports: PortMap,
}

impl ContainerInspection {
    pub fn exited(&self) -> bool {
        self.status == "exited"
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Start a container for the task and return its identifier.
    async fn start(&self, task: &Task) -> ExecutorResult<String>;

    /// Stop and remove the container, whether it is still running or has
    /// already exited. A container that no longer exists is not an error.
    async fn stop(&self, container_id: &str) -> ExecutorResult<()>;

    /// `Ok(None)` when the runtime has no such container.
    async fn inspect(&self, container_id: &str) -> ExecutorResult<Option<ContainerInspection>>;
}
