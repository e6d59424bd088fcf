//! In-process fakes for the executor, stats and worker RPC capabilities.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{ClientError, ClientResult, DispatchOutcome, WorkerClient};
use crate::tasks::{ContainerInspection, Executor, ExecutorError, ExecutorResult, Task, TaskEvent};
use crate::worker::{Stats, StatsProvider};

#[derive(Default)]
pub struct FakeExecutor {
    fail_start: bool,
    started: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
    inspections: Mutex<HashMap<String, ContainerInspection>>,
}

impl FakeExecutor {
    pub fn failing_start() -> Self {
        FakeExecutor {
            fail_start: true,
            ..Default::default()
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn set_inspection(&self, container_id: &str, inspection: ContainerInspection) {
        self.inspections
            .lock()
            .unwrap()
            .insert(container_id.to_string(), inspection);
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn start(&self, task: &Task) -> ExecutorResult<String> {
        if self.fail_start {
            return Err(ExecutorError::Start("image not found".into()));
        }
        let container_id = format!("container-{}", task.name);
        self.started.lock().unwrap().push(container_id.clone());
        Ok(container_id)
    }

    async fn stop(&self, container_id: &str) -> ExecutorResult<()> {
        self.stopped.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> ExecutorResult<Option<ContainerInspection>> {
        Ok(self.inspections.lock().unwrap().get(container_id).cloned())
    }
}

pub struct FixedStats(pub Stats);

impl Default for FixedStats {
    fn default() -> Self {
        FixedStats(Stats {
            mem_total_kb: 8 * 1024 * 1024,
            mem_available_kb: 6 * 1024 * 1024,
            disk_total: 100 * 1024 * 1024 * 1024,
            disk_free: 80 * 1024 * 1024 * 1024,
            ..Default::default()
        })
    }
}

impl StatsProvider for FixedStats {
    fn stats(&self) -> Stats {
        self.0.clone()
    }
}

/// Scripted worker fleet keyed by worker address.
#[derive(Default)]
pub struct FakeWorkerClient {
    /// Successive stats samples per worker; the last one repeats.
    pub stats: Mutex<HashMap<String, VecDeque<Stats>>>,
    pub tasks: Mutex<HashMap<String, Vec<Task>>>,
    pub unreachable: Mutex<Vec<String>>,
    pub unhealthy: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(String, TaskEvent)>>,
    pub stopped: Mutex<Vec<(String, String)>>,
    pub health_checked: Mutex<Vec<String>>,
}

impl FakeWorkerClient {
    pub fn with_stats(self, worker: &str, samples: Vec<Stats>) -> Self {
        self.stats
            .lock()
            .unwrap()
            .insert(worker.to_string(), samples.into());
        self
    }

    pub fn set_unreachable(&self, worker: &str) {
        self.unreachable.lock().unwrap().push(worker.to_string());
    }

    pub fn set_unhealthy(&self, url: &str) {
        self.unhealthy.lock().unwrap().push(url.to_string());
    }

    pub fn set_tasks(&self, worker: &str, tasks: Vec<Task>) {
        self.tasks.lock().unwrap().insert(worker.to_string(), tasks);
    }

    pub fn sent(&self) -> Vec<(String, TaskEvent)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<(String, String)> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn health_checked(&self) -> Vec<String> {
        self.health_checked.lock().unwrap().clone()
    }

    fn check_reachable(&self, worker: &str) -> ClientResult<()> {
        if self.unreachable.lock().unwrap().iter().any(|w| w == worker) {
            return Err(ClientError::Unreachable {
                target: worker.to_string(),
                message: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerClient for FakeWorkerClient {
    async fn send_event(&self, worker: &str, event: &TaskEvent) -> ClientResult<DispatchOutcome> {
        self.check_reachable(worker)?;
        self.sent
            .lock()
            .unwrap()
            .push((worker.to_string(), event.clone()));
        Ok(DispatchOutcome::Accepted(event.task.clone()))
    }

    async fn stop_task(&self, worker: &str, task_id: &str) -> ClientResult<()> {
        self.check_reachable(worker)?;
        self.stopped
            .lock()
            .unwrap()
            .push((worker.to_string(), task_id.to_string()));
        Ok(())
    }

    async fn get_tasks(&self, worker: &str) -> ClientResult<Vec<Task>> {
        self.check_reachable(worker)?;
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .get(worker)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_stats(&self, worker: &str) -> ClientResult<Stats> {
        self.check_reachable(worker)?;
        let mut stats = self.stats.lock().unwrap();
        let samples = stats.get_mut(worker).ok_or_else(|| ClientError::Status {
            target: worker.to_string(),
            status: 404,
        })?;
        let sample = if samples.len() > 1 {
            samples.pop_front()
        } else {
            samples.front().cloned()
        };
        sample.ok_or_else(|| ClientError::Status {
            target: worker.to_string(),
            status: 500,
        })
    }

    async fn health_check(&self, url: &str) -> ClientResult<()> {
        self.health_checked.lock().unwrap().push(url.to_string());
        if self.unhealthy.lock().unwrap().iter().any(|u| u == url) {
            return Err(ClientError::Status {
                target: url.to_string(),
                status: 500,
            });
        }
        Ok(())
    }
}
