//! Shared fixtures for the API tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use serde::de::DeserializeOwned;

use rorch::client::{ClientError, ClientResult, DispatchOutcome, WorkerClient};
use rorch::config::{ManagerConfig, WorkerConfig};
use rorch::manager::Manager;
use rorch::scheduler::{Scheduler, SchedulerKind};
use rorch::store::MemoryStore;
use rorch::tasks::{ContainerInspection, Executor, ExecutorResult, Task, TaskEvent};
use rorch::worker::{Stats, StatsProvider, Worker};

pub struct NoopExecutor;

#[async_trait]
impl Executor for NoopExecutor {
    async fn start(&self, task: &Task) -> ExecutorResult<String> {
        Ok(format!("container-{}", task.name))
    }

    async fn stop(&self, _container_id: &str) -> ExecutorResult<()> {
        Ok(())
    }

    async fn inspect(&self, _container_id: &str) -> ExecutorResult<Option<ContainerInspection>> {
        Ok(None)
    }
}

pub fn host_stats() -> Stats {
    Stats {
        mem_total_kb: 4 * 1024 * 1024,
        mem_available_kb: 3 * 1024 * 1024,
        disk_total: 50 * 1024 * 1024 * 1024,
        disk_free: 40 * 1024 * 1024 * 1024,
        ..Default::default()
    }
}

pub struct StaticStats;

impl StatsProvider for StaticStats {
    fn stats(&self) -> Stats {
        host_stats()
    }
}

pub fn worker() -> Arc<Worker> {
    Arc::new(Worker::new(
        "test-worker",
        Arc::new(MemoryStore::new()),
        Arc::new(NoopExecutor),
        Arc::new(StaticStats),
        WorkerConfig::default(),
    ))
}

/// Accepts every event and reports the same stats for every worker.
#[derive(Default)]
pub struct AcceptingClient {
    pub sent: Mutex<Vec<(String, TaskEvent)>>,
    pub stopped: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl WorkerClient for AcceptingClient {
    async fn send_event(&self, worker: &str, event: &TaskEvent) -> ClientResult<DispatchOutcome> {
        self.sent
            .lock()
            .unwrap()
            .push((worker.to_string(), event.clone()));
        Ok(DispatchOutcome::Accepted(event.task.clone()))
    }

    async fn stop_task(&self, worker: &str, task_id: &str) -> ClientResult<()> {
        self.stopped
            .lock()
            .unwrap()
            .push((worker.to_string(), task_id.to_string()));
        Ok(())
    }

    async fn get_tasks(&self, _worker: &str) -> ClientResult<Vec<Task>> {
        Ok(Vec::new())
    }

    async fn get_stats(&self, _worker: &str) -> ClientResult<Stats> {
        Ok(host_stats())
    }

    async fn health_check(&self, url: &str) -> ClientResult<()> {
        Err(ClientError::Status {
            target: url.to_string(),
            status: 503,
        })
    }
}

pub fn manager(workers: &[&str], client: Arc<AcceptingClient>) -> Arc<Manager> {
    let config = ManagerConfig {
        cpu_sample_interval: Duration::ZERO,
        ..Default::default()
    };
    Arc::new(Manager::new(
        workers.iter().map(|w| w.to_string()).collect(),
        Scheduler::new(SchedulerKind::Epvm, &config),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        client,
        config,
    ))
}

pub fn json_request(method: &str, uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn read_json<T: DeserializeOwned>(resp: Response<Body>) -> T {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
