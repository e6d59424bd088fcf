use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::client::{ClientError, WorkerClient};
use crate::config::ManagerConfig;
use crate::node::Node;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::store::{Store, StoreError};
use crate::tasks::{ErrResponse, State, Task, TaskEvent};

/// Accepts task events, places them on workers and keeps its task records
/// in line with what the workers observe.
pub struct Manager {
    pub workers: Vec<String>,
    pub(crate) pending: Mutex<VecDeque<TaskEvent>>,
    pub(crate) task_db: Arc<dyn Store<Task>>,
    pub(crate) event_db: Arc<dyn Store<TaskEvent>>,
    pub(crate) assignments: RwLock<Assignments>,
    /// Node snapshots from the last scheduling pass.
    pub(crate) nodes: RwLock<Vec<Node>>,
    /// Bounded by `config.dead_letter_capacity`.
    pub(crate) dead_letters: Mutex<VecDeque<DeadLetter>>,
    pub(crate) scheduler: Scheduler,
    pub(crate) client: Arc<dyn WorkerClient>,
    pub(crate) config: ManagerConfig,
    /// Serializes read-modify-write cycles on `task_db` across loops.
    pub(crate) task_lock: Mutex<()>,
}

/// Which worker each task was placed on, indexed both ways.
///
/// A task id is listed under a worker iff it maps back to that worker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Assignments {
    worker_tasks: HashMap<String, Vec<Uuid>>,
    task_worker: HashMap<Uuid, String>,
}

impl Assignments {
    pub fn new(workers: &[String]) -> Self {
        Assignments {
            worker_tasks: workers.iter().map(|w| (w.clone(), Vec::new())).collect(),
            task_worker: HashMap::new(),
        }
    }

    pub fn assign(&mut self, worker: &str, task_id: Uuid) {
        if let Some(previous) = self.task_worker.insert(task_id, worker.to_string()) {
            if previous == worker {
                return;
            }
            if let Some(ids) = self.worker_tasks.get_mut(&previous) {
                ids.retain(|id| *id != task_id);
            }
        }
        self.worker_tasks
            .entry(worker.to_string())
            .or_default()
            .push(task_id);
    }

    pub fn worker_of(&self, task_id: &Uuid) -> Option<&str> {
        self.task_worker.get(task_id).map(String::as_str)
    }

    pub fn tasks_on(&self, worker: &str) -> &[Uuid] {
        self.worker_tasks
            .get(worker)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_consistent(&self) -> bool {
        let forward = self.worker_tasks.iter().all(|(worker, ids)| {
            ids.iter()
                .all(|id| self.task_worker.get(id).is_some_and(|w| w == worker))
        });
        let listed: usize = self.worker_tasks.values().map(Vec::len).sum();
        forward && listed == self.task_worker.len()
    }
}

/// An event dropped because no worker could take its task.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub event: TaskEvent,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("task {id} is in state {from} and cannot transition to {to}")]
    InvalidTransition { id: Uuid, from: State, to: State },

    #[error("task {0} is not assigned to any worker")]
    NotAssigned(Uuid),

    #[error("task {0} has no usable host port")]
    NoHostPort(Uuid),

    #[error("worker rejected task ({}): {}", .0.http_status_code, .0.message)]
    Rejected(ErrResponse),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_keeps_both_indexes_in_step() {
        let mut maps = Assignments::new(&["w1".to_string(), "w2".to_string()]);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        maps.assign("w1", a);
        maps.assign("w2", b);
        maps.assign("w1", a);

        assert!(maps.is_consistent());
        assert_eq!(maps.tasks_on("w1"), &[a]);
        assert_eq!(maps.worker_of(&b), Some("w2"));
    }

    #[test]
    fn reassignment_moves_task() {
        let mut maps = Assignments::default();
        let id = Uuid::new_v4();
        maps.assign("w1", id);
        maps.assign("w2", id);

        assert!(maps.is_consistent());
        assert!(maps.tasks_on("w1").is_empty());
        assert_eq!(maps.tasks_on("w2"), &[id]);
    }
}
