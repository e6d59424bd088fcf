use std::{collections::VecDeque, sync::Arc};

use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use uuid::Uuid;

use super::stats::{Stats, StatsProvider};
use crate::config::WorkerConfig;
use crate::store::{Store, StoreError};
use crate::tasks::{Executor, ExecutorError, State, Task};

/// Executes tasks on one host.
///
/// The queue holds desired state; the store holds what actually happened.
pub struct Worker {
    pub name: String,
    pub(crate) queue: Mutex<VecDeque<Task>>,
    pub(crate) db: Arc<dyn Store<Task>>,
    pub(crate) stats: RwLock<Option<Stats>>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) stats_provider: Arc<dyn StatsProvider>,
    pub(crate) config: WorkerConfig,
    /// Wakes the run loop when a task is enqueued.
    pub(crate) wake: Notify,
    /// Serializes read-modify-write cycles on `db` between the run and
    /// reconcile loops.
    pub(crate) exec_lock: Mutex<()>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid state transition for task {id}: {from} -> {to}")]
    InvalidStateTransition { id: Uuid, from: State, to: State },

    #[error("task store error: {0}")]
    Store(#[from] StoreError),

    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
