use std::{collections::VecDeque, sync::Arc};

use chrono::Utc;
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tracing::{debug, error, info, warn};

use super::stats::{Stats, StatsProvider};
use super::types::{Worker, WorkerError, WorkerResult};
use crate::config::WorkerConfig;
use crate::shutdown::sleep_or_shutdown;
use crate::store::{Store, StoreError};
use crate::tasks::{Executor, State, Task, valid_state_transition};

impl Worker {
    pub fn new(
        name: &str,
        db: Arc<dyn Store<Task>>,
        executor: Arc<dyn Executor>,
        stats_provider: Arc<dyn StatsProvider>,
        config: WorkerConfig,
    ) -> Self {
        Worker {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            db,
            stats: RwLock::new(None),
            executor,
            stats_provider,
            config,
            wake: Notify::new(),
            exec_lock: Mutex::new(()),
        }
    }

    pub async fn add_task(&self, task: Task) {
        debug!(task_id = %task.id, state = %task.state, "task queued");
        self.queue.lock().await.push_back(task);
        self.wake.notify_one();
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn get_task(&self, id: &str) -> WorkerResult<Task> {
        Ok(self.db.get(id)?)
    }

    pub fn get_tasks(&self) -> WorkerResult<Vec<Task>> {
        Ok(self.db.list()?)
    }

    /// Last collected snapshot, or a fresh one if none was collected yet.
    pub async fn stats(&self) -> Stats {
        if let Some(stats) = self.stats.read().await.clone() {
            return stats;
        }
        self.sample_stats().await
    }

    async fn sample_stats(&self) -> Stats {
        let provider = self.stats_provider.clone();
        let mut stats = tokio::task::spawn_blocking(move || provider.stats())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "stats collection panicked");
                Stats::default()
            });
        stats.task_count = self.db.count().unwrap_or_default() as u64;
        stats
    }

    pub async fn collect_stats(&self) {
        let stats = self.sample_stats().await;
        *self.stats.write().await = Some(stats);
    }

    /// Take the next queued task and drive it toward its requested state.
    ///
    /// Returns `Ok(None)` when the queue is empty, otherwise the task as
    /// stored after this step.
    pub async fn run_task(&self) -> WorkerResult<Option<Task>> {
        let Some(queued) = self.queue.lock().await.pop_front() else {
            return Ok(None);
        };
        let _guard = self.exec_lock.lock().await;

        let current = self.current_record(&queued).await?;

        if current.state == State::Completed {
            return self.stop_task(current).await.map(Some);
        }

        if !valid_state_transition(&current.state, &queued.state) {
            warn!(
                task_id = %queued.id,
                from = %current.state,
                to = %queued.state,
                "rejecting invalid state transition"
            );
            return Err(WorkerError::InvalidStateTransition {
                id: queued.id,
                from: current.state,
                to: queued.state,
            });
        }

        match queued.state {
            State::Scheduled => self.start_task(queued).await.map(Some),
            State::Completed => self.stop_task(current).await.map(Some),
            State::Failed => {
                let mut task = current;
                task.state = State::Failed;
                self.db.put(&task.id.to_string(), &task)?;
                Ok(Some(task))
            }
            State::Running | State::Pending => {
                debug!(task_id = %queued.id, state = %queued.state, "nothing to do");
                Ok(Some(current))
            }
        }
    }

    /// The stored record a queued task is validated against. A task seen for
    /// the first time is stored as queued. A queued task with a higher
    /// restart count is a new incarnation and replaces the stored record.
    async fn current_record(&self, queued: &Task) -> WorkerResult<Task> {
        let key = queued.id.to_string();
        match self.db.get(&key) {
            Ok(existing) if queued.restart_count > existing.restart_count => {
                info!(
                    task_id = %queued.id,
                    restart_count = queued.restart_count,
                    "replacing task with restarted incarnation"
                );
                // The old container keeps its name until removed, exited or not.
                if let Some(container_id) = &existing.container_id {
                    if let Err(e) = self.executor.stop(container_id).await {
                        warn!(
                            task_id = %queued.id,
                            %container_id,
                            error = %e,
                            "failed to remove previous container"
                        );
                    }
                }
                self.db.put(&key, queued)?;
                Ok(queued.clone())
            }
            Ok(existing) => Ok(existing),
            Err(StoreError::NotFound(_)) => {
                self.db.put(&key, queued)?;
                Ok(self.db.get(&key)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn start_task(&self, mut task: Task) -> WorkerResult<Task> {
        task.start_time = Some(Utc::now());
        let key = task.id.to_string();

        match self.executor.start(&task).await {
            Ok(container_id) => {
                info!(task_id = %task.id, %container_id, "task running");
                task.container_id = Some(container_id);
                task.state = State::Running;
                self.db.put(&key, &task)?;
                Ok(task)
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "failed to start task");
                task.state = State::Failed;
                self.db.put(&key, &task)?;
                Err(e.into())
            }
        }
    }

    async fn stop_task(&self, mut task: Task) -> WorkerResult<Task> {
        match &task.container_id {
            Some(container_id) => {
                if let Err(e) = self.executor.stop(container_id).await {
                    warn!(
                        task_id = %task.id,
                        %container_id,
                        error = %e,
                        "error stopping container"
                    );
                }
            }
            None => warn!(task_id = %task.id, "no container recorded for task"),
        }

        task.finish_time = Some(Utc::now());
        task.state = State::Completed;
        self.db.put(&task.id.to_string(), &task)?;
        info!(task_id = %task.id, "task completed");
        Ok(task)
    }

    /// Fold what the executor observes into the stored records of running
    /// tasks. A container that is gone or exited marks its task failed.
    pub async fn update_tasks(&self) -> WorkerResult<()> {
        let _guard = self.exec_lock.lock().await;

        for mut task in self.db.list()? {
            if task.state != State::Running {
                continue;
            }

            let inspection = match &task.container_id {
                Some(container_id) => match self.executor.inspect(container_id).await {
                    Ok(inspection) => inspection,
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "inspect failed, skipping task");
                        continue;
                    }
                },
                None => None,
            };

            match inspection {
                None => {
                    warn!(task_id = %task.id, "no container for running task");
                    task.state = State::Failed;
                }
                Some(inspection) if inspection.exited() => {
                    warn!(task_id = %task.id, status = %inspection.status, "container not running");
                    task.state = State::Failed;
                }
                Some(inspection) => task.host_ports = inspection.host_ports,
            }
            self.db.put(&task.id.to_string(), &task)?;
        }
        Ok(())
    }
}

pub async fn run_tasks(worker: Arc<Worker>, mut shutdown: watch::Receiver<bool>) {
    loop {
        loop {
            match worker.run_task().await {
                Ok(Some(task)) => debug!(task_id = %task.id, state = %task.state, "task processed"),
                Ok(None) => break,
                Err(e) => error!(error = %e, "error running task"),
            }
        }

        tokio::select! {
            _ = worker.wake.notified() => {}
            stop = sleep_or_shutdown(worker.config.run_period, &mut shutdown) => {
                if stop {
                    break;
                }
            }
        }
    }
    info!(worker = %worker.name, "run loop stopped");
}

pub async fn collect_stats(worker: Arc<Worker>, mut shutdown: watch::Receiver<bool>) {
    loop {
        debug!(worker = %worker.name, "collecting stats");
        worker.collect_stats().await;
        if sleep_or_shutdown(worker.config.stats_period, &mut shutdown).await {
            break;
        }
    }
}

pub async fn update_tasks(worker: Arc<Worker>, mut shutdown: watch::Receiver<bool>) {
    loop {
        debug!(worker = %worker.name, "checking status of tasks");
        if let Err(e) = worker.update_tasks().await {
            error!(error = %e, "task reconciliation failed");
        }
        if sleep_or_shutdown(worker.config.reconcile_period, &mut shutdown).await {
            break;
        }
    }
}
