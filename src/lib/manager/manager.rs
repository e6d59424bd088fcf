use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{Assignments, DeadLetter, Manager, ManagerError, ManagerResult};
use crate::client::{DispatchOutcome, WorkerClient};
use crate::config::ManagerConfig;
use crate::node::Node;
use crate::scheduler::Scheduler;
use crate::shutdown::sleep_or_shutdown;
use crate::store::{Store, StoreError};
use crate::tasks::{State, Task, TaskEvent, valid_state_transition};

impl Manager {
    pub fn new(
        workers: Vec<String>,
        scheduler: Scheduler,
        task_db: Arc<dyn Store<Task>>,
        event_db: Arc<dyn Store<TaskEvent>>,
        client: Arc<dyn WorkerClient>,
        config: ManagerConfig,
    ) -> Self {
        let nodes = workers
            .iter()
            .map(|w| Node::new(w, &format!("http://{w}"), "worker"))
            .collect();
        Manager {
            assignments: RwLock::new(Assignments::new(&workers)),
            workers,
            pending: Mutex::new(VecDeque::new()),
            task_db,
            event_db,
            nodes: RwLock::new(nodes),
            dead_letters: Mutex::new(VecDeque::new()),
            scheduler,
            client,
            config,
            task_lock: Mutex::new(()),
        }
    }

    pub async fn add_task(&self, event: TaskEvent) {
        debug!(
            event_id = %event.id,
            task_id = %event.task.id,
            state = %event.state,
            "event queued"
        );
        self.pending.lock().await.push_back(event);
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub fn get_tasks(&self) -> ManagerResult<Vec<Task>> {
        Ok(self.task_db.list()?)
    }

    pub fn get_task(&self, id: &Uuid) -> ManagerResult<Task> {
        Ok(self.task_db.get(&id.to_string())?)
    }

    pub fn get_events(&self) -> ManagerResult<Vec<TaskEvent>> {
        Ok(self.event_db.list()?)
    }

    pub async fn nodes(&self) -> Vec<Node> {
        self.nodes.read().await.clone()
    }

    pub async fn assignments(&self) -> Assignments {
        self.assignments.read().await.clone()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.iter().cloned().collect()
    }

    async fn dead_letter(&self, event: TaskEvent, reason: String) {
        let mut letters = self.dead_letters.lock().await;
        letters.push_back(DeadLetter { event, reason });
        while letters.len() > self.config.dead_letter_capacity {
            let Some(dropped) = letters.pop_front() else {
                break;
            };
            debug!(event_id = %dropped.event.id, "dropping oldest dead letter");
        }
    }

    /// Queue a request to complete a task the manager knows about.
    pub async fn stop_task(&self, id: &Uuid) -> ManagerResult<TaskEvent> {
        let mut task = self.get_task(id)?;
        task.state = State::Completed;
        let event = TaskEvent::new(State::Completed, task);
        self.add_task(event.clone()).await;
        Ok(event)
    }

    /// Rebuild the node snapshots: capacity from each worker's stats, and
    /// allocation from the tasks currently placed there.
    pub async fn refresh_nodes(&self) -> Vec<Node> {
        let fetched = join_all(self.workers.iter().map(|w| self.client.get_stats(w))).await;
        let assignments = self.assignments.read().await.clone();

        let mut nodes = Vec::with_capacity(self.workers.len());
        for (worker, stats) in self.workers.iter().zip(fetched) {
            let mut node = Node::new(worker, &format!("http://{worker}"), "worker");
            match stats {
                Ok(stats) => node.apply_stats(stats),
                Err(e) => warn!(%worker, error = %e, "unable to fetch node stats"),
            }
            for id in assignments.tasks_on(worker) {
                match self.task_db.get(&id.to_string()) {
                    Ok(task) if matches!(task.state, State::Scheduled | State::Running) => {
                        node.allocate(task.memory / 1024, task.disk);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(task_id = %id, error = %e, "assigned task missing from store"),
                }
            }
            nodes.push(node);
        }

        *self.nodes.write().await = nodes.clone();
        nodes
    }

    /// Dispatch at most one pending event.
    pub async fn send_work(&self) -> ManagerResult<()> {
        let Some(event) = self.pending.lock().await.pop_front() else {
            debug!("no work in the queue");
            return Ok(());
        };
        self.event_db.put(&event.id.to_string(), &event)?;
        info!(
            event_id = %event.id,
            task_id = %event.task.id,
            state = %event.state,
            "pulled event off pending queue"
        );

        let assigned = self
            .assignments
            .read()
            .await
            .worker_of(&event.task.id)
            .map(str::to_string);
        match assigned {
            Some(worker) => self.handle_lifecycle(&worker, event).await,
            None => self.place(event).await,
        }
    }

    /// An event for a task that already has a worker. Completion requests
    /// become a stop on that worker; a task still `Scheduled` is redelivered
    /// there. Anything else is refused.
    async fn handle_lifecycle(&self, worker: &str, event: TaskEvent) -> ManagerResult<()> {
        let persisted = self.get_task(&event.task.id)?;

        if event.state == State::Completed {
            if !valid_state_transition(&persisted.state, &State::Completed) {
                warn!(
                    task_id = %persisted.id,
                    state = %persisted.state,
                    "invalid request: task cannot transition to completed"
                );
                return Err(ManagerError::InvalidTransition {
                    id: persisted.id,
                    from: persisted.state,
                    to: State::Completed,
                });
            }
            self.client.stop_task(worker, &persisted.id.to_string()).await?;
            info!(task_id = %persisted.id, %worker, "task scheduled to be stopped");
            return Ok(());
        }

        let redelivery = persisted.state == State::Scheduled
            && matches!(event.state, State::Scheduled | State::Running);
        if !redelivery {
            warn!(
                task_id = %persisted.id,
                state = %persisted.state,
                requested = %event.state,
                "dropping event for already placed task"
            );
            return Err(ManagerError::InvalidTransition {
                id: persisted.id,
                from: persisted.state,
                to: event.state,
            });
        }

        let mut event = event;
        event.task = persisted;
        self.deliver(worker, event).await
    }

    async fn place(&self, event: TaskEvent) -> ManagerResult<()> {
        let nodes = self.refresh_nodes().await;
        let node = match self
            .scheduler
            .select_node(&event.task, &nodes, self.client.as_ref())
            .await
        {
            Ok(node) => node,
            Err(e) => {
                error!(
                    task_id = %event.task.id,
                    error = %e,
                    "error selecting worker, dead-lettering event"
                );
                self.dead_letter(event, e.to_string()).await;
                return Err(e.into());
            }
        };

        let mut event = event;
        event.task.state = State::Scheduled;
        {
            let _guard = self.task_lock.lock().await;
            self.assignments
                .write()
                .await
                .assign(&node.name, event.task.id);
            self.task_db.put(&event.task.id.to_string(), &event.task)?;
        }
        info!(task_id = %event.task.id, worker = %node.name, "task placed");

        self.deliver(&node.name, event).await
    }

    /// POST the event to `worker`. Transport failures put the event back on
    /// the pending queue; worker-side rejections are reported, not retried.
    async fn deliver(&self, worker: &str, event: TaskEvent) -> ManagerResult<()> {
        match self.client.send_event(worker, &event).await {
            Ok(DispatchOutcome::Accepted(task)) => {
                debug!(task_id = %task.id, %worker, "worker accepted task");
                Ok(())
            }
            Ok(DispatchOutcome::Rejected(err)) => {
                error!(
                    task_id = %event.task.id,
                    %worker,
                    code = err.http_status_code,
                    message = %err.message,
                    "response error"
                );
                Err(ManagerError::Rejected(err))
            }
            Err(e) if e.is_transport() => {
                warn!(
                    task_id = %event.task.id,
                    %worker,
                    error = %e,
                    "worker unreachable, re-queueing event"
                );
                self.add_task(event).await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Pull every worker's task list and fold the observed fields into the
    /// manager's records. Unknown tasks are not adopted.
    pub async fn update_tasks(&self) {
        let reports = join_all(self.workers.iter().map(|w| self.client.get_tasks(w))).await;

        for (worker, report) in self.workers.iter().zip(reports) {
            let tasks = match report {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(%worker, error = %e, "skipping worker this round");
                    continue;
                }
            };

            for observed in tasks {
                debug!(task_id = %observed.id, %worker, "attempting to update task");
                let key = observed.id.to_string();
                let _guard = self.task_lock.lock().await;
                let mut persisted = match self.task_db.get(&key) {
                    Ok(task) => task,
                    Err(StoreError::NotFound(_)) => {
                        warn!(task_id = %observed.id, %worker, "worker reports unknown task");
                        continue;
                    }
                    Err(e) => {
                        warn!(task_id = %observed.id, error = %e, "unable to read task");
                        continue;
                    }
                };

                persisted.apply_observation(&observed);
                if let Err(e) = self.task_db.put(&key, &persisted) {
                    warn!(task_id = %observed.id, error = %e, "unable to store task update");
                }
            }
        }
    }

    /// Check a task's health endpoint through its worker's host and the
    /// task's first bound host port.
    pub async fn check_task_health(&self, task: &Task) -> ManagerResult<()> {
        let worker = self
            .assignments
            .read()
            .await
            .worker_of(&task.id)
            .map(str::to_string)
            .ok_or(ManagerError::NotAssigned(task.id))?;
        let host_port = task.host_port().ok_or(ManagerError::NoHostPort(task.id))?;
        let host = worker.split(':').next().unwrap_or(&worker);

        let url = format!("http://{host}:{host_port}{}", task.health_check);
        debug!(task_id = %task.id, %url, "calling health check");
        self.client.health_check(&url).await?;
        Ok(())
    }

    pub async fn do_health_checks(&self) {
        let tasks = match self.get_tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "error getting list of tasks");
                return;
            }
        };

        for task in tasks {
            if task.restart_count >= self.config.max_restarts {
                continue;
            }
            let needs_restart = match task.state {
                State::Running => match self.check_task_health(&task).await {
                    Ok(()) => false,
                    Err(e @ (ManagerError::NoHostPort(_) | ManagerError::NotAssigned(_))) => {
                        warn!(task_id = %task.id, error = %e, "health check not possible");
                        false
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "health check failed");
                        true
                    }
                },
                State::Failed => true,
                _ => false,
            };

            if needs_restart {
                if let Err(e) = self.restart_task(&task.id).await {
                    error!(task_id = %task.id, error = %e, "restart failed");
                }
            }
        }
    }

    /// Send a task back to the worker it is pinned to as a new incarnation.
    pub async fn restart_task(&self, id: &Uuid) -> ManagerResult<()> {
        let worker = self
            .assignments
            .read()
            .await
            .worker_of(id)
            .map(str::to_string)
            .ok_or(ManagerError::NotAssigned(*id))?;

        let task = {
            let _guard = self.task_lock.lock().await;
            let mut task = self.get_task(id)?;
            if task.restart_count >= self.config.max_restarts {
                debug!(task_id = %id, "restart budget exhausted");
                return Ok(());
            }
            task.state = State::Scheduled;
            task.restart_count += 1;
            self.task_db.put(&id.to_string(), &task)?;
            task
        };
        info!(task_id = %id, %worker, restart_count = task.restart_count, "restarting task");

        let event = TaskEvent::new(State::Running, task);
        self.event_db.put(&event.id.to_string(), &event)?;
        self.deliver(&worker, event).await
    }
}

pub async fn process_tasks(manager: Arc<Manager>, mut shutdown: watch::Receiver<bool>) {
    loop {
        debug!("processing any tasks in the queue");
        if let Err(e) = manager.send_work().await {
            warn!(error = %e, "dispatch attempt failed");
        }
        if sleep_or_shutdown(manager.config.dispatch_period, &mut shutdown).await {
            break;
        }
    }
    info!("dispatch loop stopped");
}

pub async fn update_tasks(manager: Arc<Manager>, mut shutdown: watch::Receiver<bool>) {
    loop {
        debug!("checking for task updates from workers");
        manager.update_tasks().await;
        if sleep_or_shutdown(manager.config.reconcile_period, &mut shutdown).await {
            break;
        }
    }
    info!("reconcile loop stopped");
}

pub async fn do_health_checks(manager: Arc<Manager>, mut shutdown: watch::Receiver<bool>) {
    loop {
        debug!("performing task health checks");
        manager.do_health_checks().await;
        if sleep_or_shutdown(manager.config.health_check_period, &mut shutdown).await {
            break;
        }
    }
    info!("health check loop stopped");
}
