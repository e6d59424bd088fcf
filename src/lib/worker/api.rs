use axum::{
    Json, Router,
    extract::{Path, State as AxumState, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use super::stats::Stats;
use super::types::{Worker, WorkerError};
use crate::store::StoreError;
use crate::tasks::{ErrResponse, State, Task, TaskEvent};

/// RPC surface the manager talks to.
pub struct TaskServer {
    pub worker: Arc<Worker>,
    pub address: String,
    pub port: u16,
}

pub(crate) fn error_response(status: StatusCode, message: String) -> Response {
    let body = ErrResponse {
        http_status_code: status.as_u16(),
        message,
    };
    (status, Json(body)).into_response()
}

impl TaskServer {
    pub fn new(worker: Arc<Worker>, address: &str, port: u16) -> Self {
        Self {
            worker,
            address: address.to_string(),
            port,
        }
    }

    async fn get_tasks(AxumState(worker): AxumState<Arc<Worker>>) -> Response {
        match worker.get_tasks() {
            Ok(tasks) => Json(tasks).into_response(),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    async fn start_task(
        AxumState(worker): AxumState<Arc<Worker>>,
        body: Result<Json<TaskEvent>, JsonRejection>,
    ) -> Response {
        let Json(task_event) = match body {
            Ok(body) => body,
            Err(rejection) => {
                let message = format!("error unmarshalling body: {rejection}");
                warn!(%message, "rejected task event");
                return error_response(StatusCode::BAD_REQUEST, message);
            }
        };

        let task: Task = task_event.task;
        worker.add_task(task.clone()).await;
        info!(task_id = %task.id, event_id = %task_event.id, "task queued to start");
        (StatusCode::CREATED, Json(task)).into_response()
    }

    async fn stop_task(
        AxumState(worker): AxumState<Arc<Worker>>,
        Path(id): Path<String>,
    ) -> Response {
        let Ok(id) = uuid::Uuid::parse_str(&id) else {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid task id {id}"));
        };

        let task = match worker.get_task(&id.to_string()) {
            Ok(task) => task,
            Err(WorkerError::Store(StoreError::NotFound(_))) => {
                return error_response(StatusCode::NOT_FOUND, format!("task {id} not found"));
            }
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        // Queue a copy; the stored record keeps its observed state until the
        // run loop acts on the request.
        let mut stop = task;
        stop.state = State::Completed;
        let container_id = stop.container_id.clone().unwrap_or_default();
        worker.add_task(stop).await;
        info!(task_id = %id, %container_id, "task queued to stop");
        StatusCode::NO_CONTENT.into_response()
    }

    async fn get_stats(AxumState(worker): AxumState<Arc<Worker>>) -> Json<Stats> {
        Json(worker.stats().await)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/tasks", get(TaskServer::get_tasks).post(TaskServer::start_task))
            .route("/tasks/{id}", delete(TaskServer::stop_task))
            .route("/stats", get(TaskServer::get_stats))
            .with_state(self.worker.clone())
    }

    pub async fn start_server(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.address, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, worker = %self.worker.name, "worker API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    }
}
