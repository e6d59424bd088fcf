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
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{DeadLetter, Manager, ManagerError};
use crate::node::Node;
use crate::store::StoreError;
use crate::tasks::TaskEvent;
use crate::worker::api::error_response;

/// User-facing HTTP surface of the manager.
pub struct ManagerServer {
    pub manager: Arc<Manager>,
    pub address: String,
    pub port: u16,
}

impl ManagerServer {
    pub fn new(manager: Arc<Manager>, address: &str, port: u16) -> Self {
        Self {
            manager,
            address: address.to_string(),
            port,
        }
    }

    async fn start_task(
        AxumState(manager): AxumState<Arc<Manager>>,
        body: Result<Json<TaskEvent>, JsonRejection>,
    ) -> Response {
        let Json(mut event) = match body {
            Ok(body) => body,
            Err(rejection) => {
                let message = format!("error unmarshalling body: {rejection}");
                warn!(%message, "rejected task event");
                return error_response(StatusCode::BAD_REQUEST, message);
            }
        };

        // Tasks submitted without an id get a fresh one.
        if event.task.id.is_nil() {
            event.task.id = Uuid::new_v4();
            debug!(task_id = %event.task.id, name = %event.task.name, "assigned task id");
        }
        if event.id.is_nil() {
            event.id = Uuid::new_v4();
        }

        let task = event.task.clone();
        manager.add_task(event).await;
        info!(task_id = %task.id, "task added");
        (StatusCode::CREATED, Json(task)).into_response()
    }

    async fn get_tasks(AxumState(manager): AxumState<Arc<Manager>>) -> Response {
        match manager.get_tasks() {
            Ok(tasks) => Json(tasks).into_response(),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    async fn stop_task(
        AxumState(manager): AxumState<Arc<Manager>>,
        Path(id): Path<String>,
    ) -> Response {
        let Ok(id) = Uuid::parse_str(&id) else {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid task id {id}"));
        };

        match manager.stop_task(&id).await {
            Ok(event) => {
                info!(task_id = %id, event_id = %event.id, "completion requested");
                StatusCode::NO_CONTENT.into_response()
            }
            Err(ManagerError::Store(StoreError::NotFound(_))) => {
                error_response(StatusCode::NOT_FOUND, format!("no task with id {id} found"))
            }
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    async fn get_nodes(AxumState(manager): AxumState<Arc<Manager>>) -> Json<Vec<Node>> {
        Json(manager.nodes().await)
    }

    async fn get_dead_letters(
        AxumState(manager): AxumState<Arc<Manager>>,
    ) -> Json<Vec<DeadLetter>> {
        Json(manager.dead_letters().await)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/tasks", get(ManagerServer::get_tasks).post(ManagerServer::start_task))
            .route("/tasks/{id}", delete(ManagerServer::stop_task))
            .route("/nodes", get(ManagerServer::get_nodes))
            .route("/deadletters", get(ManagerServer::get_dead_letters))
            .with_state(self.manager.clone())
    }

    pub async fn start_server(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.address, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, workers = ?self.manager.workers, "manager API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    }
}
