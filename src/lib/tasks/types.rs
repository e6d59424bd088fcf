use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl State {
    pub const ALL: [State; 5] = [
        State::Pending,
        State::Scheduled,
        State::Running,
        State::Completed,
        State::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Pending => "Pending",
            State::Scheduled => "Scheduled",
            State::Running => "Running",
            State::Completed => "Completed",
            State::Failed => "Failed",
        };
        f.pad(name)
    }
}

/// One host-side binding of a container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// Container port (e.g. `"80/tcp"`) to the host bindings observed for it.
pub type PortMap = BTreeMap<String, Vec<PortBinding>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: Uuid,
    pub container_id: Option<String>,
    pub name: String,
    pub state: State,
    pub image: String,
    /// Requested memory in bytes.
    pub memory: u64,
    /// Requested disk in bytes.
    pub disk: u64,
    pub exposed_ports: Vec<String>,
    pub port_bindings: HashMap<String, String>,
    pub host_ports: PortMap,
    pub restart_policy: String,
    pub health_check: String,
    pub restart_count: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(name: &str, image: &str) -> Self {
        Task {
            id: Uuid::new_v4(),
            name: name.to_string(),
            image: image.to_string(),
            ..Default::default()
        }
    }

    /// First host port bound for this task, by container port order.
    pub fn host_port(&self) -> Option<&str> {
        self.host_ports
            .values()
            .flat_map(|bindings| bindings.iter())
            .map(|binding| binding.host_port.as_str())
            .find(|port| !port.is_empty())
    }

    /// Overwrite the fields a worker observes while running this task.
    pub fn apply_observation(&mut self, observed: &Task) {
        self.state = observed.state;
        self.start_time = observed.start_time;
        self.finish_time = observed.finish_time;
        self.container_id = observed.container_id.clone();
        self.host_ports = observed.host_ports.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    pub state: State,
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

impl TaskEvent {
    pub fn new(state: State, task: Task) -> Self {
        TaskEvent {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }
}

/// Error body returned by the worker and manager APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrResponse {
    pub http_status_code: u16,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_skips_empty_bindings() {
        let mut task = Task::new("web", "nginx");
        task.host_ports.insert("443/tcp".into(), vec![]);
        task.host_ports.insert(
            "80/tcp".into(),
            vec![PortBinding { host_ip: "0.0.0.0".into(), host_port: "49153".into() }],
        );
        assert_eq!(task.host_port(), Some("49153"));

        task.host_ports.clear();
        assert_eq!(task.host_port(), None);
    }

    #[test]
    fn task_decodes_with_missing_fields() {
        let task: Task = serde_json::from_str(r#"{"name":"echo","image":"strm/helloworld-http"}"#)
            .unwrap();
        assert_eq!(task.state, State::Pending);
        assert_eq!(task.restart_count, 0);
        assert!(task.container_id.is_none());
    }

    #[test]
    fn apply_observation_keeps_request_fields() {
        let mut persisted = Task::new("web", "nginx");
        persisted.memory = 64;
        persisted.restart_count = 1;

        let mut observed = persisted.clone();
        observed.state = State::Running;
        observed.container_id = Some("abc".into());
        observed.memory = 0;
        observed.restart_count = 0;
        observed.start_time = Some(Utc::now());

        persisted.apply_observation(&observed);
        assert_eq!(persisted.state, State::Running);
        assert_eq!(persisted.container_id.as_deref(), Some("abc"));
        assert_eq!(persisted.memory, 64);
        assert_eq!(persisted.restart_count, 1);
    }
}
