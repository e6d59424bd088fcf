pub mod api;
pub mod manager;
pub mod types;

pub use api::ManagerServer;
pub use manager::{do_health_checks, process_tasks, update_tasks};
pub use types::{Assignments, DeadLetter, Manager, ManagerError, ManagerResult};
