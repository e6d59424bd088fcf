pub mod docker;
pub mod executor;
pub mod state;
pub mod types;

pub use docker::DockerExecutor;
pub use executor::{ContainerInspection, Executor, ExecutorError, ExecutorResult};
pub use state::valid_state_transition;
pub use types::{ErrResponse, PortBinding, PortMap, State, Task, TaskEvent};
