//! Manager-side access to workers' RPC surfaces and task health endpoints.

pub mod http;
pub mod types;

pub use http::HttpWorkerClient;
pub use types::{ClientError, ClientResult, DispatchOutcome, WorkerClient};
