//! rorch: a small container orchestrator.
//!
//! A manager accepts task events, places each task on one of its workers and
//! keeps its records in step with what the workers observe. Workers run the
//! tasks as Docker containers and report host stats.
//!
//! ```text
//! Manager
//!   ├── pending queue ─► Scheduler (roundrobin | epvm) ─► WorkerClient
//!   ├── TaskDb / EventDb (Store<T>: memory | redb)
//!   └── reconcile + health check loops
//! Worker
//!   ├── queue ─► Executor (Docker)
//!   ├── TaskDb
//!   └── stats + reconcile loops
//! ```

pub mod client;
pub mod config;
pub mod manager;
pub mod node;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod tasks;
pub mod worker;

#[cfg(test)]
mod testing;
