pub mod api;
pub mod stats;
pub mod types;
pub mod worker;

pub use api::TaskServer;
pub use stats::{CpuStats, Stats, StatsProvider, SystemStatsProvider};
pub use types::{Worker, WorkerError, WorkerResult};
pub use worker::{collect_stats, run_tasks, update_tasks};
