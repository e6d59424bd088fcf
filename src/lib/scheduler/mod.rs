pub mod epvm;
pub mod round_robin;
pub mod scheduler;
pub mod types;

pub use epvm::Epvm;
pub use round_robin::RoundRobin;
pub use types::{Scheduler, SchedulerError, SchedulerKind, SchedulerResult, Scores};
