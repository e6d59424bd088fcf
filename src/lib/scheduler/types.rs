use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::epvm::Epvm;
use super::round_robin::RoundRobin;

/// Placement cost per node name. Lower is better.
pub type Scores = HashMap<String, f64>;

/// Placement strategy. Every variant answers the same
/// select-candidates / score / pick pipeline.
#[derive(Debug)]
pub enum Scheduler {
    RoundRobin(RoundRobin),
    Epvm(Epvm),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Epvm,
    Roundrobin,
}

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("no available candidates match resource request for task {0}")]
    NoCandidates(Uuid),

    #[error("no scores returned for task {0}")]
    NoScores(Uuid),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
