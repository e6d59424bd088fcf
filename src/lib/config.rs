//! Configuration types.
//!
//! Durations are written as whole seconds in TOML files. Fields missing from
//! a file fall back to the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// Manager control loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// How often one pending event is dispatched.
    #[serde(with = "secs")]
    pub dispatch_period: Duration,
    /// How often worker task lists are folded into the task store.
    #[serde(with = "secs")]
    pub reconcile_period: Duration,
    #[serde(with = "secs")]
    pub health_check_period: Duration,
    /// Restarts allowed before a task is left failed.
    pub max_restarts: u32,
    /// Soft per-node task capacity used by the EPVM cost function.
    pub max_jobs_per_node: f64,
    /// Gap between the two stats samples used to measure CPU load.
    #[serde(with = "secs")]
    pub cpu_sample_interval: Duration,
    /// Upper bound on every outbound call to a worker or health endpoint.
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// Unplaceable events kept for inspection; the oldest go first.
    pub dead_letter_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            dispatch_period: Duration::from_secs(10),
            reconcile_period: Duration::from_secs(15),
            health_check_period: Duration::from_secs(60),
            max_restarts: 3,
            max_jobs_per_node: 2.0,
            cpu_sample_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(5),
            dead_letter_capacity: 100,
        }
    }
}

/// Worker loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Longest the run loop idles when nothing wakes it.
    #[serde(with = "secs")]
    pub run_period: Duration,
    #[serde(with = "secs")]
    pub stats_period: Duration,
    #[serde(with = "secs")]
    pub reconcile_period: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            run_period: Duration::from_secs(10),
            stats_period: Duration::from_secs(15),
            reconcile_period: Duration::from_secs(15),
        }
    }
}

/// Top-level file layout: `[manager]` and `[worker]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub manager: ManagerConfig,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.manager.max_restarts, 3);
        assert_eq!(config.manager.max_jobs_per_node, 2.0);
    }

    #[test]
    fn partial_tables_override_only_given_fields() {
        let config = Config::from_toml(
            r#"
            [manager]
            dispatch_period = 2
            max_restarts = 5

            [worker]
            stats_period = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.manager.dispatch_period, Duration::from_secs(2));
        assert_eq!(config.manager.max_restarts, 5);
        assert_eq!(config.manager.health_check_period, Duration::from_secs(60));
        assert_eq!(config.worker.stats_period, Duration::from_secs(30));
        assert_eq!(config.worker.run_period, Duration::from_secs(10));
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(matches!(
            Config::from_toml("[manager]\nmax_restarts = \"three\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
