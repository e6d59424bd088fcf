//! Marginal-cost placement ("Enhanced PVM", Amir et al., *An Opportunity Cost
//! Approach for Job Assignment in a Scalable Computing Cluster*).
//!
//! Each resource contributes `f(load after) - f(load before)` where
//! `f(x) = LIEB^x` is a steep convex penalty, so already-loaded nodes are
//! strongly disfavored. Only memory and CPU are considered.

use std::time::Duration;

use futures_util::future::join_all;
use tracing::warn;

use super::types::Scores;
use crate::client::{ClientResult, WorkerClient};
use crate::node::Node;
use crate::tasks::Task;

/// Lieb's square ice constant.
pub const LIEB: f64 = 1.53960071783900203869;

#[derive(Debug, Clone)]
pub struct Epvm {
    /// Soft per-node task capacity.
    pub max_jobs: f64,
    /// Gap between the two stats samples used to measure CPU load.
    pub sample_interval: Duration,
}

impl Default for Epvm {
    fn default() -> Self {
        Epvm {
            max_jobs: 2.0,
            sample_interval: Duration::from_secs(3),
        }
    }
}

fn penalty(x: f64) -> f64 {
    LIEB.powf(x)
}

impl Epvm {
    pub fn new(max_jobs: f64, sample_interval: Duration) -> Self {
        Epvm {
            max_jobs,
            sample_interval,
        }
    }

    /// Nodes with at least the task's disk request still unallocated.
    pub fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .filter(|node| task.disk <= node.available_disk())
            .cloned()
            .collect()
    }

    /// Marginal cost of placing `task` on `node` at the given CPU load.
    /// `None` when the node reports no memory capacity.
    pub fn marginal_cost(&self, task: &Task, node: &Node, cpu_load: f64) -> Option<f64> {
        if node.memory == 0 {
            return None;
        }
        let total = node.memory as f64;
        let allocated = node.stats.mem_used_kb() as f64 + node.memory_allocated as f64;
        let mem_before = allocated / total;
        let mem_after = (allocated + (task.memory / 1024) as f64) / total;

        let jobs_before = node.task_count as f64 / self.max_jobs;
        let jobs_after = (node.task_count + 1) as f64 / self.max_jobs;

        let mem_cost =
            penalty(mem_after) + penalty(jobs_after) - penalty(mem_before) - penalty(jobs_before);
        let cpu_cost =
            penalty(cpu_load) + penalty(jobs_after) - penalty(cpu_load) - penalty(jobs_before);
        Some(mem_cost + cpu_cost)
    }

    /// Sample every candidate's CPU concurrently, then cost it. Nodes whose
    /// stats cannot be fetched are left out of the result.
    pub async fn score(
        &self,
        task: &Task,
        candidates: &[Node],
        client: &dyn WorkerClient,
    ) -> Scores {
        let samples = join_all(candidates.iter().map(|node| self.sample(node, client))).await;

        let mut scores = Scores::new();
        for (node, sample) in candidates.iter().zip(samples) {
            let (node, cpu_load) = match sample {
                Ok((latest, cpu_load)) => {
                    let mut node = node.clone();
                    node.apply_stats(latest);
                    (node, cpu_load)
                }
                Err(e) => {
                    warn!(
                        node = %node.name,
                        error = %e,
                        "error calculating CPU usage, skipping node"
                    );
                    continue;
                }
            };
            match self.marginal_cost(task, &node, cpu_load) {
                Some(cost) => {
                    scores.insert(node.name.clone(), cost);
                }
                None => warn!(node = %node.name, "node reports no memory, skipping"),
            }
        }
        scores
    }

    /// Two snapshots `sample_interval` apart; returns the later snapshot and
    /// the CPU utilization between them.
    async fn sample(
        &self,
        node: &Node,
        client: &dyn WorkerClient,
    ) -> ClientResult<(crate::worker::Stats, f64)> {
        let first = client.get_stats(&node.name).await?;
        tokio::time::sleep(self.sample_interval).await;
        let second = client.get_stats(&node.name).await?;
        let cpu_load = second.cpu_stats.usage_since(&first.cpu_stats);
        Ok((second, cpu_load))
    }
}
