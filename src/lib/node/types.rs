use serde::{Deserialize, Serialize};

use crate::worker::Stats;

/// Placement-time view of one worker. Rebuilt on every scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Worker address, `host:port`.
    pub name: String,
    pub api: String,
    pub cores: u64,
    /// Total memory in KiB.
    pub memory: u64,
    /// KiB requested by tasks placed on this node.
    pub memory_allocated: u64,
    /// Total disk in bytes.
    pub disk: u64,
    pub disk_allocated: u64,
    pub role: String,
    pub task_count: u64,
    pub stats: Stats,
}

impl Node {
    pub fn new(name: &str, api: &str, role: &str) -> Self {
        Node {
            name: name.to_string(),
            api: api.to_string(),
            role: role.to_string(),
            ..Default::default()
        }
    }

    /// Take capacity totals from a freshly fetched snapshot.
    pub fn apply_stats(&mut self, stats: Stats) {
        self.memory = stats.mem_total_kb;
        self.disk = stats.disk_total;
        self.stats = stats;
    }

    pub fn available_disk(&self) -> u64 {
        self.disk.saturating_sub(self.disk_allocated)
    }

    /// Record one more task placed here.
    pub fn allocate(&mut self, memory_kb: u64, disk: u64) {
        self.memory_allocated += memory_kb;
        self.disk_allocated += disk;
        self.task_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_stats_sets_totals() {
        let mut node = Node::new("localhost:5556", "http://localhost:5556", "worker");
        node.apply_stats(Stats {
            mem_total_kb: 2048,
            disk_total: 500,
            ..Default::default()
        });
        node.allocate(512, 200);

        assert_eq!(node.memory, 2048);
        assert_eq!(node.available_disk(), 300);
        assert_eq!(node.task_count, 1);
    }

    #[test]
    fn over_allocated_disk_saturates() {
        let mut node = Node::new("w", "http://w", "worker");
        node.disk = 10;
        node.disk_allocated = 20;
        assert_eq!(node.available_disk(), 0);
    }
}
