use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::Scores;
use crate::node::Node;

/// Rotates through nodes in order, ignoring load.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node is a candidate.
    pub fn select_candidate_nodes(&self, nodes: &[Node]) -> Vec<Node> {
        nodes.to_vec()
    }

    /// The node whose turn it is scores 0.1, every other node 1.0.
    pub fn score(&self, candidates: &[Node]) -> Scores {
        if candidates.is_empty() {
            return Scores::new();
        }
        let turn = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.name.clone(), if idx == turn { 0.1 } else { 1.0 }))
            .collect()
    }
}
