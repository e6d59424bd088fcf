use tracing::debug;

use super::epvm::Epvm;
use super::round_robin::RoundRobin;
use super::types::{Scheduler, SchedulerError, SchedulerKind, SchedulerResult, Scores};
use crate::client::WorkerClient;
use crate::config::ManagerConfig;
use crate::node::Node;
use crate::tasks::Task;

impl Scheduler {
    pub fn new(kind: SchedulerKind, config: &ManagerConfig) -> Self {
        match kind {
            SchedulerKind::Roundrobin => Scheduler::RoundRobin(RoundRobin::new()),
            SchedulerKind::Epvm => Scheduler::Epvm(Epvm::new(
                config.max_jobs_per_node,
                config.cpu_sample_interval,
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scheduler::RoundRobin(_) => "roundrobin",
            Scheduler::Epvm(_) => "epvm",
        }
    }

    pub fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        match self {
            Scheduler::RoundRobin(rr) => rr.select_candidate_nodes(nodes),
            Scheduler::Epvm(epvm) => epvm.select_candidate_nodes(task, nodes),
        }
    }

    pub async fn score(
        &self,
        task: &Task,
        candidates: &[Node],
        client: &dyn WorkerClient,
    ) -> Scores {
        match self {
            Scheduler::RoundRobin(rr) => rr.score(candidates),
            Scheduler::Epvm(epvm) => epvm.score(task, candidates, client).await,
        }
    }

    pub fn pick(&self, scores: &Scores, candidates: &[Node]) -> Option<Node> {
        pick(scores, candidates)
    }

    /// Run the full pipeline for one task.
    pub async fn select_node(
        &self,
        task: &Task,
        nodes: &[Node],
        client: &dyn WorkerClient,
    ) -> SchedulerResult<Node> {
        let candidates = self.select_candidate_nodes(task, nodes);
        if candidates.is_empty() {
            return Err(SchedulerError::NoCandidates(task.id));
        }

        let scores = self.score(task, &candidates, client).await;
        debug!(task_id = %task.id, scheduler = self.name(), ?scores, "scored candidates");
        self.pick(&scores, &candidates)
            .ok_or(SchedulerError::NoScores(task.id))
    }
}

/// Lowest-cost scored candidate. Equal costs go to the smaller node name;
/// candidates without a score are never picked.
pub fn pick(scores: &Scores, candidates: &[Node]) -> Option<Node> {
    let mut best: Option<(&Node, f64)> = None;
    for node in candidates {
        let Some(&cost) = scores.get(&node.name) else {
            continue;
        };
        best = match best {
            Some((current, min))
                if cost > min || (cost == min && current.name <= node.name) =>
            {
                Some((current, min))
            }
            _ => Some((node, cost)),
        };
    }
    best.map(|(node, _)| node.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWorkerClient;

    fn nodes(names: &[&str]) -> Vec<Node> {
        names.iter().map(|n| Node::new(n, n, "worker")).collect()
    }

    #[test]
    fn pick_takes_minimum_cost() {
        let candidates = nodes(&["a", "b", "c"]);
        let scores = Scores::from([("a".into(), 3.0), ("b".into(), 1.0), ("c".into(), 2.0)]);
        assert_eq!(pick(&scores, &candidates).unwrap().name, "b");
    }

    #[test]
    fn pick_breaks_ties_by_name() {
        let candidates = nodes(&["c", "a", "b"]);
        let scores = Scores::from([("a".into(), 1.0), ("b".into(), 1.0), ("c".into(), 1.0)]);
        assert_eq!(pick(&scores, &candidates).unwrap().name, "a");
    }

    #[test]
    fn pick_ignores_unscored_candidates() {
        let candidates = nodes(&["a", "b"]);
        let scores = Scores::from([("b".into(), 9.0)]);
        assert_eq!(pick(&scores, &candidates).unwrap().name, "b");
        assert!(pick(&Scores::new(), &candidates).is_none());
    }

    #[tokio::test]
    async fn full_disk_yields_no_candidates() {
        let scheduler = Scheduler::new(SchedulerKind::Epvm, &ManagerConfig::default());
        let mut node = Node::new("w1", "http://w1", "worker");
        node.disk = 100;
        node.disk_allocated = 95;
        let mut task = Task::new("web", "nginx");
        task.disk = 10;

        let result = scheduler
            .select_node(&task, &[node], &FakeWorkerClient::default())
            .await;
        assert_eq!(result, Err(SchedulerError::NoCandidates(task.id)));
    }

    #[tokio::test]
    async fn unscorable_candidates_yield_no_scores() {
        let scheduler = Scheduler::new(SchedulerKind::Epvm, &ManagerConfig::default());
        let task = Task::new("web", "nginx");
        let client = FakeWorkerClient::default();
        client.set_unreachable("w1");

        let result = scheduler.select_node(&task, &nodes(&["w1"]), &client).await;
        assert_eq!(result, Err(SchedulerError::NoScores(task.id)));
    }

    #[tokio::test]
    async fn round_robin_ignores_disk() {
        let scheduler = Scheduler::new(SchedulerKind::Roundrobin, &ManagerConfig::default());
        let mut task = Task::new("web", "nginx");
        task.disk = 10;

        let picked = scheduler
            .select_node(&task, &nodes(&["w1"]), &FakeWorkerClient::default())
            .await
            .unwrap();
        assert_eq!(picked.name, "w1");
    }
}
