//! DAG planning and replanning. Turns an intent into a task DAG by
//! ranking candidate tools and chaining them along dependency edges, and
//! incrementally extends a running DAG when new requirements surface
//! mid-execution.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{instrument, warn};

use crate::constants::{ALPHA_MIN, DEFAULT_ALPHA};
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::router::DrDspRouter;
use crate::types::{cosine_similarity, Embedding, Task, TaskResult, TaskStatus};

/// A tool the planner can place into a plan. Sourced from the entity
/// registry + graph snapshot by the caller; the planner itself has no
/// storage dependency.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tool_id: String,
    pub embedding: Embedding,
    pub node_id: String,
}

/// A directed acyclic plan: an ordered bag of tasks whose `depends_on`
/// edges must admit a topological sort.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    pub tasks: Vec<Task>,
}

impl Dag {
    #[must_use]
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Kahn's algorithm over task ids. Returns `None` on a cycle, mirroring
    /// [`crate::graph::GraphSnapshot::topological_sort`].
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut indegree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        let ids: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();

        for task in &self.tasks {
            indegree.entry(task.id.as_str()).or_insert(0);
            for dep in &task.depends_on {
                if !ids.contains(dep.as_str()) {
                    continue;
                }
                *indegree.entry(task.id.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
            }
        }

        let mut queue: VecDeque<&str> =
            indegree.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();
        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(children) = dependents.get(id) {
                for &child in children {
                    let entry = indegree.get_mut(child).unwrap();
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if order.len() == self.tasks.len() {
            Some(order)
        } else {
            None
        }
    }

    /// Assign `layer_index` to every task: the length of the longest
    /// dependency chain ending at that task. Tasks sharing a layer are
    /// eligible to run concurrently under [`crate::executor::LayeredExecutor`].
    pub fn assign_layers(&mut self) {
        let order = match self.topological_order() {
            Some(order) => order,
            None => return,
        };
        let mut layer_of: HashMap<String, usize> = HashMap::new();
        let by_id: HashMap<String, &Task> = self.tasks.iter().map(|t| (t.id.clone(), t)).collect();
        for id in &order {
            let task = by_id[id];
            let layer = task
                .depends_on
                .iter()
                .filter_map(|d| layer_of.get(d))
                .max()
                .map_or(0, |l| l + 1);
            layer_of.insert(id.clone(), layer);
        }
        for task in &mut self.tasks {
            task.layer_index = layer_of.get(&task.id).copied();
        }
    }

    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }

    fn contains(&self, id: &str) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }
}

/// Weighted rank of candidates against an intent embedding: `alpha *
/// semantic + (1 - alpha) * pagerank`.
fn rank_candidates(
    router: &DrDspRouter,
    snapshot: &crate::graph::GraphSnapshot,
    intent_embedding: &[f32],
    candidates: &[Candidate],
    alpha: f64,
) -> Vec<(Candidate, f64)> {
    let alpha = alpha.max(ALPHA_MIN);
    let mut ranked: Vec<(Candidate, f64)> = candidates
        .iter()
        .map(|c| {
            let semantic = cosine_similarity(intent_embedding, &c.embedding);
            let pagerank = router.pagerank_of(snapshot, &c.node_id);
            (c.clone(), alpha * semantic + (1.0 - alpha) * pagerank)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

/// Suggests and incrementally extends task DAGs.
pub struct DagSuggester<'a, E: Embedder> {
    router: &'a DrDspRouter,
    embedder: &'a E,
    alpha: f64,
    min_score: f64,
}

impl<'a, E: Embedder> DagSuggester<'a, E> {
    #[must_use]
    pub fn new(router: &'a DrDspRouter, embedder: &'a E) -> Self {
        Self { router, embedder, alpha: DEFAULT_ALPHA, min_score: 0.1 }
    }

    #[must_use]
    pub fn with_thresholds(mut self, alpha: f64, min_score: f64) -> Self {
        self.alpha = alpha;
        self.min_score = min_score;
        self
    }

    /// Build an initial plan: embed `intent`, rank candidates, and chain the
    /// top `max_tasks` along a single sequential dependency. Returns an
    /// empty DAG if nothing clears `min_score`.
    #[instrument(skip(self, snapshot, candidates))]
    pub fn initial_plan(
        &self,
        intent: &str,
        snapshot: &crate::graph::GraphSnapshot,
        candidates: &[Candidate],
        max_tasks: usize,
    ) -> Result<Dag> {
        let intent_embedding = self.embedder.embed(intent)?;
        let ranked = rank_candidates(self.router, snapshot, &intent_embedding, candidates, self.alpha);

        let mut tasks = Vec::new();
        let mut previous: Option<String> = None;
        for (candidate, score) in ranked.into_iter().take(max_tasks) {
            if score < self.min_score {
                break;
            }
            let id = format!("task-{}", uuid::Uuid::new_v4());
            let depends_on = previous.clone().into_iter().collect();
            tasks.push(Task { id: id.clone(), tool: candidate.tool_id, depends_on, layer_index: None, input: None });
            previous = Some(id);
        }

        let mut dag = Dag::new(tasks);
        dag.assign_layers();
        Ok(dag)
    }

    /// Extend `current` with tasks serving `new_requirement`, per the spec
    /// §4.8 six-step contract:
    /// 1. embed the new requirement
    /// 2. rank candidates by `alpha*semantic + (1-alpha)*pagerank`
    /// 3. build tasks depending on the most recently completed tasks
    /// 4. merge into the current DAG
    /// 5. validate the merge admits a topological sort — reject the whole
    ///    addition and return the DAG unchanged on a cycle, never attempt a
    ///    repair
    /// 6. return the DAG unchanged if no candidate clears `min_score`
    #[instrument(skip(self, current, completed, snapshot, candidates))]
    pub fn replan(
        &self,
        current: &Dag,
        completed: &[TaskResult],
        new_requirement: &str,
        snapshot: &crate::graph::GraphSnapshot,
        candidates: &[Candidate],
    ) -> Result<Dag> {
        let intent_embedding = self.embedder.embed(new_requirement)?;
        let ranked = rank_candidates(self.router, snapshot, &intent_embedding, candidates, self.alpha);

        let Some((best, best_score)) = ranked.into_iter().next() else {
            return Ok(current.clone());
        };
        if best_score < self.min_score {
            return Ok(current.clone());
        }

        let recent_completed: Vec<String> = completed
            .iter()
            .filter(|r| r.status == TaskStatus::Success)
            .rev()
            .take(3)
            .map(|r| r.task_id.clone())
            .filter(|id| current.contains(id))
            .collect();

        let new_id = format!("task-{}", uuid::Uuid::new_v4());
        let new_task = Task {
            id: new_id,
            tool: best.tool_id,
            depends_on: recent_completed,
            layer_index: None,
            input: None,
        };

        let mut merged = current.clone();
        merged.tasks.push(new_task);

        if !merged.is_acyclic() {
            warn!("planner: replan would introduce a cycle, keeping current DAG unchanged");
            return Ok(current.clone());
        }

        merged.assign_layers();
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use crate::graph::{GraphStore, NodeKind};
    use crate::types::{TaskResult, TaskStatus};
    use std::collections::HashMap as Map;

    fn snapshot_and_router() -> (crate::graph::GraphSnapshot, DrDspRouter) {
        let store = GraphStore::new();
        store.add_node("xml:parse", NodeKind::Tool, None, Map::new()).unwrap();
        store.add_node("json:parse", NodeKind::Tool, None, Map::new()).unwrap();
        (store.snapshot(), DrDspRouter::new())
    }

    fn candidates() -> Vec<Candidate> {
        let embedder = LocalEmbedder::new();
        vec![
            Candidate {
                tool_id: "xml:parse".into(),
                embedding: embedder.embed("parse xml documents").unwrap(),
                node_id: "xml:parse".into(),
            },
            Candidate {
                tool_id: "json:parse".into(),
                embedding: embedder.embed("parse json documents").unwrap(),
                node_id: "json:parse".into(),
            },
        ]
    }

    #[test]
    fn initial_plan_chains_top_candidates() {
        let (snapshot, router) = snapshot_and_router();
        let embedder = LocalEmbedder::new();
        let suggester = DagSuggester::new(&router, &embedder).with_thresholds(0.65, 0.0);
        let dag = suggester.initial_plan("parse xml documents", &snapshot, &candidates(), 2).unwrap();
        assert!(!dag.tasks.is_empty());
        assert!(dag.is_acyclic());
    }

    #[test]
    fn xml_discovery_triggers_replan() {
        let (snapshot, router) = snapshot_and_router();
        let embedder = LocalEmbedder::new();
        let suggester = DagSuggester::new(&router, &embedder).with_thresholds(0.65, 0.05);
        let current = Dag::new(vec![Task {
            id: "task-1".into(),
            tool: "json:parse".into(),
            depends_on: vec![],
            layer_index: Some(0),
            input: None,
        }]);
        let completed = vec![TaskResult {
            task_id: "task-1".into(),
            status: TaskStatus::Success,
            output: None,
            error: None,
            duration_ms: 10,
        }];
        let replanned = suggester
            .replan(&current, &completed, "this document is actually xml", &snapshot, &candidates())
            .unwrap();
        assert_eq!(replanned.tasks.len(), 2);
        let new_task = replanned.tasks.last().unwrap();
        assert_eq!(new_task.depends_on, vec!["task-1".to_string()]);
    }

    #[test]
    fn graceful_degradation_on_irrelevant_requirement() {
        let (snapshot, router) = snapshot_and_router();
        let embedder = LocalEmbedder::new();
        let suggester = DagSuggester::new(&router, &embedder).with_thresholds(0.65, 0.999);
        let current = Dag::new(vec![Task {
            id: "task-1".into(),
            tool: "json:parse".into(),
            depends_on: vec![],
            layer_index: Some(0),
            input: None,
        }]);
        let replanned = suggester.replan(&current, &[], "completely unrelated gibberish", &snapshot, &candidates()).unwrap();
        assert_eq!(replanned.tasks.len(), current.tasks.len());
    }

    #[test]
    fn cycle_safety_rejects_and_returns_unchanged() {
        let (snapshot, router) = snapshot_and_router();
        let embedder = LocalEmbedder::new();
        let suggester = DagSuggester::new(&router, &embedder).with_thresholds(0.65, 0.0);
        let current = Dag::new(vec![
            Task { id: "task-1".into(), tool: "xml:parse".into(), depends_on: vec!["task-2".into()], layer_index: None, input: None },
            Task { id: "task-2".into(), tool: "json:parse".into(), depends_on: vec!["task-1".into()], layer_index: None, input: None },
        ]);
        assert!(!current.is_acyclic());
        let replanned = suggester.replan(&current, &[], "parse xml documents", &snapshot, &candidates()).unwrap();
        assert_eq!(replanned.tasks.len(), current.tasks.len());
    }

    #[test]
    fn topological_order_detects_cycle() {
        let dag = Dag::new(vec![
            Task { id: "a".into(), tool: "t".into(), depends_on: vec!["b".into()], layer_index: None, input: None },
            Task { id: "b".into(), tool: "t".into(), depends_on: vec!["a".into()], layer_index: None, input: None },
        ]);
        assert!(dag.topological_order().is_none());
    }

    #[test]
    fn assign_layers_groups_independent_tasks() {
        let mut dag = Dag::new(vec![
            Task { id: "a".into(), tool: "t".into(), depends_on: vec![], layer_index: None, input: None },
            Task { id: "b".into(), tool: "t".into(), depends_on: vec![], layer_index: None, input: None },
            Task { id: "c".into(), tool: "t".into(), depends_on: vec!["a".into(), "b".into()], layer_index: None, input: None },
        ]);
        dag.assign_layers();
        assert_eq!(dag.tasks[0].layer_index, Some(0));
        assert_eq!(dag.tasks[1].layer_index, Some(0));
        assert_eq!(dag.tasks[2].layer_index, Some(1));
    }
}
