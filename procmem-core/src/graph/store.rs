use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use super::mutation::{MutationBatch, MutationOp};
use super::snapshot::GraphSnapshot;
use super::{Node, NodeKind};
use crate::error::{Error, Result};
use crate::types::{validate_embedding_dim, DirectedEdge, Embedding, EdgeKind, Hyperedge};

/// Internal mutable graph state, guarded by a single writer lock. Readers
/// clone an [`GraphSnapshot`] (reference-counted, cheap) rather than take
/// the lock, so external readers only ever observe immutable snapshots.
struct Inner {
    nodes: HashMap<String, Node>,
    /// Adjacency restricted to DAG-participating edge kinds, for cycle
    /// checks; keyed by source id.
    dag_adjacency: HashMap<String, HashSet<String>>,
    edges: HashMap<(String, String, EdgeKind), DirectedEdge>,
    hyperedges: HashMap<String, Hyperedge>,
}

/// Single source of truth for the hypergraph. Node and edge adds are
/// serialized through a single writer lock (the mutation queue); reads
/// take a cheap snapshot.
pub struct GraphStore {
    inner: Arc<RwLock<Inner>>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                nodes: HashMap::new(),
                dag_adjacency: HashMap::new(),
                edges: HashMap::new(),
                hyperedges: HashMap::new(),
            })),
        }
    }

    /// Idempotent node insertion. Fails with [`Error::Conflict`] if the id
    /// already exists with a different [`NodeKind`].
    #[instrument(skip(self, embedding, metadata))]
    pub fn add_node(
        &self,
        id: &str,
        kind: NodeKind,
        embedding: Option<Embedding>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        if let Some(ref e) = embedding {
            validate_embedding_dim(e)?;
        }
        let mut inner = self.inner.write();
        if let Some(existing) = inner.nodes.get(id) {
            if existing.kind != kind {
                return Err(Error::Conflict(format!(
                    "node '{id}' exists with kind {:?}, cannot re-insert as {:?}",
                    existing.kind, kind
                )));
            }
            debug!(node_id = id, "add_node: idempotent no-op");
            return Ok(());
        }
        inner.nodes.insert(
            id.to_string(),
            Node { id: id.to_string(), kind, embedding, metadata },
        );
        Ok(())
    }

    /// Refresh an existing node's embedding in place. The only mutation a
    /// node undergoes after insertion.
    pub fn refresh_embedding(&self, id: &str, embedding: Embedding) -> Result<()> {
        validate_embedding_dim(&embedding)?;
        let mut inner = self.inner.write();
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("node '{id}'")))?;
        node.embedding = Some(embedding);
        Ok(())
    }

    /// Insert or reinforce a directed edge.
    ///
    /// For `{sequence, dependency}` kinds, rejects the insertion with
    /// [`Error::Cycle`] if it would create a cycle (DFS ancestor check).
    /// Reinforcing an existing edge increments `observed_count` and applies
    /// exponential time-decay to `confidence_score` before bumping it:
    /// `confidence <- confidence * e^{-lambda*dt} + 1`.
    #[instrument(skip(self))]
    pub fn add_edge(
        &self,
        from: &str,
        to: &str,
        kind: EdgeKind,
        weight: Option<f64>,
        now_millis: i64,
        lambda: f64,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.nodes.contains_key(from) {
            return Err(Error::NotFound(format!("node '{from}'")));
        }
        if !inner.nodes.contains_key(to) {
            return Err(Error::NotFound(format!("node '{to}'")));
        }

        let key = (from.to_string(), to.to_string(), kind);
        if let Some(existing) = inner.edges.get_mut(&key) {
            let dt = (now_millis - existing.time_decay_stamp).max(0) as f64 / 1000.0;
            existing.confidence_score = existing.confidence_score * (-lambda * dt).exp() + 1.0;
            existing.observed_count += 1;
            existing.time_decay_stamp = now_millis;
            return Ok(());
        }

        if kind.is_dag_kind() {
            if from == to {
                return Err(Error::Cycle);
            }
            if path_exists(&inner.dag_adjacency, to, from) {
                return Err(Error::Cycle);
            }
            inner
                .dag_adjacency
                .entry(from.to_string())
                .or_default()
                .insert(to.to_string());
        }

        inner.edges.insert(
            key,
            DirectedEdge {
                from: from.to_string(),
                to: to.to_string(),
                kind,
                observed_count: 1,
                confidence_score: weight.unwrap_or(1.0),
                time_decay_stamp: now_millis,
                is_parallel: false,
            },
        );
        Ok(())
    }

    /// Idempotent on id; re-adding overwrites the weight and metadata.
    pub fn add_hyperedge(
        &self,
        id: &str,
        sources: Vec<String>,
        targets: Vec<String>,
        weight: f64,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        inner.hyperedges.insert(
            id.to_string(),
            Hyperedge { id: id.to_string(), sources, targets, weight, metadata },
        );
        Ok(())
    }

    pub fn remove_hyperedge(&self, id: &str) {
        self.inner.write().hyperedges.remove(id);
    }

    /// Cheap, reference-counted read-only view of the current graph state.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let inner = self.inner.read();
        GraphSnapshot::new(
            inner.nodes.clone(),
            inner.edges.values().cloned().collect(),
            inner.hyperedges.clone(),
        )
    }

    /// Atomically apply a batch of mutations. If any operation fails the
    /// whole batch is rolled back (validated against a scratch clone before
    /// being applied to live state).
    #[instrument(skip(self, batch))]
    pub fn mutate(&self, batch: MutationBatch, now_millis: i64, lambda: f64) -> Result<()> {
        // Validate against a snapshot clone first so a mid-batch failure
        // never leaves partial state applied.
        let trial = self.fork_for_trial();
        for op in &batch.ops {
            trial.apply_one(op, now_millis, lambda)?;
        }
        // All operations validated; replay them against live state.
        for op in &batch.ops {
            self.apply_one(op, now_millis, lambda)?;
        }
        Ok(())
    }

    fn fork_for_trial(&self) -> GraphStore {
        let inner = self.inner.read();
        GraphStore {
            inner: Arc::new(RwLock::new(Inner {
                nodes: inner.nodes.clone(),
                dag_adjacency: inner.dag_adjacency.clone(),
                edges: inner.edges.clone(),
                hyperedges: inner.hyperedges.clone(),
            })),
        }
    }

    fn apply_one(&self, op: &MutationOp, now_millis: i64, lambda: f64) -> Result<()> {
        match op {
            MutationOp::AddNode { id, kind, embedding, metadata } => {
                self.add_node(id, *kind, embedding.clone(), metadata.clone())
            }
            MutationOp::AddEdge { from, to, kind, weight } => {
                self.add_edge(from, to, *kind, *weight, now_millis, lambda)
            }
            MutationOp::AddHyperedge { id, sources, targets, weight, metadata } => {
                self.add_hyperedge(id, sources.clone(), targets.clone(), *weight, metadata.clone())
            }
        }
    }

    /// Number of nodes currently tracked.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Number of directed edges currently tracked, of any [`EdgeKind`].
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.read().edges.len()
    }

    /// Whether any capability's hyperedge is missing (invariant 2 check,
    /// used by property tests and `GraphSyncController`).
    #[must_use]
    pub fn has_hyperedge(&self, id: &str) -> bool {
        self.inner.read().hyperedges.contains_key(id)
    }
}

/// DFS reachability check over the DAG-kind adjacency only, used both for
/// the cycle guard in `add_edge` and exposed for tests/property checks.
fn path_exists(adj: &HashMap<String, HashSet<String>>, start: &str, goal: &str) -> bool {
    if start == goal {
        return true;
    }
    let mut visited = HashSet::new();
    let mut stack = vec![start.to_string()];
    while let Some(node) = stack.pop() {
        if node == goal {
            return true;
        }
        if !visited.insert(node.clone()) {
            continue;
        }
        if let Some(neighbors) = adj.get(&node) {
            for n in neighbors {
                if !visited.contains(n) {
                    stack.push(n.clone());
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn store_with_tools(ids: &[&str]) -> GraphStore {
        let store = GraphStore::new();
        for id in ids {
            store.add_node(id, NodeKind::Tool, None, HashMap::new()).unwrap();
        }
        store
    }

    #[test]
    fn add_node_idempotent() {
        let store = store_with_tools(&["a"]);
        assert!(store.add_node("a", NodeKind::Tool, None, HashMap::new()).is_ok());
    }

    #[test]
    fn add_node_duplicate_kind_conflict() {
        let store = store_with_tools(&["a"]);
        let err = store
            .add_node("a", NodeKind::Capability, None, HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn add_edge_rejects_self_loop_cycle() {
        let store = store_with_tools(&["a"]);
        let err = store.add_edge("a", "a", EdgeKind::Sequence, None, 0, 0.0).unwrap_err();
        assert!(matches!(err, Error::Cycle));
    }

    #[test]
    fn add_edge_rejects_cycle_via_back_edge() {
        let store = store_with_tools(&["a", "b", "c"]);
        store.add_edge("a", "b", EdgeKind::Sequence, None, 0, 0.0).unwrap();
        store.add_edge("b", "c", EdgeKind::Sequence, None, 0, 0.0).unwrap();
        let err = store.add_edge("c", "a", EdgeKind::Sequence, None, 0, 0.0).unwrap_err();
        assert!(matches!(err, Error::Cycle));
    }

    #[test]
    fn add_edge_reinforces_existing() {
        let store = store_with_tools(&["a", "b"]);
        store.add_edge("a", "b", EdgeKind::Sequence, Some(1.0), 0, 0.1).unwrap();
        store.add_edge("a", "b", EdgeKind::Sequence, Some(1.0), 1000, 0.1).unwrap();
        let snap = store.snapshot();
        let edge = snap.edge("a", "b", EdgeKind::Sequence).unwrap();
        assert_eq!(edge.observed_count, 2);
    }

    #[test]
    fn hyperedge_idempotent_overwrites_weight() {
        let store = GraphStore::new();
        store
            .add_hyperedge("cap__x", vec!["a".into()], vec!["b".into()], 0.5, HashMap::new())
            .unwrap();
        store
            .add_hyperedge("cap__x", vec!["a".into()], vec!["b".into()], 0.1, HashMap::new())
            .unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.hyperedges.get("cap__x").unwrap().weight, 0.1);
    }

    #[test]
    fn mutate_batch_rolls_back_on_failure() {
        let store = store_with_tools(&["a", "b"]);
        let batch = MutationBatch::new()
            .add_edge("a", "b", EdgeKind::Sequence, None)
            .add_edge("b", "a", EdgeKind::Sequence, None);
        let err = store.mutate(batch, 0, 0.1);
        assert!(err.is_err());
        // Neither edge should have been applied to live state.
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn for_all_sequences_admit_topological_sort() {
        let store = store_with_tools(&["a", "b", "c", "d"]);
        store.add_edge("a", "b", EdgeKind::Sequence, None, 0, 0.1).unwrap();
        store.add_edge("b", "c", EdgeKind::Sequence, None, 0, 0.1).unwrap();
        store.add_edge("a", "d", EdgeKind::Dependency, None, 0, 0.1).unwrap();
        let snap = store.snapshot();
        assert!(snap.topological_sort().is_some());
    }
}
