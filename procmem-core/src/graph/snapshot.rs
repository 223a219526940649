//! Immutable, cheaply-clonable view of graph state, consumed by DR-DSP,
//! SHGAT and Node2Vec as read-only input.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::Node;
use crate::types::{DirectedEdge, EdgeKind, Hyperedge};

struct SnapshotInner {
    nodes: HashMap<String, Node>,
    edges: Vec<DirectedEdge>,
    hyperedges: HashMap<String, Hyperedge>,
}

/// Reference-counted, point-in-time view of the hypergraph.
#[derive(Clone)]
pub struct GraphSnapshot {
    inner: Arc<SnapshotInner>,
}

impl GraphSnapshot {
    pub(super) fn new(
        nodes: HashMap<String, Node>,
        edges: Vec<DirectedEdge>,
        hyperedges: HashMap<String, Hyperedge>,
    ) -> Self {
        Self { inner: Arc::new(SnapshotInner { nodes, edges, hyperedges }) }
    }

    #[must_use]
    pub fn nodes(&self) -> &HashMap<String, Node> {
        &self.inner.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[DirectedEdge] {
        &self.inner.edges
    }

    #[must_use]
    pub fn hyperedges(&self) -> &HashMap<String, Hyperedge> {
        &self.inner.hyperedges
    }

    #[must_use]
    pub fn edge(&self, from: &str, to: &str, kind: EdgeKind) -> Option<&DirectedEdge> {
        self.inner
            .edges
            .iter()
            .find(|e| e.from == from && e.to == to && e.kind == kind)
    }

    /// Out-neighbors of `node` restricted to DAG-kind edges.
    #[must_use]
    pub fn successors(&self, node: &str) -> Vec<&DirectedEdge> {
        self.inner
            .edges
            .iter()
            .filter(|e| e.from == node && e.kind.is_dag_kind())
            .collect()
    }

    /// Undirected neighborhood used by Adamic-Adar: both directions, any
    /// kind, deduplicated.
    #[must_use]
    pub fn neighbors(&self, node: &str) -> HashSet<String> {
        let mut out = HashSet::new();
        for e in &self.inner.edges {
            if e.from == node {
                out.insert(e.to.clone());
            }
            if e.to == node {
                out.insert(e.from.clone());
            }
        }
        out
    }

    /// Kahn's algorithm over DAG-kind edges; `None` if a cycle exists.
    #[must_use]
    pub fn topological_sort(&self) -> Option<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for id in self.inner.nodes.keys() {
            in_degree.insert(id.as_str(), 0);
        }
        let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
        for e in &self.inner.edges {
            if !e.kind.is_dag_kind() {
                continue;
            }
            adj.entry(e.from.as_str()).or_default().push(e.to.as_str());
            *in_degree.entry(e.to.as_str()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<&str> =
            in_degree.iter().filter(|(_, &d)| d == 0).map(|(&k, _)| k).collect();
        let mut order = Vec::new();
        while let Some(n) = queue.pop_front() {
            order.push(n.to_string());
            if let Some(neighbors) = adj.get(n) {
                for &m in neighbors {
                    let d = in_degree.get_mut(m).unwrap();
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(m);
                    }
                }
            }
        }

        if order.len() == in_degree.len() {
            Some(order)
        } else {
            None
        }
    }
}
