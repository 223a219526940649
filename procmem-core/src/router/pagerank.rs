//! Weighted PageRank over the directed-sequence projection of the graph.

use std::collections::HashMap;

use crate::constants::{PAGERANK_DAMPING, PAGERANK_EPSILON, PAGERANK_MAX_ITERATIONS};
use crate::graph::GraphSnapshot;

/// Run PageRank to convergence (L1 delta < epsilon) or the iteration cap,
/// whichever comes first. Edge weight is `confidence_score`; dangling nodes
/// (no out-edges) redistribute their mass uniformly.
#[must_use]
pub fn pagerank(snapshot: &GraphSnapshot) -> HashMap<String, f64> {
    let ids: Vec<&str> = snapshot.nodes().keys().map(String::as_str).collect();
    let n = ids.len();
    if n == 0 {
        return HashMap::new();
    }

    let mut out_weight: HashMap<&str, f64> = HashMap::new();
    for e in snapshot.edges() {
        if !e.kind.is_dag_kind() {
            continue;
        }
        *out_weight.entry(e.from.as_str()).or_insert(0.0) += e.confidence_score.max(0.0);
    }

    let mut rank: HashMap<&str, f64> = ids.iter().map(|&id| (id, 1.0 / n as f64)).collect();

    for _ in 0..PAGERANK_MAX_ITERATIONS {
        let dangling_mass: f64 = ids
            .iter()
            .filter(|id| !out_weight.contains_key(*id))
            .map(|id| rank[id])
            .sum();

        let mut next: HashMap<&str, f64> = ids
            .iter()
            .map(|&id| (id, (1.0 - PAGERANK_DAMPING) / n as f64 + PAGERANK_DAMPING * dangling_mass / n as f64))
            .collect();

        for e in snapshot.edges() {
            if !e.kind.is_dag_kind() {
                continue;
            }
            let total_out = out_weight.get(e.from.as_str()).copied().unwrap_or(0.0);
            if total_out <= 0.0 {
                continue;
            }
            let share = e.confidence_score.max(0.0) / total_out;
            *next.get_mut(e.to.as_str()).unwrap() += PAGERANK_DAMPING * rank[e.from.as_str()] * share;
        }

        let delta: f64 = ids.iter().map(|id| (next[id] - rank[id]).abs()).sum();
        rank = next;
        if delta < PAGERANK_EPSILON {
            break;
        }
    }

    rank.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, NodeKind};
    use crate::types::EdgeKind;
    use std::collections::HashMap as Map;

    #[test]
    fn ranks_sum_close_to_one() {
        let store = GraphStore::new();
        for id in ["a", "b", "c"] {
            store.add_node(id, NodeKind::Tool, None, Map::new()).unwrap();
        }
        store.add_edge("a", "b", EdgeKind::Sequence, Some(1.0), 0, 0.1).unwrap();
        store.add_edge("b", "c", EdgeKind::Sequence, Some(1.0), 0, 0.1).unwrap();
        let snap = store.snapshot();
        let ranks = pagerank(&snap);
        let sum: f64 = ranks.values().sum();
        assert!((sum - 1.0).abs() < 0.05);
    }

    #[test]
    fn empty_graph_yields_empty_ranks() {
        let store = GraphStore::new();
        let ranks = pagerank(&store.snapshot());
        assert!(ranks.is_empty());
    }
}
