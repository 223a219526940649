//! Adamic-Adar co-occurrence score between two nodes.

use crate::graph::GraphSnapshot;

/// `sum_{z in Gamma(q) ^ Gamma(c)} 1 / log|Gamma(z)|`. Neighbors with
/// `|Gamma(z)| <= 1` contribute `0` (undefined `log` term), matching the
/// spec's "undefined neighbors contribute 0".
#[must_use]
pub fn adamic_adar(snapshot: &GraphSnapshot, q: &str, c: &str) -> f64 {
    let nq = snapshot.neighbors(q);
    let nc = snapshot.neighbors(c);
    nq.intersection(&nc)
        .map(|z| {
            let degree = snapshot.neighbors(z).len();
            if degree <= 1 {
                0.0
            } else {
                1.0 / (degree as f64).ln()
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, NodeKind};
    use crate::types::EdgeKind;
    use std::collections::HashMap;

    #[test]
    fn shared_high_degree_neighbor_scores_positive() {
        let store = GraphStore::new();
        for id in ["q", "c", "z1", "z2", "z3", "z4"] {
            store.add_node(id, NodeKind::Tool, None, HashMap::new()).unwrap();
        }
        store.add_edge("q", "z1", EdgeKind::Sequence, None, 0, 0.1).unwrap();
        store.add_edge("c", "z1", EdgeKind::Sequence, None, 0, 0.1).unwrap();
        store.add_edge("z1", "z2", EdgeKind::Sequence, None, 0, 0.1).unwrap();
        store.add_edge("z1", "z3", EdgeKind::Sequence, None, 0, 0.1).unwrap();
        let snap = store.snapshot();
        assert!(adamic_adar(&snap, "q", "c") > 0.0);
    }

    #[test]
    fn no_shared_neighbors_scores_zero() {
        let store = GraphStore::new();
        for id in ["q", "c"] {
            store.add_node(id, NodeKind::Tool, None, HashMap::new()).unwrap();
        }
        let snap = store.snapshot();
        assert_eq!(adamic_adar(&snap, "q", "c"), 0.0);
    }
}
