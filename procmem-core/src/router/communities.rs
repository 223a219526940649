//! Spectral community detection over the normalized Laplacian of the
//! directed-sequence projection, recomputed lazily.

use std::collections::HashMap;

use crate::constants::COMMUNITY_RECOMPUTE_THRESHOLD;
use crate::graph::GraphSnapshot;

/// Cached community assignment, invalidated once node or edge count drifts
/// by more than [`COMMUNITY_RECOMPUTE_THRESHOLD`] since the last compute.
#[derive(Debug, Default)]
pub struct CommunityCache {
    assignment: HashMap<String, usize>,
    last_node_count: usize,
    last_edge_count: usize,
}

impl CommunityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn drifted(&self, node_count: usize, edge_count: usize) -> bool {
        if self.last_node_count == 0 {
            return true;
        }
        let node_drift =
            (node_count as f64 - self.last_node_count as f64).abs() / self.last_node_count as f64;
        let edge_drift = if self.last_edge_count == 0 {
            if edge_count == 0 { 0.0 } else { 1.0 }
        } else {
            (edge_count as f64 - self.last_edge_count as f64).abs() / self.last_edge_count as f64
        };
        node_drift >= COMMUNITY_RECOMPUTE_THRESHOLD || edge_drift >= COMMUNITY_RECOMPUTE_THRESHOLD
    }

    /// Community id of `node`, recomputing first if the graph has drifted
    /// enough since the last compute.
    pub fn community_of(&mut self, snapshot: &GraphSnapshot, node: &str) -> Option<usize> {
        if self.drifted(snapshot.nodes().len(), snapshot.edges().len()) {
            self.recompute(snapshot);
        }
        self.assignment.get(node).copied()
    }

    fn recompute(&mut self, snapshot: &GraphSnapshot) {
        self.assignment = spectral_clusters(snapshot, default_k(snapshot.nodes().len()));
        self.last_node_count = snapshot.nodes().len();
        self.last_edge_count = snapshot.edges().len();
    }
}

fn default_k(n: usize) -> usize {
    ((n as f64).sqrt().round() as usize).clamp(1, 8)
}

/// Partition nodes into `k` communities via power-iterated eigenvectors of
/// the symmetric-normalized adjacency (`D^-1/2 A D^-1/2`, whose top
/// eigenvectors correspond to the Laplacian's smallest, i.e. the ones that
/// carry cluster structure) followed by a small deterministic k-means pass.
#[must_use]
pub fn spectral_clusters(snapshot: &GraphSnapshot, k: usize) -> HashMap<String, usize> {
    let mut ids: Vec<&str> = snapshot.nodes().keys().map(String::as_str).collect();
    ids.sort_unstable();
    let n = ids.len();
    if n == 0 {
        return HashMap::new();
    }
    if n <= k {
        return ids.iter().enumerate().map(|(i, &id)| (id.to_string(), i)).collect();
    }
    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut adjacency = vec![vec![0.0_f64; n]; n];
    for e in snapshot.edges() {
        if let (Some(&i), Some(&j)) = (index.get(e.from.as_str()), index.get(e.to.as_str())) {
            let w = e.confidence_score.max(0.0001);
            adjacency[i][j] += w;
            adjacency[j][i] += w;
        }
    }

    let degree: Vec<f64> = adjacency.iter().map(|row| row.iter().sum::<f64>().max(1e-9)).collect();
    let mut normalized = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            normalized[i][j] = adjacency[i][j] / (degree[i].sqrt() * degree[j].sqrt());
        }
    }

    let embeddings = top_eigenvectors(&normalized, k.min(n), 50);
    // Transpose into one row per node.
    let mut rows = vec![vec![0.0_f64; embeddings.len()]; n];
    for (dim, vector) in embeddings.iter().enumerate() {
        for (node_idx, value) in vector.iter().enumerate() {
            rows[node_idx][dim] = *value;
        }
    }

    let labels = kmeans(&rows, k.min(n), 25);
    ids.iter().enumerate().map(|(i, &id)| (id.to_string(), labels[i])).collect()
}

fn top_eigenvectors(matrix: &[Vec<f64>], k: usize, iterations: usize) -> Vec<Vec<f64>> {
    let n = matrix.len();
    let mut working = matrix.to_vec();
    let mut vectors = Vec::with_capacity(k);
    for seed in 0..k {
        let mut v: Vec<f64> =
            (0..n).map(|i| ((i + seed * 3 + 1) % 7) as f64 / 7.0 + 0.01).collect();
        normalize(&mut v);
        for _ in 0..iterations {
            let mut next = vec![0.0; n];
            for i in 0..n {
                for j in 0..n {
                    next[i] += working[i][j] * v[j];
                }
            }
            if !normalize(&mut next) {
                break;
            }
            v = next;
        }
        let eigenvalue = {
            let mut mv = vec![0.0; n];
            for i in 0..n {
                for j in 0..n {
                    mv[i] += working[i][j] * v[j];
                }
            }
            mv.iter().zip(v.iter()).map(|(a, b)| a * b).sum::<f64>()
        };
        for i in 0..n {
            for j in 0..n {
                working[i][j] -= eigenvalue * v[i] * v[j];
            }
        }
        vectors.push(v);
    }
    vectors
}

fn normalize(v: &mut [f64]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm <= 1e-12 {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

/// Deterministic k-means: centroids seeded from the first `k` rows (sorted
/// node order), so the same snapshot always yields the same partition.
fn kmeans(rows: &[Vec<f64>], k: usize, iterations: usize) -> Vec<usize> {
    let n = rows.len();
    if n == 0 {
        return Vec::new();
    }
    let dim = rows[0].len();
    let mut centroids: Vec<Vec<f64>> = (0..k).map(|i| rows[i * n / k].clone()).collect();
    let mut labels = vec![0usize; n];

    for _ in 0..iterations {
        for (i, row) in rows.iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::MAX;
            for (c, centroid) in centroids.iter().enumerate() {
                let dist: f64 =
                    row.iter().zip(centroid.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            labels[i] = best;
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, row) in rows.iter().enumerate() {
            let c = labels[i];
            counts[c] += 1;
            for d in 0..dim {
                sums[c][d] += row[d];
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                for d in 0..dim {
                    centroids[c][d] = sums[c][d] / counts[c] as f64;
                }
            }
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, NodeKind};
    use crate::types::EdgeKind;
    use std::collections::HashMap as Map;

    #[test]
    fn small_graph_gets_one_community_per_node() {
        let store = GraphStore::new();
        for id in ["a", "b"] {
            store.add_node(id, NodeKind::Tool, None, Map::new()).unwrap();
        }
        let clusters = spectral_clusters(&store.snapshot(), 4);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn cache_recomputes_after_drift() {
        let store = GraphStore::new();
        for id in ["a", "b", "c"] {
            store.add_node(id, NodeKind::Tool, None, Map::new()).unwrap();
        }
        let mut cache = CommunityCache::new();
        assert!(cache.community_of(&store.snapshot(), "a").is_some());
        store.add_node("d", NodeKind::Tool, None, Map::new()).unwrap();
        assert!(cache.community_of(&store.snapshot(), "d").is_some());
    }

    #[test]
    fn larger_graph_partitions_into_k_communities() {
        let store = GraphStore::new();
        for id in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            store.add_node(id, NodeKind::Tool, None, Map::new()).unwrap();
        }
        store.add_edge("a", "b", EdgeKind::Sequence, Some(5.0), 0, 0.1).unwrap();
        store.add_edge("c", "d", EdgeKind::Sequence, Some(5.0), 0, 0.1).unwrap();
        let clusters = spectral_clusters(&store.snapshot(), 3);
        assert_eq!(clusters.len(), 8);
    }
}
