//! Hybrid capability embedding: BGE-style semantic signal blended with a
//! graph-structural embedding learned from random walks over the
//! capability/tool bipartite graph (Node2Vec).

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Embedder;
use crate::constants::{
    DEFAULT_BGE_WEIGHT, DEFAULT_STRUCTURAL_DIM, DEFAULT_WALKS_PER_NODE, DEFAULT_WALK_LENGTH,
    DEFAULT_WINDOW_SIZE, EMBEDDING_DIM,
};
use crate::error::Result;
use crate::graph::GraphSnapshot;
use crate::types::{l2_normalize, Embedding};

/// Tunable knobs for [`HybridEmbedder`], defaulting to the values named in
/// the spec.
#[derive(Debug, Clone)]
pub struct HybridEmbedderConfig {
    pub bge_weight: f64,
    pub walks_per_node: usize,
    pub walk_length: usize,
    pub window_size: usize,
    pub structural_dim: usize,
}

impl Default for HybridEmbedderConfig {
    fn default() -> Self {
        Self {
            bge_weight: DEFAULT_BGE_WEIGHT,
            walks_per_node: DEFAULT_WALKS_PER_NODE,
            walk_length: DEFAULT_WALK_LENGTH,
            window_size: DEFAULT_WINDOW_SIZE,
            structural_dim: DEFAULT_STRUCTURAL_DIM,
        }
    }
}

/// Produces a combined semantic + graph-structural embedding for a
/// capability.
pub struct HybridEmbedder<E: Embedder> {
    config: HybridEmbedderConfig,
    semantic: E,
}

impl<E: Embedder> HybridEmbedder<E> {
    pub fn new(config: HybridEmbedderConfig, semantic: E) -> Self {
        Self { config, semantic }
    }

    /// Build the bipartite capability<->tool adjacency from the snapshot's
    /// hyperedges: every tool referenced by `cap__{id}`'s sources/targets is
    /// a neighbor of the capability node.
    fn bipartite_neighbors(
        &self,
        snapshot: &GraphSnapshot,
        capability_node: &str,
    ) -> HashMap<String, Vec<String>> {
        let mut adj: HashMap<String, Vec<String>> = HashMap::new();
        for (hid, he) in snapshot.hyperedges() {
            let cap_node = hid.clone();
            let mut tools: Vec<String> = he.sources.clone();
            tools.extend(he.targets.clone());
            tools.retain(|t| t != "intent");
            for t in &tools {
                adj.entry(cap_node.clone()).or_default().push(t.clone());
                adj.entry(t.clone()).or_default().push(cap_node.clone());
            }
        }
        adj.entry(capability_node.to_string()).or_default();
        adj
    }

    /// Random walks of `walk_length` starting at `start`, repeated
    /// `walks_per_node` times, deterministically seeded from `start` so the
    /// embedding is reproducible for a fixed graph snapshot.
    fn random_walks(
        &self,
        adj: &HashMap<String, Vec<String>>,
        start: &str,
    ) -> Vec<Vec<String>> {
        let mut seed_hasher = std::collections::hash_map::DefaultHasher::new();
        use std::hash::{Hash, Hasher};
        start.hash(&mut seed_hasher);
        let mut rng = StdRng::seed_from_u64(seed_hasher.finish());

        let mut walks = Vec::with_capacity(self.config.walks_per_node);
        for _ in 0..self.config.walks_per_node {
            let mut walk = vec![start.to_string()];
            let mut current = start.to_string();
            for _ in 1..self.config.walk_length {
                let Some(neighbors) = adj.get(&current) else { break };
                if neighbors.is_empty() {
                    break;
                }
                let next = &neighbors[rng.random_range(0..neighbors.len())];
                walk.push(next.clone());
                current = next.clone();
            }
            walks.push(walk);
        }
        walks
    }

    /// Co-occurrence counts within the sliding window, restricted to
    /// distinct node pairs.
    fn cooccurrence_counts(&self, walks: &[Vec<String>]) -> HashMap<(String, String), f64> {
        let mut counts: HashMap<(String, String), f64> = HashMap::new();
        for walk in walks {
            for i in 0..walk.len() {
                for j in (i + 1)..(i + self.config.window_size).min(walk.len()) {
                    if walk[i] == walk[j] {
                        continue;
                    }
                    let key = if walk[i] <= walk[j] {
                        (walk[i].clone(), walk[j].clone())
                    } else {
                        (walk[j].clone(), walk[i].clone())
                    };
                    *counts.entry(key).or_insert(0.0) += 1.0;
                }
            }
        }
        counts
    }

    /// Positive-PMI matrix over the node set touched by the walks,
    /// power-iterated to `structural_dim` via a simplified symmetric
    /// eigendecomposition (successive deflation, Gram-Schmidt
    /// orthogonalized), then the row for `target` is returned.
    fn structural_embedding(
        &self,
        adj: &HashMap<String, Vec<String>>,
        target: &str,
    ) -> Vec<f64> {
        let walks = self.random_walks(adj, target);
        let counts = self.cooccurrence_counts(&walks);

        let mut nodes: Vec<String> = walks.iter().flatten().cloned().collect();
        nodes.sort();
        nodes.dedup();
        if nodes.is_empty() || !nodes.contains(&target.to_string()) {
            return vec![0.0; self.config.structural_dim];
        }
        let index: HashMap<&str, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        let n = nodes.len();

        let total: f64 = counts.values().sum::<f64>().max(1.0);
        let mut row_sum = vec![0.0_f64; n];
        for ((a, b), c) in &counts {
            let ia = index[a.as_str()];
            let ib = index[b.as_str()];
            row_sum[ia] += c;
            row_sum[ib] += c;
        }

        let mut matrix = vec![vec![0.0_f64; n]; n];
        for ((a, b), c) in &counts {
            let ia = index[a.as_str()];
            let ib = index[b.as_str()];
            let pmi = ((c * total) / (row_sum[ia].max(1.0) * row_sum[ib].max(1.0))).ln();
            let ppmi = pmi.max(0.0);
            matrix[ia][ib] = ppmi;
            matrix[ib][ia] = ppmi;
        }

        let k = self.config.structural_dim.min(n);
        let eigenvectors = power_iteration_top_k(&matrix, k, 50);

        let target_idx = index[target];
        let mut row: Vec<f64> = eigenvectors.iter().map(|v| v[target_idx]).collect();
        row.resize(self.config.structural_dim, 0.0);
        row
    }

    /// Embed a capability: `intent_text` feeds the semantic half;
    /// `capability_node` (`cap__{id}`) must match a hyperedge id already
    /// present in `snapshot` for the structural half to carry signal
    /// (falls back to zeros otherwise, which still yields a valid,
    /// semantic-only embedding).
    pub fn embed_capability(
        &self,
        capability_node: &str,
        intent_text: &str,
        snapshot: &GraphSnapshot,
    ) -> Result<Embedding> {
        let semantic = self.semantic.embed(intent_text)?;
        let adj = self.bipartite_neighbors(snapshot, capability_node);
        let structural = self.structural_embedding(&adj, capability_node);

        let mut structural_padded = vec![0.0_f32; EMBEDDING_DIM];
        for (i, v) in structural.iter().enumerate().take(EMBEDDING_DIM) {
            structural_padded[i] = *v as f32;
        }
        l2_normalize(&mut structural_padded);

        let bge = self.config.bge_weight.clamp(0.0, 1.0);
        let mut combined = vec![0.0_f32; EMBEDDING_DIM];
        for i in 0..EMBEDDING_DIM {
            combined[i] =
                (bge as f32) * semantic.get(i).copied().unwrap_or(0.0)
                    + (1.0 - bge as f32) * structural_padded[i];
        }
        l2_normalize(&mut combined);
        Ok(combined)
    }
}

/// Top-`k` eigenvectors of a symmetric matrix via power iteration with
/// deflation. Returns `k` vectors of length `matrix.len()`. A minimal,
/// dependency-free stand-in for a full SVD solver, adequate for the small
/// local neighborhoods this embedder walks.
fn power_iteration_top_k(matrix: &[Vec<f64>], k: usize, iterations: usize) -> Vec<Vec<f64>> {
    let n = matrix.len();
    let mut working = matrix.to_vec();
    let mut vectors = Vec::with_capacity(k);

    for seed in 0..k {
        if n == 0 {
            vectors.push(Vec::new());
            continue;
        }
        let mut v: Vec<f64> = (0..n)
            .map(|i| ((i * 7 + seed * 13 + 1) % 11) as f64 / 11.0 + 0.01)
            .collect();
        normalize_vec(&mut v);

        for _ in 0..iterations {
            let mut next = vec![0.0_f64; n];
            for i in 0..n {
                for j in 0..n {
                    next[i] += working[i][j] * v[j];
                }
            }
            if normalize_vec(&mut next) {
                v = next;
            } else {
                break;
            }
        }

        let eigenvalue: f64 = {
            let mut mv = vec![0.0_f64; n];
            for i in 0..n {
                for j in 0..n {
                    mv[i] += working[i][j] * v[j];
                }
            }
            dot(&mv, &v)
        };

        // Deflate: working -= eigenvalue * v v^T, so the next iteration
        // converges toward the next-largest eigenvector.
        for i in 0..n {
            for j in 0..n {
                working[i][j] -= eigenvalue * v[i] * v[j];
            }
        }

        vectors.push(v);
    }

    vectors
}

fn normalize_vec(v: &mut [f64]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm <= 1e-12 {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
