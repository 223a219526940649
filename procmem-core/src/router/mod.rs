//! DR-DSP: dynamic-rank, dynamic-subgraph projection router. Maintains
//! PageRank, spectral communities, and Adamic-Adar co-occurrence over the
//! hypergraph.

mod adamic_adar;
mod communities;
mod pagerank;

pub use adamic_adar::adamic_adar;
pub use communities::{spectral_clusters, CommunityCache};
pub use pagerank::pagerank;

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::graph::GraphSnapshot;
use crate::types::EdgeKind;

/// Mutation notification used to invalidate only the caches whose inputs
/// changed, rather than recomputing everything on every graph write.
#[derive(Debug, Clone)]
pub enum GraphUpdate {
    EdgeAdd { from: String, to: String, kind: EdgeKind },
    EdgeUpdate { from: String, to: String, kind: EdgeKind },
    NodeAdd { id: String },
}

struct Cached {
    pagerank: Option<HashMap<String, f64>>,
}

/// Maintains cached PageRank and community assignments over a
/// [`GraphSnapshot`], invalidating only what an incoming [`GraphUpdate`]
/// could have affected.
pub struct DrDspRouter {
    cached: RwLock<Cached>,
    communities: RwLock<CommunityCache>,
}

impl Default for DrDspRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DrDspRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cached: RwLock::new(Cached { pagerank: None }),
            communities: RwLock::new(CommunityCache::new()),
        }
    }

    /// Invalidate caches touched by `update`. Edge mutations invalidate
    /// PageRank (global, since any edge weight can shift the whole rank
    /// vector); node/edge mutations both leave community detection to its
    /// own drift-based lazy recompute.
    pub fn apply_update(&self, update: &GraphUpdate) {
        match update {
            GraphUpdate::EdgeAdd { .. } | GraphUpdate::EdgeUpdate { .. } => {
                self.cached.write().unwrap().pagerank = None;
                debug!("drdsp: pagerank cache invalidated by edge update");
            }
            GraphUpdate::NodeAdd { .. } => {
                self.cached.write().unwrap().pagerank = None;
            }
        }
    }

    /// PageRank score for `node`, computing (and caching) if necessary.
    pub fn pagerank_of(&self, snapshot: &GraphSnapshot, node: &str) -> f64 {
        {
            let cached = self.cached.read().unwrap();
            if let Some(ranks) = &cached.pagerank {
                if let Some(v) = ranks.get(node) {
                    return *v;
                }
            }
        }
        let ranks = pagerank(snapshot);
        let v = ranks.get(node).copied().unwrap_or(0.0);
        self.cached.write().unwrap().pagerank = Some(ranks);
        v
    }

    /// Whether `a` and `b` fall in the same spectral community.
    pub fn same_community(&self, snapshot: &GraphSnapshot, a: &str, b: &str) -> bool {
        let mut communities = self.communities.write().unwrap();
        let ca = communities.community_of(snapshot, a);
        let cb = communities.community_of(snapshot, b);
        matches!((ca, cb), (Some(x), Some(y)) if x == y)
    }

    /// Adamic-Adar co-occurrence between `a` and `b`.
    pub fn adamic_adar_of(&self, snapshot: &GraphSnapshot, a: &str, b: &str) -> f64 {
        adamic_adar(snapshot, a, b)
    }

    /// Local graph density around `node`: `edges / nodes^2` projected to the
    /// node's immediate neighborhood.
    pub fn local_density(&self, snapshot: &GraphSnapshot, node: &str) -> f64 {
        let neighbors = snapshot.neighbors(node);
        let local_nodes = neighbors.len() + 1;
        if local_nodes <= 1 {
            return 0.0;
        }
        let local_edges = snapshot
            .edges()
            .iter()
            .filter(|e| {
                (e.from == node || neighbors.contains(&e.from))
                    && (e.to == node || neighbors.contains(&e.to))
            })
            .count();
        local_edges as f64 / (local_nodes as f64 * local_nodes as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, NodeKind};
    use std::collections::HashMap as Map;

    #[test]
    fn apply_update_invalidates_pagerank_cache() {
        let store = GraphStore::new();
        for id in ["a", "b"] {
            store.add_node(id, NodeKind::Tool, None, Map::new()).unwrap();
        }
        let router = DrDspRouter::new();
        let snap1 = store.snapshot();
        let _ = router.pagerank_of(&snap1, "a");
        store.add_edge("a", "b", EdgeKind::Sequence, Some(1.0), 0, 0.1).unwrap();
        router.apply_update(&GraphUpdate::EdgeAdd {
            from: "a".into(),
            to: "b".into(),
            kind: EdgeKind::Sequence,
        });
        let snap2 = store.snapshot();
        let b_rank = router.pagerank_of(&snap2, "b");
        assert!(b_rank > 0.0);
    }
}
