//! The `GraphStore`: single source of truth for nodes, edges and
//! hyperedges.

mod mutation;
mod snapshot;
mod store;

pub use mutation::{MutationBatch, MutationOp};
pub use snapshot::GraphSnapshot;
pub use store::GraphStore;

use serde::{Deserialize, Serialize};

/// Kind of a graph node. Tools and capabilities share one id space but are
/// never interchangeable (enforced by `addNode`'s `DuplicateKind` check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Tool,
    Capability,
}

/// A node in the hypergraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub embedding: Option<crate::types::Embedding>,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}
