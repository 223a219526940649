//! Batch mutation operations applied atomically by [`super::GraphStore::mutate`].

use std::collections::HashMap;

use super::NodeKind;
use crate::types::{Embedding, EdgeKind};

/// One mutation in a [`MutationBatch`].
#[derive(Debug, Clone)]
pub enum MutationOp {
    AddNode {
        id: String,
        kind: NodeKind,
        embedding: Option<Embedding>,
        metadata: HashMap<String, serde_json::Value>,
    },
    AddEdge {
        from: String,
        to: String,
        kind: EdgeKind,
        weight: Option<f64>,
    },
    AddHyperedge {
        id: String,
        sources: Vec<String>,
        targets: Vec<String>,
        weight: f64,
        metadata: HashMap<String, serde_json::Value>,
    },
}

/// An ordered list of mutations applied as a single atomic unit.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    pub ops: Vec<MutationOp>,
}

impl MutationBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_node(mut self, id: impl Into<String>, kind: NodeKind) -> Self {
        self.ops.push(MutationOp::AddNode {
            id: id.into(),
            kind,
            embedding: None,
            metadata: HashMap::new(),
        });
        self
    }

    #[must_use]
    pub fn add_edge(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: EdgeKind,
        weight: Option<f64>,
    ) -> Self {
        self.ops.push(MutationOp::AddEdge { from: from.into(), to: to.into(), kind, weight });
        self
    }

    #[must_use]
    pub fn add_hyperedge(
        mut self,
        id: impl Into<String>,
        sources: Vec<String>,
        targets: Vec<String>,
        weight: f64,
    ) -> Self {
        self.ops.push(MutationOp::AddHyperedge {
            id: id.into(),
            sources,
            targets,
            weight,
            metadata: HashMap::new(),
        });
        self
    }
}
