//! Persists a [`procmem_core::graph::GraphStore`]'s snapshot to redb and
//! restores one on startup.
//!
//! Same `spawn_blocking` + postcard-per-row shape as a conventional
//! redb storage module, adapted to node/edge/hyperedge rows since this
//! crate persists hypergraph topology rather than flat records.

use std::sync::Arc;

use redb::{Database, ReadableTable};
use tracing::{debug, info};

use procmem_core::graph::{GraphStore, Node};
use procmem_core::types::{DirectedEdge, Hyperedge};

use crate::error::{Error, Result};
use crate::tables::{edge_key, EDGES_TABLE, HYPEREDGES_TABLE, NODES_TABLE};

/// Persists `GraphStore` state to a redb file and can rebuild a fresh
/// `GraphStore` from it.
pub struct GraphPersistence {
    db: Arc<Database>,
}

impl GraphPersistence {
    pub async fn open(path: impl AsRef<std::path::Path> + Send + 'static) -> Result<Self> {
        let db = tokio::task::spawn_blocking(move || -> Result<Database> {
            let db = Database::create(path)?;
            let write_txn = db.begin_write()?;
            write_txn.open_table(NODES_TABLE)?;
            write_txn.open_table(EDGES_TABLE)?;
            write_txn.open_table(HYPEREDGES_TABLE)?;
            write_txn.commit()?;
            Ok(db)
        })
        .await??;
        info!("graph persistence opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Overwrite all three tables with the store's current snapshot.
    pub async fn save(&self, store: &GraphStore) -> Result<()> {
        let snapshot = store.snapshot();
        let nodes: Vec<Node> = snapshot.nodes().values().cloned().collect();
        let edges: Vec<DirectedEdge> = snapshot.edges().to_vec();
        let hyperedges: Vec<Hyperedge> = snapshot.hyperedges().values().cloned().collect();
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(NODES_TABLE)?;
                table.retain(|_, _| false)?;
                for node in &nodes {
                    let bytes = postcard::to_allocvec(node)?;
                    table.insert(node.id.as_str(), bytes.as_slice())?;
                }
            }
            {
                let mut table = write_txn.open_table(EDGES_TABLE)?;
                table.retain(|_, _| false)?;
                for edge in &edges {
                    let key = edge_key(&edge.from, &edge.to, edge.kind);
                    let bytes = postcard::to_allocvec(edge)?;
                    table.insert(key.as_str(), bytes.as_slice())?;
                }
            }
            {
                let mut table = write_txn.open_table(HYPEREDGES_TABLE)?;
                table.retain(|_, _| false)?;
                for hyperedge in &hyperedges {
                    let bytes = postcard::to_allocvec(hyperedge)?;
                    table.insert(hyperedge.id.as_str(), bytes.as_slice())?;
                }
            }
            write_txn.commit()?;
            Ok(())
        })
        .await??;
        debug!(nodes = nodes.len(), edges = edges.len(), hyperedges = hyperedges.len(), "graph snapshot saved");
        Ok(())
    }

    /// Rebuild a fresh `GraphStore` from persisted rows. Nodes are loaded
    /// before edges/hyperedges since `add_edge`/`add_hyperedge` require
    /// their endpoints to already exist.
    pub async fn load(&self) -> Result<GraphStore> {
        let db = Arc::clone(&self.db);
        let (nodes, edges, hyperedges) = tokio::task::spawn_blocking(
            move || -> Result<(Vec<Node>, Vec<DirectedEdge>, Vec<Hyperedge>)> {
                let read_txn = db.begin_read()?;

                let mut nodes = Vec::new();
                let table = read_txn.open_table(NODES_TABLE)?;
                for row in table.iter()? {
                    let (_, bytes) = row?;
                    nodes.push(postcard::from_bytes(bytes.value())?);
                }

                let mut edges = Vec::new();
                let table = read_txn.open_table(EDGES_TABLE)?;
                for row in table.iter()? {
                    let (_, bytes) = row?;
                    edges.push(postcard::from_bytes(bytes.value())?);
                }

                let mut hyperedges = Vec::new();
                let table = read_txn.open_table(HYPEREDGES_TABLE)?;
                for row in table.iter()? {
                    let (_, bytes) = row?;
                    hyperedges.push(postcard::from_bytes(bytes.value())?);
                }

                Ok((nodes, edges, hyperedges))
            },
        )
        .await??;

        let store = GraphStore::new();
        for node in nodes {
            store
                .add_node(&node.id, node.kind, node.embedding, node.metadata)
                .map_err(|e| Error::Redb(format!("restoring node '{}': {e}", node.id)))?;
        }
        for edge in &edges {
            store
                .add_edge(&edge.from, &edge.to, edge.kind, Some(edge.confidence_score), edge.time_decay_stamp, 0.0)
                .map_err(|e| Error::Redb(format!("restoring edge '{}->{}': {e}", edge.from, edge.to)))?;
        }
        for hyperedge in hyperedges {
            store
                .add_hyperedge(&hyperedge.id, hyperedge.sources, hyperedge.targets, hyperedge.weight, hyperedge.metadata)
                .map_err(|e| Error::Redb(format!("restoring hyperedge '{}': {e}", hyperedge.id)))?;
        }
        debug!("graph snapshot restored");
        Ok(store)
    }
}
