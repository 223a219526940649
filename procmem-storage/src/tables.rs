//! redb table definitions. One table per entity kind, all `&str` keys to
//! `&[u8]` postcard-encoded values, in a flat per-entity table layout.

use redb::TableDefinition;

pub(crate) const NODES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
pub(crate) const EDGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");
pub(crate) const HYPEREDGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("hyperedges");
pub(crate) const TOOLS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tools");
pub(crate) const CAPABILITIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("capabilities");

/// Edges have no natural id; key on `from\x1Fto\x1Fkind` so re-saving is
/// idempotent rather than append-only.
#[must_use]
pub(crate) fn edge_key(from: &str, to: &str, kind: procmem_core::types::EdgeKind) -> String {
    format!("{from}\u{1f}{to}\u{1f}{kind:?}")
}
