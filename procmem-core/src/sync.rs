//! Graph synchronization. Keeps the hypergraph coherent with
//! capability-lifecycle events raised elsewhere (typically by
//! `procmem-mcp`'s request handlers, which own the event bus this consumes
//! from — this crate only defines what happens when an event arrives).
//!
//! Same idempotent start/stop gate and same "apply the minimal update, log
//! and move on if the source is gone" posture as a storage reconciliation
//! loop, adapted from record-store reconciliation to hypergraph/registry
//! reconciliation.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::graph::{GraphStore, NodeKind};
use crate::registry::EntityRegistry;
use crate::types::Hyperedge;

/// A capability-lifecycle event the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityEvent {
    ZoneCreated(Uuid),
    ZoneUpdated(Uuid),
    Merged { source_id: Uuid, target_id: Uuid },
}

/// Subscribes to `capability.zone.created`, `capability.zone.updated` and
/// `capability.merged`, applying the minimal incremental graph update each
/// implies. Holds no state of its own beyond a start/stop gate: while
/// stopped, events are accepted but ignored, matching a paused subscriber
/// rather than a torn-down one.
pub struct GraphSyncController<'a> {
    graph: &'a GraphStore,
    registry: &'a EntityRegistry,
    running: AtomicBool,
}

impl<'a> GraphSyncController<'a> {
    #[must_use]
    pub fn new(graph: &'a GraphStore, registry: &'a EntityRegistry) -> Self {
        Self { graph, registry, running: AtomicBool::new(false) }
    }

    /// Idempotent: starting an already-started controller is a no-op.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            debug!("graph sync: started");
        }
    }

    /// Idempotent: stopping an already-stopped controller is a no-op.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("graph sync: stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Handle one event. While stopped, this is a no-op — matching a
    /// paused subscription rather than dropping the event as an error.
    pub fn handle_event(&self, event: CapabilityEvent) {
        if !self.is_running() {
            debug!("graph sync: stopped, dropping event");
            return;
        }
        let result = match event {
            CapabilityEvent::ZoneCreated(id) | CapabilityEvent::ZoneUpdated(id) => self.sync_zone(id),
            CapabilityEvent::Merged { source_id, target_id } => self.sync_merge(source_id, target_id),
        };
        if let Err(e) = result {
            warn!(error = %e, "graph sync: failed applying event");
        }
    }

    /// Add/refresh the capability's node and rewrite its hyperedge from
    /// current members. A capability absent from the registry (a null
    /// collaborator — already deleted, or never really existed) is a no-op,
    /// not an error.
    fn sync_zone(&self, capability_id: Uuid) -> Result<()> {
        let Some(capability) = self.registry.capability(capability_id) else {
            debug!(%capability_id, "graph sync: null collaborator, skipping");
            return Ok(());
        };
        let node_id = capability.id.to_string();
        self.graph.add_node(&node_id, NodeKind::Capability, capability.intent_embedding.clone(), Default::default())?;

        let tool_ids: Vec<String> = capability.tool_ids().into_iter().map(str::to_string).collect();
        if tool_ids.is_empty() {
            return Ok(());
        }
        let hyperedge_id = Hyperedge::id_for(capability.id);
        self.graph.add_hyperedge(
            &hyperedge_id,
            tool_ids.clone(),
            tool_ids,
            1.0 - capability.success_rate(),
            Default::default(),
        )?;
        Ok(())
    }

    /// Rewrite the merge target's hyperedge from its (now-merged) member
    /// set and delete the source's hyperedge. If the target is itself a
    /// null collaborator the source's hyperedge is still dropped, since a
    /// merge always retires the source regardless of what became of the
    /// target.
    fn sync_merge(&self, source_id: Uuid, target_id: Uuid) -> Result<()> {
        let target_result = self.sync_zone(target_id);
        self.graph.remove_hyperedge(&Hyperedge::id_for(source_id));
        target_result
    }
}
