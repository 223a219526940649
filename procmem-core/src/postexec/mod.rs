//! Post-execution learning. Runs five independent side
//! effects after a capability execution finishes. Each is recovered
//! locally: a failure in one is logged and the rest still run, since none
//! of them should ever cause an otherwise-successful execution to be
//! reported as failed.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::graph::{GraphStore, NodeKind};
use crate::per::PerTrainer;
use crate::registry::EntityRegistry;
use crate::router::{DrDspRouter, GraphUpdate};
use crate::threshold::ThresholdManager;
use crate::types::{EdgeKind, ExecutionTrace, Hyperedge, TaskStatus};

/// Wires together the collaborators the five post-execution side effects
/// touch. Held by whatever drives executions (an application-level
/// orchestrator, or `procmem-mcp`'s request handler); the core does not
/// assume a particular caller.
pub struct PostExecutionService<'a> {
    graph: &'a GraphStore,
    registry: &'a EntityRegistry,
    router: &'a DrDspRouter,
    thresholds: &'a ThresholdManager,
    per: &'a PerTrainer,
}

impl<'a> PostExecutionService<'a> {
    #[must_use]
    pub fn new(
        graph: &'a GraphStore,
        registry: &'a EntityRegistry,
        router: &'a DrDspRouter,
        thresholds: &'a ThresholdManager,
        per: &'a PerTrainer,
    ) -> Self {
        Self { graph, registry, router, thresholds, per }
    }

    /// Run all five side effects for one completed execution.
    /// `task_tools` maps each `TaskResult::task_id` back to the tool it
    /// invoked — execution traces carry only task ids, not tool names, so
    /// the caller (which drove the [`crate::executor::LayeredExecutor`] and
    /// still has the [`crate::planner::Dag`]) supplies this.
    pub fn process(&self, trace: &ExecutionTrace, task_tools: &HashMap<String, String>, now_millis: i64, lambda: f64) {
        if let Err(e) = self.update_drdsp(trace, task_tools) {
            warn!(error = %e, "postexec: updateDRDSP failed");
        }
        if let Err(e) = self.register_shgat_nodes(trace, task_tools) {
            warn!(error = %e, "postexec: registerSHGATNodes failed");
        }
        self.update_thompson_sampling(trace, task_tools);
        if let Err(e) = self.learn_from_task_results(trace, task_tools, now_millis, lambda) {
            warn!(error = %e, "postexec: learnFromTaskResults failed");
        }
        self.run_per_batch_training(trace);
    }

    /// Recompute the capability's hyperedge weight (`1 - successRate`) and
    /// upsert it, then invalidate the router's cached ranks.
    fn update_drdsp(&self, trace: &ExecutionTrace, task_tools: &HashMap<String, String>) -> Result<()> {
        let Some(capability_id) = trace.capability_id else {
            return Ok(());
        };
        self.registry.record_capability_outcome(capability_id, trace.success);
        let Some(capability) = self.registry.capability(capability_id) else {
            return Ok(());
        };

        let tool_ids: Vec<String> = trace
            .task_results
            .iter()
            .filter_map(|r| task_tools.get(&r.task_id).cloned())
            .collect();
        if tool_ids.is_empty() {
            return Ok(());
        }

        let hyperedge_id = Hyperedge::id_for(capability_id);
        self.graph.add_hyperedge(
            &hyperedge_id,
            tool_ids.clone(),
            tool_ids,
            1.0 - capability.success_rate(),
            HashMap::new(),
        )?;
        self.router.apply_update(&GraphUpdate::NodeAdd { id: hyperedge_id });
        Ok(())
    }

    /// Ensure every tool this execution touched has a graph node, picking
    /// up its latest known embedding from the registry if present.
    fn register_shgat_nodes(&self, trace: &ExecutionTrace, task_tools: &HashMap<String, String>) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for result in &trace.task_results {
            let Some(tool_id) = task_tools.get(&result.task_id) else { continue };
            if !seen.insert(tool_id.clone()) {
                continue;
            }
            let embedding = self.registry.tool(tool_id).and_then(|t| t.embedding);
            self.graph.add_node(tool_id, NodeKind::Tool, embedding, HashMap::new())?;
        }
        if let Some(capability_id) = trace.capability_id {
            if let Some(capability) = self.registry.capability(capability_id) {
                let node_id = capability.id.to_string();
                self.graph.add_node(&node_id, NodeKind::Capability, capability.intent_embedding.clone(), HashMap::new())?;
            }
        }
        Ok(())
    }

    /// Grow each invoked tool's Thompson-sampling posterior by its observed
    /// outcome.
    fn update_thompson_sampling(&self, trace: &ExecutionTrace, task_tools: &HashMap<String, String>) {
        for result in &trace.task_results {
            let Some(tool_id) = task_tools.get(&result.task_id) else { continue };
            self.registry.record_tool_outcome(tool_id, result.status == TaskStatus::Success);
            self.thresholds.record_outcome(tool_id, result.status == TaskStatus::Success);
        }
    }

    /// Reinforce a `Sequence` edge between each pair of tools observed
    /// back-to-back in this execution's task order (fan-out from the
    /// earlier tool, fan-in to the later one). Both endpoints must have
    /// succeeded; a cycle this would introduce is treated the same as any
    /// other `add_edge` cycle rejection — logged and skipped, not retried.
    fn learn_from_task_results(
        &self,
        trace: &ExecutionTrace,
        task_tools: &HashMap<String, String>,
        now_millis: i64,
        lambda: f64,
    ) -> Result<()> {
        let tools: Vec<(&str, bool)> = trace
            .task_results
            .iter()
            .filter_map(|r| {
                task_tools.get(&r.task_id).map(|t| (t.as_str(), r.status == TaskStatus::Success))
            })
            .collect();

        for window in tools.windows(2) {
            let (from, from_ok) = window[0];
            let (to, to_ok) = window[1];
            if !from_ok || !to_ok || from == to {
                continue;
            }
            self.graph.add_node(from, NodeKind::Tool, None, HashMap::new())?;
            self.graph.add_node(to, NodeKind::Tool, None, HashMap::new())?;
            if let Err(e) = self.graph.add_edge(from, to, EdgeKind::Sequence, None, now_millis, lambda) {
                warn!(from, to, error = %e, "postexec: skipping sequence edge");
                continue;
            }
            self.router.apply_update(&GraphUpdate::EdgeUpdate {
                from: from.to_string(),
                to: to.to_string(),
                kind: EdgeKind::Sequence,
            });
        }
        Ok(())
    }

    /// Hand the trace to the PER buffer and opportunistically run a
    /// training epoch. Contention on the training lock is normal and not
    /// logged above debug level (see [`PerTrainer::try_train_epoch`]).
    fn run_per_batch_training(&self, trace: &ExecutionTrace) {
        self.per.record_trace(trace.clone());
        let _ = self.per.try_train_epoch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Member, TaskResult, Visibility};

    fn harness() -> (GraphStore, EntityRegistry, DrDspRouter, ThresholdManager, PerTrainer) {
        (GraphStore::new(), EntityRegistry::new(), DrDspRouter::new(), ThresholdManager::new(), PerTrainer::new())
    }

    fn tool(id: &str) -> crate::types::Tool {
        crate::types::Tool {
            id: id.to_string(),
            server: "srv".into(),
            description: String::new(),
            input_schema: serde_json::json!({}),
            embedding: None,
            success_count: 0,
            usage_count: 0,
        }
    }

    #[test]
    fn process_runs_all_five_effects_without_panicking() {
        let (graph, registry, router, thresholds, per) = harness();
        registry.upsert_tool(tool("xml:parse"));
        registry.upsert_tool(tool("json:parse"));
        let capability_id = Uuid::new_v4();
        registry
            .insert_capability(crate::types::Capability {
                id: capability_id,
                display_name: "doc:parse".into(),
                namespace: "doc".into(),
                action: "parse".into(),
                intent_embedding: None,
                members: vec![Member::Tool { id: "xml:parse".into() }, Member::Tool { id: "json:parse".into() }],
                hierarchy_level: 0,
                success_count: 0,
                usage_count: 0,
                tags: vec![],
                visibility: Visibility::Private,
                code_snippet: None,
                parents: vec![],
                anonymized: false,
            })
            .unwrap();

        let trace = ExecutionTrace {
            id: Uuid::new_v4(),
            capability_id: Some(capability_id),
            intent: "parse the document".into(),
            task_results: vec![
                TaskResult { task_id: "t1".into(), status: TaskStatus::Success, output: None, error: None, duration_ms: 5 },
                TaskResult { task_id: "t2".into(), status: TaskStatus::Success, output: None, error: None, duration_ms: 5 },
            ],
            layer_timestamps: vec![0, 1],
            success: true,
            total_duration_ms: 10,
        };
        let task_tools: HashMap<String, String> =
            [("t1".to_string(), "xml:parse".to_string()), ("t2".to_string(), "json:parse".to_string())].into();

        let service = PostExecutionService::new(&graph, &registry, &router, &thresholds, &per);
        service.process(&trace, &task_tools, 1000, 0.1);

        assert!(graph.has_hyperedge(&Hyperedge::id_for(capability_id)));
        assert_eq!(thresholds.arm("xml:parse").alpha, 2.0);
        assert_eq!(per.buffered_len(), 1);
        assert_eq!(registry.tool("xml:parse").unwrap().usage_count, 1);
    }

    #[test]
    fn failure_in_one_effect_does_not_block_others() {
        let (graph, registry, router, thresholds, per) = harness();
        // No tools registered, no capability — update_drdsp and
        // register_shgat_nodes effectively no-op since capability_id is
        // None; the rest should still run cleanly.
        let trace = ExecutionTrace {
            id: Uuid::new_v4(),
            capability_id: None,
            intent: "do a thing".into(),
            task_results: vec![TaskResult {
                task_id: "t1".into(),
                status: TaskStatus::Failure,
                output: None,
                error: Some("boom".into()),
                duration_ms: 1,
            }],
            layer_timestamps: vec![0],
            success: false,
            total_duration_ms: 1,
        };
        let task_tools: HashMap<String, String> = [("t1".to_string(), "xml:parse".to_string())].into();
        let service = PostExecutionService::new(&graph, &registry, &router, &thresholds, &per);
        service.process(&trace, &task_tools, 0, 0.1);
        assert_eq!(per.buffered_len(), 1);
    }
}
