//! Ties `procmem-core`'s components together behind the RPC methods this
//! crate exposes.
//!
//! This is the crate's only place that owns a full set of `procmem-core`
//! collaborators at once; every method here mirrors one `tools/call`
//! method name (`cap:list`, `cap:rename`, ...) or one of the execution
//! endpoints (`execute_code`, `suggest_plan`, `apply_decision`).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;
use uuid::Uuid;

use procmem_core::cache::{fingerprint, ResultCache};
use procmem_core::config::ProcMemConfig;
use procmem_core::embeddings::{Embedder, LocalEmbedder};
use procmem_core::error::{Error, Result};
use procmem_core::executor::{AilCommand, DecisionContext, DecisionHandler};
use procmem_core::graph::GraphStore;
use procmem_core::planner::{Candidate, Dag, DagSuggester};
use procmem_core::registry::EntityRegistry;
use procmem_core::router::DrDspRouter;
use procmem_core::sync::{CapabilityEvent, GraphSyncController};
use procmem_core::threshold::ThresholdManager;
use procmem_core::tracer::AlgorithmTracer;
use procmem_core::types::Capability;

use crate::events::{Event, EventBus};

/// Runs an arbitrary code snippet against a context. The sandbox itself
/// (wasmtime, a subprocess, ...) is supplied by the embedding application;
/// this crate only owns the cache/event/capability bookkeeping around it.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, code: &str, context: &serde_json::Value) -> Result<serde_json::Value>;
}

/// A pre-supplied decision queue consumed by the executor's synchronous
/// [`DecisionHandler::decide`]. `apply_decision` pushes a command onto this
/// queue; a suspend point that finds the queue empty defaults to
/// [`AilCommand::Continue`] rather than blocking, since this server is
/// request/response and has no persistent session to rendezvous on.
#[derive(Default)]
pub struct PendingDecisions {
    queue: Mutex<VecDeque<AilCommand>>,
}

impl PendingDecisions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: AilCommand) {
        self.queue.lock().push_back(command);
    }
}

impl DecisionHandler for PendingDecisions {
    fn decide(&self, ctx: DecisionContext<'_>) -> AilCommand {
        self.queue.lock().pop_front().unwrap_or_else(|| {
            warn!(layer = ctx.layer_index, "no pre-supplied decision, defaulting to continue");
            AilCommand::Continue
        })
    }
}

/// Owns one process's worth of `procmem-core` state.
pub struct ProcMemServer<E: Embedder = LocalEmbedder> {
    pub graph: GraphStore,
    pub registry: EntityRegistry,
    pub router: DrDspRouter,
    pub embedder: E,
    pub thresholds: ThresholdManager,
    pub tracer: AlgorithmTracer,
    pub cache: ResultCache,
    pub events: EventBus,
    pub config: ProcMemConfig,
    pub decisions: PendingDecisions,
    executor: Arc<dyn CodeExecutor>,
}

impl ProcMemServer<LocalEmbedder> {
    #[must_use]
    pub fn new(config: ProcMemConfig, tracer: AlgorithmTracer, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            graph: GraphStore::new(),
            registry: EntityRegistry::new(),
            router: DrDspRouter::new(),
            embedder: LocalEmbedder::with_dim(config.embedding_dim),
            thresholds: ThresholdManager::new(),
            tracer,
            cache: ResultCache::with_capacity_and_ttl(
                config.cache_max_entries,
                std::time::Duration::from_secs(config.cache_default_ttl_secs.max(0) as u64),
            ),
            events: EventBus::default(),
            decisions: PendingDecisions::new(),
            config,
            executor,
        }
    }
}

impl<E: Embedder> ProcMemServer<E> {
    /// `cap:list` — every non-anonymized capability, optionally filtered by
    /// namespace.
    #[must_use]
    pub fn cap_list(&self, namespace: Option<&str>) -> Vec<Capability> {
        self.registry
            .all_capabilities()
            .into_iter()
            .filter(|c| !c.anonymized)
            .filter(|c| namespace.is_none_or(|ns| c.namespace == ns))
            .collect()
    }

    /// `cap:rename` — validates the naming grammar and recomputes the
    /// display name; the id is immutable.
    pub fn cap_rename(&self, id: Uuid, namespace: &str, action: &str) -> Result<Capability> {
        let renamed = self.registry.rename_capability(id, namespace, action)?;
        self.events.publish(Event::ZoneUpdated { id: id.to_string() });
        Ok(renamed)
    }

    /// `cap:lookup` — ranks known capabilities against a free-text intent
    /// by cosine similarity of intent embeddings, the same semantic
    /// leg the planner uses when ranking fresh tool candidates.
    pub fn cap_lookup(&self, intent: &str, max_results: usize) -> Result<Vec<(Capability, f64)>> {
        let intent_embedding = self.embedder.embed(intent)?;
        let mut ranked: Vec<(Capability, f64)> = self
            .registry
            .all_capabilities()
            .into_iter()
            .filter(|c| !c.anonymized)
            .filter_map(|c| {
                let embedding = c.intent_embedding.clone()?;
                let score = procmem_core::types::cosine_similarity(&intent_embedding, &embedding);
                Some((c, score))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(max_results);
        Ok(ranked)
    }

    /// `cap:whois` — full metadata for a single capability by id, including
    /// its FQDN.
    pub fn cap_whois(&self, id: Uuid, org: &str, project: &str) -> Result<(Capability, String)> {
        let capability =
            self.registry.capability(id).ok_or_else(|| Error::NotFound(format!("capability '{id}'")))?;
        let fqdn = capability.fqdn(org, project);
        Ok((capability, fqdn))
    }

    /// `cap:merge` — unions `source` into `target`, then hands the event to
    /// a transient [`GraphSyncController`] so the target's hyperedge is
    /// rewritten from its now-merged member set and the source's hyperedge
    /// is dropped. The controller is constructed fresh per call rather than
    /// held as a field: it borrows `graph`/`registry`, and those are owned
    /// by this same struct, so a stored controller would be self-referential.
    pub fn cap_merge(&self, target: Uuid, source: Uuid) -> Result<Capability> {
        let merged = self.registry.merge_capabilities(target, source)?;
        let sync = GraphSyncController::new(&self.graph, &self.registry);
        sync.start();
        sync.handle_event(CapabilityEvent::Merged { source_id: source, target_id: target });
        self.events.publish(Event::Merged { source_id: source.to_string(), target_id: target.to_string() });
        Ok(merged)
    }

    /// `suggest_plan` — candidates are every known tool, ranked against
    /// `intent` by the planner's semantic/structural blend.
    pub fn suggest_plan(&self, intent: &str, max_tasks: usize) -> Result<Dag> {
        let snapshot = self.graph.snapshot();
        let candidates: Vec<Candidate> = self
            .registry
            .all_tools()
            .into_iter()
            .filter_map(|tool| {
                let embedding = tool.embedding.clone()?;
                Some(Candidate { tool_id: tool.id.clone(), embedding, node_id: tool.id })
            })
            .collect();
        let suggester = DagSuggester::new(&self.router, &self.embedder);
        suggester.initial_plan(intent, &snapshot, &candidates, max_tasks)
    }

    /// `apply_decision` — enqueues a decision for the next suspend point an
    /// in-flight (or future) layered execution hits.
    pub fn apply_decision(&self, command: AilCommand) {
        self.decisions.push(command);
    }

    /// `execute_code` — cache-first, falling back to the injected
    /// [`CodeExecutor`]. Emits `capability.start`/`capability.end`.
    pub async fn execute_code(
        &self,
        code: &str,
        context: &serde_json::Value,
        tool_versions: HashMap<String, String>,
    ) -> Result<(serde_json::Value, bool)> {
        let key = fingerprint(code, context, &tool_versions);
        if let Some(cached) = self.cache.get(&key) {
            return Ok((cached, true));
        }

        self.events.publish(Event::CapabilityStart {
            intent: "execute_code".to_string(),
            tool_count: tool_versions.len(),
            code_length: Some(code.len()),
        });
        let started = std::time::Instant::now();
        let result = self.executor.execute(code, context).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                self.events.publish(Event::CapabilityEnd {
                    success: true,
                    execution_time_ms: elapsed_ms,
                    error: None,
                });
                self.cache.set(key, value.clone(), tool_versions, elapsed_ms);
                Ok((value, false))
            }
            Err(e) => {
                self.events.publish(Event::CapabilityEnd {
                    success: false,
                    execution_time_ms: elapsed_ms,
                    error: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procmem_core::tracer::InMemoryTraceSink;
    use procmem_core::types::{Member, Visibility};

    struct EchoExecutor;

    #[async_trait]
    impl CodeExecutor for EchoExecutor {
        async fn execute(&self, code: &str, _context: &serde_json::Value) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "echo": code }))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl CodeExecutor for FailingExecutor {
        async fn execute(&self, _code: &str, _context: &serde_json::Value) -> Result<serde_json::Value> {
            Err(Error::Internal("boom".into()))
        }
    }

    fn server_with(executor: Arc<dyn CodeExecutor>) -> ProcMemServer {
        let tracer = AlgorithmTracer::with_defaults(Arc::new(InMemoryTraceSink::default()));
        ProcMemServer::new(ProcMemConfig::default(), tracer, executor)
    }

    fn capability(id: Uuid, namespace: &str) -> Capability {
        Capability {
            id,
            display_name: format!("{namespace}:act"),
            namespace: namespace.to_string(),
            action: "act".to_string(),
            intent_embedding: Some(vec![1.0, 0.0, 0.0]),
            members: vec![Member::Tool { id: "a:b".into() }],
            hierarchy_level: 0,
            success_count: 0,
            usage_count: 0,
            tags: vec![],
            visibility: Visibility::Private,
            code_snippet: None,
            parents: vec![],
            anonymized: false,
        }
    }

    #[tokio::test]
    async fn execute_code_cache_miss_then_hit() {
        let server = server_with(Arc::new(EchoExecutor));
        let context = serde_json::json!({});
        let (result, cached) = server.execute_code("1 + 1", &context, HashMap::new()).await.unwrap();
        assert!(!cached);
        assert_eq!(result["echo"], "1 + 1");

        let (result2, cached2) = server.execute_code("1 + 1", &context, HashMap::new()).await.unwrap();
        assert!(cached2);
        assert_eq!(result2["echo"], "1 + 1");
    }

    #[tokio::test]
    async fn execute_code_propagates_executor_failure_uncached() {
        let server = server_with(Arc::new(FailingExecutor));
        let context = serde_json::json!({});
        let err = server.execute_code("boom", &context, HashMap::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Internal error: boom");
        assert_eq!(server.cache.len(), 0);
    }

    #[test]
    fn cap_list_filters_anonymized_and_namespace() {
        let server = server_with(Arc::new(EchoExecutor));
        server.registry.upsert_tool(procmem_core::types::Tool {
            id: "a:b".into(),
            server: "srv".into(),
            description: String::new(),
            input_schema: serde_json::json!({}),
            embedding: None,
            success_count: 0,
            usage_count: 0,
        });
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        server.registry.insert_capability(capability(id1, "ns1")).unwrap();
        server.registry.insert_capability(capability(id2, "ns2")).unwrap();

        assert_eq!(server.cap_list(Some("ns1")).len(), 1);
        assert_eq!(server.cap_list(None).len(), 2);
    }

    #[test]
    fn cap_rename_validates_grammar() {
        let server = server_with(Arc::new(EchoExecutor));
        server.registry.upsert_tool(procmem_core::types::Tool {
            id: "a:b".into(),
            server: "srv".into(),
            description: String::new(),
            input_schema: serde_json::json!({}),
            embedding: None,
            success_count: 0,
            usage_count: 0,
        });
        let id = Uuid::new_v4();
        server.registry.insert_capability(capability(id, "ns1")).unwrap();

        let renamed = server.cap_rename(id, "ns2", "new_action").unwrap();
        assert_eq!(renamed.namespace, "ns2");
        assert!(server.cap_rename(id, "Bad-Ns", "x").is_err());
    }

    #[test]
    fn apply_decision_then_decide_consumes_queue() {
        let server = server_with(Arc::new(EchoExecutor));
        server.apply_decision(AilCommand::Abort);
        let results = [];
        let command = server.decisions.decide(DecisionContext {
            reason: procmem_core::executor::SuspendReason::HumanInTheLoop,
            layer_index: 0,
            completed: &results,
        });
        assert_eq!(command, AilCommand::Abort);
    }

    #[test]
    fn decide_defaults_to_continue_when_queue_empty() {
        let server = server_with(Arc::new(EchoExecutor));
        let results = [];
        let command = server.decisions.decide(DecisionContext {
            reason: procmem_core::executor::SuspendReason::AgentPerLayer,
            layer_index: 0,
            completed: &results,
        });
        assert_eq!(command, AilCommand::Continue);
    }
}
