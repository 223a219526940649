//! Core data model: tools, capabilities, graph nodes and edges, plus the
//! small ambient sum types the rest of the crate builds on (`Member`,
//! `EdgeKind`, `Decision`, ...).

use crate::constants::EMBEDDING_DIM;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A dense embedding vector. Always [`EMBEDDING_DIM`] long and L2-normalized
/// by construction; validated at every insertion boundary.
pub type Embedding = Vec<f32>;

/// Validate that an embedding has the fixed process-wide dimension.
pub fn validate_embedding_dim(embedding: &[f32]) -> Result<()> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(Error::Validation(format!(
            "embedding has dimension {}, expected {EMBEDDING_DIM}",
            embedding.len()
        )));
    }
    Ok(())
}

/// Cosine similarity between two embeddings of equal length. Degrades to
/// `0.0` (never raises) when either vector has zero norm, per the scoring
/// engine's numerical-error policy.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 || !dot.is_finite() {
        return 0.0;
    }
    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_nan() { 0.0 } else { score.clamp(-1.0, 1.0) }
}

/// L2-normalize a vector in place. No-op (stays all-zero) on a zero vector.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f64 = v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x = (f64::from(*x) / norm) as f32;
        }
    }
}

/// A tool backed by an external MCP server: `server:action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Stable identity, `server:action`.
    pub id: String,
    pub server: String,
    pub description: String,
    /// Opaque JSON input schema.
    pub input_schema: serde_json::Value,
    /// Embedding, refreshed in place; never mutated otherwise.
    pub embedding: Option<Embedding>,
    pub success_count: u64,
    pub usage_count: u64,
}

impl Tool {
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.usage_count as f64
        }
    }
}

/// Visibility of a capability. Not named explicitly by the distilled spec's
/// attribute list but required to give `visibility` a concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Team,
    Public,
}

/// A member of a capability's ordered list: either a tool or a child
/// capability. Expressed as a tagged sum rather than structural typing, per
/// the spec's "Runtime polymorphism" design note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Member {
    Tool { id: String },
    Capability { id: Uuid },
}

/// A reusable, learned sequence of tool invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: Uuid,
    /// `namespace:action`.
    pub display_name: String,
    pub namespace: String,
    pub action: String,
    pub intent_embedding: Option<Embedding>,
    pub members: Vec<Member>,
    pub hierarchy_level: u32,
    pub success_count: u64,
    pub usage_count: u64,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub code_snippet: Option<String>,
    pub parents: Vec<Uuid>,
    pub anonymized: bool,
}

impl Capability {
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.usage_count as f64
        }
    }

    /// Fully qualified name: `org.project.namespace.action.hash`.
    #[must_use]
    pub fn fqdn(&self, org: &str, project: &str) -> String {
        let hash = short_hash(&format!("{}:{}:{}", self.namespace, self.action, self.id));
        format!("{org}.{project}.{}.{}.{hash}", self.namespace, self.action)
    }

    /// Tool ids directly or transitively referenced by this capability's
    /// immediate member list (capability members are returned as ids, not
    /// resolved recursively — resolution is a [`crate::graph::GraphStore`]
    /// concern).
    #[must_use]
    pub fn tool_ids(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter_map(|m| match m {
                Member::Tool { id } => Some(id.as_str()),
                Member::Capability { .. } => None,
            })
            .collect()
    }
}

fn short_hash(input: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:x}", hasher.finish())[..8].to_string()
}

/// Directed-edge kind. `Sequence`/`Dependency` participate in the DAG
/// invariant; the others are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Sequence,
    Dependency,
    Contains,
    Uses,
    CapabilityLink,
}

impl EdgeKind {
    /// Whether this kind participates in the DAG acyclicity invariant.
    #[must_use]
    pub fn is_dag_kind(self) -> bool {
        matches!(self, EdgeKind::Sequence | EdgeKind::Dependency)
    }
}

/// A learned, reinforced directed edge between two graph nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectedEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub observed_count: u64,
    pub confidence_score: f64,
    /// Unix millis of the last reinforcement, used for exponential decay.
    pub time_decay_stamp: i64,
    /// Derived from timestamp overlap between the two endpoints' most recent
    /// observations; see the spec's open question on overlap tolerance.
    pub is_parallel: bool,
}

/// An n-ary edge grouping a set of tool nodes under one capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hyperedge {
    pub id: String,
    pub sources: Vec<String>,
    pub targets: Vec<String>,
    /// `1 - successRate`.
    pub weight: f64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Hyperedge {
    #[must_use]
    pub fn id_for(capability_id: Uuid) -> String {
        format!("cap__{capability_id}")
    }
}

/// Which mode produced a [`TraceRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmMode {
    ActiveSearch,
    PassiveSuggestion,
}

/// Whether a scored candidate is a tool or a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Tool,
    Capability,
}

/// Outcome of a single scoring decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accepted,
    RejectedByThreshold,
    FilteredByReliability,
}

/// Signals computed by the SHGAT scorer for one candidate, carried in a
/// [`TraceRecord`] for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Signals {
    pub semantic: f64,
    pub graph_density: f64,
    pub spectral_cluster_match: bool,
    pub pagerank: f64,
    pub adamic_adar: f64,
    pub success_rate: f64,
    pub tools_overlap: f64,
}

/// Scoring parameters used for one decision, carried for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreParams {
    pub alpha: f64,
    pub reliability_factor: f64,
    pub structural_boost: f64,
}

/// An outcome applied asynchronously to a previously-logged trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceOutcome {
    pub success: bool,
    pub detail: Option<String>,
}

/// A single scoring decision, buffered by the tracer then flushed to the
/// trace store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: Uuid,
    pub timestamp: i64,
    pub algorithm_mode: AlgorithmMode,
    pub target_type: TargetType,
    pub target_id: String,
    pub intent: String,
    pub signals: Signals,
    pub params: ScoreParams,
    pub final_score: f64,
    pub threshold_used: f64,
    pub decision: Decision,
    pub outcome: Option<TraceOutcome>,
}

/// A per-tool `Beta(alpha, beta)` posterior for Thompson sampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThompsonArm {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for ThompsonArm {
    fn default() -> Self {
        Self { alpha: 1.0, beta: 1.0 }
    }
}

/// Immutable snapshot of a tool-version set, used to key and invalidate
/// [`crate::cache::ResultCache`] entries.
pub type ToolVersions = HashMap<String, String>;

/// A cached execution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub result: serde_json::Value,
    pub tool_versions: ToolVersions,
    pub timestamp: i64,
    pub expires_at: i64,
    pub hit_count: u64,
}

/// A task within a DAG plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub tool: String,
    pub depends_on: Vec<String>,
    pub layer_index: Option<usize>,
    pub input: Option<serde_json::Value>,
}

/// Result of executing a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failure,
    Timeout,
    Cancelled,
}

/// A complete record of a layered execution, feeding PER training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub id: Uuid,
    pub capability_id: Option<Uuid>,
    pub intent: String,
    pub task_results: Vec<TaskResult>,
    pub layer_timestamps: Vec<i64>,
    pub success: bool,
    pub total_duration_ms: u64,
}
