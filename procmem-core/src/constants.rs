//! Process-wide constants and tunable defaults.
//!
//! All of these are overridable through [`crate::config::ProcMemConfig`] at
//! process start. The embedding dimension in particular is fixed for the
//! lifetime of a process and validated on every node insertion.

/// Fixed dense-vector dimension for every embedding the core produces or
/// accepts.
pub const EMBEDDING_DIM: usize = 1024;

/// PageRank damping factor.
pub const PAGERANK_DAMPING: f64 = 0.85;

/// PageRank convergence threshold (L1 delta between iterations).
pub const PAGERANK_EPSILON: f64 = 1e-6;

/// PageRank iteration cap.
pub const PAGERANK_MAX_ITERATIONS: usize = 100;

/// Relative change in node/edge count that forces spectral cluster recompute.
pub const COMMUNITY_RECOMPUTE_THRESHOLD: f64 = 0.05;

/// Default hybrid-embedding semantic weight (`bgeWeight`).
pub const DEFAULT_BGE_WEIGHT: f64 = 0.3;

/// Default number of random walks per node for the Node2Vec-style embedder.
pub const DEFAULT_WALKS_PER_NODE: usize = 40;

/// Default walk length.
pub const DEFAULT_WALK_LENGTH: usize = 15;

/// Default co-occurrence sliding window.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Default graph-structural embedding dimension before zero-padding to
/// [`EMBEDDING_DIM`].
pub const DEFAULT_STRUCTURAL_DIM: usize = 64;

/// Default SHGAT semantic/graph blend weight (`alpha`).
pub const DEFAULT_ALPHA: f64 = 0.65;
/// Lower bound enforced on `alpha`.
pub const ALPHA_MIN: f64 = 0.4;
/// Upper bound enforced on `alpha`.
pub const ALPHA_MAX: f64 = 0.9;

/// Upper bound on `structuralBoost`.
pub const STRUCTURAL_BOOST_MAX: f64 = 0.2;
/// Upper bound on `reliabilityFactor`.
pub const RELIABILITY_FACTOR_MAX: f64 = 0.5;

/// `successRate` floor and `usageCount` floor for `filtered_by_reliability`.
pub const RELIABILITY_FILTER_SUCCESS_RATE: f64 = 0.2;
pub const RELIABILITY_FILTER_MIN_USAGE: u64 = 5;

/// Global fallback acceptance threshold for unseen tools.
pub const DEFAULT_THRESHOLD: f64 = 0.6;
/// Thompson-sampled threshold floor.
pub const THRESHOLD_FLOOR: f64 = 0.4;

/// PER sampling exponent (`beta`).
pub const DEFAULT_PER_BETA: f64 = 0.6;
/// PER priority smoothing constant added to `|TD-error|`.
pub const PER_PRIORITY_EPSILON: f64 = 1e-3;
/// Batch size for a single "live" PER training epoch.
pub const PER_LIVE_BATCH_SIZE: usize = 16;
/// Maximum number of capabilities fetched for one PER training run.
pub const PER_MAX_CAPABILITIES: usize = 500;

/// Tracer in-memory buffer capacity before a forced flush.
pub const TRACER_BUFFER_SIZE: usize = 100;
/// Tracer periodic flush interval.
pub const TRACER_FLUSH_INTERVAL_SECS: u64 = 5;
/// Trace retention window.
pub const TRACE_RETENTION_DAYS: i64 = 7;

/// Default maximum in-flight tasks per executor layer.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
/// Maximum number of agent-initiated replans per workflow.
pub const MAX_REPLANS: u32 = 3;

/// Default result-cache capacity.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Default overlap tolerance (seconds) used to derive `isParallel` on
/// sequence edges from timestamp overlap. Flagged as a tunable in the spec's
/// open questions rather than a hard-coded constant; this is only the
/// process default.
pub const DEFAULT_PARALLEL_OVERLAP_TOLERANCE_SECS: i64 = 2;
