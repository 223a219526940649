//! SHGAT: the hybrid scoring function blending semantic, graph and
//! reliability signals into one accept/reject score.

use tracing::{instrument, warn};

use crate::constants::{
    ALPHA_MAX, ALPHA_MIN, RELIABILITY_FACTOR_MAX, RELIABILITY_FILTER_MIN_USAGE,
    RELIABILITY_FILTER_SUCCESS_RATE, STRUCTURAL_BOOST_MAX,
};
use crate::graph::GraphSnapshot;
use crate::router::DrDspRouter;
use crate::types::{cosine_similarity, Decision, ScoreParams, Signals};

/// A candidate being scored against an intent.
pub struct ScoringInput<'a> {
    pub intent_embedding: &'a [f32],
    pub context_tools: &'a [String],
    pub candidate_id: &'a str,
    pub candidate_embedding: &'a [f32],
    pub candidate_tools_used: &'a [String],
    pub candidate_success_rate: f64,
    pub candidate_usage_count: u64,
}

/// Tunable weights for one scoring call. Clamped to the ranges the spec
/// names so a caller can't silently push the scorer out of its validated
/// envelope.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub alpha: f64,
    pub structural_boost: f64,
    pub reliability_factor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { alpha: 0.65, structural_boost: 0.1, reliability_factor: 0.25 }
    }
}

impl ScoringWeights {
    fn clamped(self) -> Self {
        Self {
            alpha: self.alpha.clamp(ALPHA_MIN, ALPHA_MAX),
            structural_boost: self.structural_boost.clamp(0.0, STRUCTURAL_BOOST_MAX),
            reliability_factor: self.reliability_factor.clamp(0.0, RELIABILITY_FACTOR_MAX),
        }
    }
}

/// Result of one scoring call: the final score, the signals that produced
/// it (for tracing), and the accept/reject decision against a threshold.
pub struct ScoreOutcome {
    pub final_score: f64,
    pub signals: Signals,
    pub params: ScoreParams,
    pub decision: Decision,
}

/// Combines semantic similarity, graph structure and learned reliability
/// into one bounded score.
pub struct ShgatScorer<'a> {
    router: &'a DrDspRouter,
}

impl<'a> ShgatScorer<'a> {
    #[must_use]
    pub fn new(router: &'a DrDspRouter) -> Self {
        Self { router }
    }

    /// Score `input` against `snapshot`, deciding accept/reject against
    /// `threshold`. Numerical errors (NaN inputs, zero-norm embeddings)
    /// degrade to `final_score = 0.0` with a warning rather than raising.
    #[instrument(skip(self, snapshot, input, weights))]
    pub fn score(
        &self,
        snapshot: &GraphSnapshot,
        intent_node_hint: &str,
        input: &ScoringInput<'_>,
        weights: ScoringWeights,
        threshold: f64,
    ) -> ScoreOutcome {
        let weights = weights.clamped();

        let semantic = cosine_similarity(input.intent_embedding, input.candidate_embedding);
        if !semantic.is_finite() {
            warn!(candidate = input.candidate_id, "scorer: non-finite semantic score, degrading to 0");
            return self.degraded_outcome(threshold);
        }

        let tools_overlap = overlap_ratio(input.context_tools, input.candidate_tools_used);
        let pagerank = self.router.pagerank_of(snapshot, input.candidate_id);
        let adamic_adar = self.router.adamic_adar_of(snapshot, intent_node_hint, input.candidate_id);
        let graph_density = self.router.local_density(snapshot, input.candidate_id);
        let spectral_cluster_match =
            self.router.same_community(snapshot, intent_node_hint, input.candidate_id);
        let success_rate = input.candidate_success_rate;

        let graph_signal = (pagerank + adamic_adar.min(1.0) + graph_density).clamp(0.0, 1.0) / 1.0;

        let raw = weights.alpha * semantic
            + (1.0 - weights.alpha) * graph_signal
            + weights.structural_boost * f64::from(spectral_cluster_match)
            + weights.reliability_factor * (success_rate - 0.5);

        let final_score = if raw.is_finite() { sigmoid(raw).clamp(0.0, 1.0) } else { 0.0 };

        let signals = Signals {
            semantic,
            graph_density,
            spectral_cluster_match,
            pagerank,
            adamic_adar,
            success_rate,
            tools_overlap,
        };
        let params = ScoreParams {
            alpha: weights.alpha,
            reliability_factor: weights.reliability_factor,
            structural_boost: weights.structural_boost,
        };

        let decision = if success_rate < RELIABILITY_FILTER_SUCCESS_RATE
            && input.candidate_usage_count >= RELIABILITY_FILTER_MIN_USAGE
        {
            Decision::FilteredByReliability
        } else if final_score >= threshold {
            Decision::Accepted
        } else {
            Decision::RejectedByThreshold
        };

        ScoreOutcome { final_score, signals, params, decision }
    }

    fn degraded_outcome(&self, threshold: f64) -> ScoreOutcome {
        let _ = threshold;
        ScoreOutcome {
            final_score: 0.0,
            signals: Signals::default(),
            params: ScoreParams { alpha: 0.0, reliability_factor: 0.0, structural_boost: 0.0 },
            decision: Decision::RejectedByThreshold,
        }
    }
}

fn overlap_ratio(context_tools: &[String], candidate_tools: &[String]) -> f64 {
    if candidate_tools.is_empty() {
        return 0.0;
    }
    let overlap = context_tools.iter().filter(|t| candidate_tools.contains(t)).count();
    overlap as f64 / candidate_tools.len().max(1) as f64
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
