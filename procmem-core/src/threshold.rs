//! Adaptive, per-tool acceptance threshold via Thompson sampling over a
//! `Beta(alpha, beta)` posterior.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::rngs::ThreadRng;
use rand_distr::{Beta, Distribution};

use crate::constants::{DEFAULT_THRESHOLD, THRESHOLD_FLOOR};
use crate::types::ThompsonArm;

/// Single-writer table of per-tool Beta posteriors.
pub struct ThresholdManager {
    arms: RwLock<HashMap<String, ThompsonArm>>,
}

impl Default for ThresholdManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ThresholdManager {
    #[must_use]
    pub fn new() -> Self {
        Self { arms: RwLock::new(HashMap::new()) }
    }

    /// Record a win or loss for `tool_id`, growing `alpha` or `beta` by
    /// exactly one (invariant: `alpha + beta` grows by exactly one per
    /// outcome; both stay `>= 1`).
    pub fn record_outcome(&self, tool_id: &str, success: bool) {
        let mut arms = self.arms.write();
        let arm = arms.entry(tool_id.to_string()).or_insert_with(ThompsonArm::default);
        if success {
            arm.alpha += 1.0;
        } else {
            arm.beta += 1.0;
        }
    }

    /// Sampled acceptance threshold for `tool_id`: `max(0.4, sample from
    /// Beta(alpha, beta))`. Unseen tools use the global default threshold.
    #[must_use]
    pub fn threshold_for(&self, tool_id: &str) -> f64 {
        let arms = self.arms.read();
        let Some(arm) = arms.get(tool_id) else {
            return DEFAULT_THRESHOLD;
        };
        let sample = sample_beta(arm.alpha, arm.beta);
        sample.max(THRESHOLD_FLOOR)
    }

    #[must_use]
    pub fn arm(&self, tool_id: &str) -> ThompsonArm {
        self.arms.read().get(tool_id).copied().unwrap_or_default()
    }
}

fn sample_beta(alpha: f64, beta: f64) -> f64 {
    let dist = Beta::new(alpha.max(1e-3), beta.max(1e-3)).expect("valid beta parameters");
    let mut rng = ThreadRng::default();
    dist.sample(&mut rng)
}
