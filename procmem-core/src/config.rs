//! Process configuration.
//!
//! Layered the way a CLI config loader usually is (file, then environment
//! overrides, then built-in defaults) even though there's no CLI wrapper
//! here — the core still needs a single entry point for its tunable
//! knobs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::*;
use crate::error::{Error, Result};

/// HIL (human-in-the-loop) policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HilConfig {
    pub enabled: bool,
}

impl Default for HilConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// When the AIL (agent-in-the-loop) decision point fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AilDecisionPoint {
    PerLayer,
    OnError,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AilConfig {
    pub decision_points: AilDecisionPoint,
}

impl Default for AilConfig {
    fn default() -> Self {
        Self { decision_points: AilDecisionPoint::OnError }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcMemConfig {
    pub embedding_dim: usize,
    pub max_concurrency: usize,
    pub hil: HilConfig,
    pub ail: AilConfig,
    pub cache_max_entries: usize,
    pub cache_default_ttl_secs: i64,
    pub thompson_default_threshold: f64,
    pub tracer_buffer_size: usize,
    pub tracer_flush_interval_secs: u64,
    pub trace_retention_days: i64,
    pub community_recompute_threshold: f64,
    pub bge_weight: f64,
    /// Tunable knob for the `isParallel` timestamp-overlap tolerance; see
    /// the spec's open question in DESIGN NOTES.
    pub parallel_overlap_tolerance_secs: i64,
}

impl Default for ProcMemConfig {
    fn default() -> Self {
        Self {
            embedding_dim: EMBEDDING_DIM,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            hil: HilConfig::default(),
            ail: AilConfig::default(),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_default_ttl_secs: 3600,
            thompson_default_threshold: DEFAULT_THRESHOLD,
            tracer_buffer_size: TRACER_BUFFER_SIZE,
            tracer_flush_interval_secs: TRACER_FLUSH_INTERVAL_SECS,
            trace_retention_days: TRACE_RETENTION_DAYS,
            community_recompute_threshold: COMMUNITY_RECOMPUTE_THRESHOLD,
            bge_weight: DEFAULT_BGE_WEIGHT,
            parallel_overlap_tolerance_secs: DEFAULT_PARALLEL_OVERLAP_TOLERANCE_SECS,
        }
    }
}

impl ProcMemConfig {
    /// Load from a TOML file, falling back to defaults for any field the
    /// file omits.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Validation(format!("invalid config: {e}")))
    }

    /// Apply `PROCMEM_*` environment overrides on top of an existing config.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("PROCMEM_MAX_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.max_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("PROCMEM_HIL_ENABLED") {
            self.hil.enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = ProcMemConfig::default();
        assert_eq!(cfg.embedding_dim, EMBEDDING_DIM);
        assert_eq!(cfg.max_concurrency, 10);
    }

    #[test]
    fn env_override_applies() {
        // SAFETY-equivalent: test env var mutation is a known, accepted
        // pattern in this codebase's test environment.
        unsafe {
            std::env::set_var("PROCMEM_MAX_CONCURRENCY", "42");
        }
        let cfg = ProcMemConfig::default().with_env_overrides();
        assert_eq!(cfg.max_concurrency, 42);
        unsafe {
            std::env::remove_var("PROCMEM_MAX_CONCURRENCY");
        }
    }
}
