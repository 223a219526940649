//! Prioritized experience replay training over execution traces. A
//! process-wide training lock ensures only one training run is ever in
//! flight; a caller that finds it held skips immediately rather than
//! queuing, so training lock contention returns silently instead of
//! blocking or erroring.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use tracing::debug;

use crate::constants::{DEFAULT_PER_BETA, PER_LIVE_BATCH_SIZE, PER_PRIORITY_EPSILON};
use crate::types::ExecutionTrace;

/// One (capability, outcome) pair drawn from an execution trace, used as a
/// positive or negative training example.
#[derive(Debug, Clone)]
pub struct TrainingPair {
    pub capability_id: Option<uuid::Uuid>,
    pub positive: bool,
    pub td_error: f64,
}

/// A prioritized sample: a trace id paired with its replay priority.
#[derive(Debug, Clone)]
struct PrioritizedEntry {
    trace: ExecutionTrace,
    priority: f64,
}

/// Holds a prioritized replay buffer and runs short training epochs over
/// it. There is no neural network here: "training" means recomputing
/// priorities from observed outcomes and feeding the margin-style
/// pair-construction step a consumer (e.g. the scorer's weight tuning) can
/// fold in, matching the spec's framing of PER as an online
/// priority-reweighting process rather than a full gradient-trained model.
pub struct PerTrainer {
    training_lock: AtomicBool,
    buffer: parking_lot::RwLock<Vec<PrioritizedEntry>>,
    beta: f64,
}

impl Default for PerTrainer {
    fn default() -> Self {
        Self::new()
    }
}

impl PerTrainer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            training_lock: AtomicBool::new(false),
            buffer: parking_lot::RwLock::new(Vec::new()),
            beta: DEFAULT_PER_BETA,
        }
    }

    /// Add a completed trace to the replay buffer with an initial priority
    /// of `1.0` (maximal, so it is sampled at least once before its
    /// priority is corrected).
    pub fn record_trace(&self, trace: ExecutionTrace) {
        self.buffer.write().push(PrioritizedEntry { trace, priority: 1.0 });
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.read().len()
    }

    /// Run one training epoch: acquire the process-wide lock, sample a
    /// batch by `priority^beta`, build positive/negative pairs, write back
    /// refreshed priorities. Returns `None` without doing any work if the
    /// lock is already held — this is not an error, just contention, logged
    /// at debug level only.
    pub fn try_train_epoch(&self) -> Option<Vec<TrainingPair>> {
        if self.training_lock.swap(true, Ordering::SeqCst) {
            debug!("per: training lock held, skipping this cycle");
            return None;
        }
        let result = self.train_epoch_locked();
        self.training_lock.store(false, Ordering::SeqCst);
        Some(result)
    }

    fn train_epoch_locked(&self) -> Vec<TrainingPair> {
        let batch_indices = {
            let buffer = self.buffer.read();
            sample_priority_weighted(&buffer, PER_LIVE_BATCH_SIZE, self.beta)
        };

        let mut pairs = Vec::with_capacity(batch_indices.len());
        let mut updates = Vec::with_capacity(batch_indices.len());
        {
            let buffer = self.buffer.read();
            for &idx in &batch_indices {
                let entry = &buffer[idx];
                let td_error = td_error_for(&entry.trace);
                pairs.push(TrainingPair {
                    capability_id: entry.trace.capability_id,
                    positive: entry.trace.success,
                    td_error,
                });
                updates.push((idx, td_error.abs() + PER_PRIORITY_EPSILON));
            }
        }

        let mut buffer = self.buffer.write();
        for (idx, new_priority) in updates {
            if let Some(entry) = buffer.get_mut(idx) {
                entry.priority = new_priority;
            }
        }

        pairs
    }
}

/// `TD-error` proxy for a trace without a value function: the gap between
/// observed success (1.0/0.0) and the trace's task-level success ratio,
/// which is `1.0` or `0.0` for a trace with no partial outcomes and a
/// fraction when some tasks in a capability's last run failed.
fn td_error_for(trace: &ExecutionTrace) -> f64 {
    if trace.task_results.is_empty() {
        return 0.0;
    }
    let successes = trace
        .task_results
        .iter()
        .filter(|r| r.status == crate::types::TaskStatus::Success)
        .count();
    let ratio = successes as f64 / trace.task_results.len() as f64;
    let target = if trace.success { 1.0 } else { 0.0 };
    target - ratio
}

fn sample_priority_weighted(buffer: &[PrioritizedEntry], batch_size: usize, beta: f64) -> Vec<usize> {
    if buffer.is_empty() {
        return Vec::new();
    }
    let weights: Vec<f64> = buffer.iter().map(|e| e.priority.max(1e-6).powf(beta)).collect();
    let total: f64 = weights.iter().sum();
    let mut rng = rand::rng();
    let mut indices = Vec::with_capacity(batch_size.min(buffer.len()));
    for _ in 0..batch_size.min(buffer.len()) {
        let mut pick = rng.random_range(0.0..total.max(1e-9));
        let mut chosen = weights.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if pick < *w {
                chosen = i;
                break;
            }
            pick -= w;
        }
        indices.push(chosen);
    }
    indices
}
