//! Algorithm Tracer: buffered telemetry sink for scoring decisions.
//! Logging in front of storage, never blocking the caller.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::constants::{TRACER_BUFFER_SIZE, TRACER_FLUSH_INTERVAL_SECS, TRACE_RETENTION_DAYS};
use crate::types::{TraceOutcome, TraceRecord};

/// Where flushed trace batches are persisted. An external collaborator
/// implements this (e.g. a durable trace table); the tracer itself only
/// buffers and batches.
#[async_trait::async_trait]
pub trait TraceSink: Send + Sync {
    async fn insert_batch(&self, records: Vec<TraceRecord>) -> crate::error::Result<()>;
    async fn patch_outcome(&self, trace_id: Uuid, outcome: TraceOutcome) -> crate::error::Result<()>;
    async fn delete_older_than(&self, cutoff_millis: i64) -> crate::error::Result<usize>;
}

/// In-memory fallback sink used when no durable store is wired up; keeps
/// everything in a `Vec` guarded by the same lock discipline a real sink
/// would use. Useful for tests and for running the core standalone.
#[derive(Default)]
pub struct InMemoryTraceSink {
    records: Mutex<Vec<TraceRecord>>,
}

#[async_trait::async_trait]
impl TraceSink for InMemoryTraceSink {
    async fn insert_batch(&self, records: Vec<TraceRecord>) -> crate::error::Result<()> {
        self.records.lock().extend(records);
        Ok(())
    }

    async fn patch_outcome(&self, trace_id: Uuid, outcome: TraceOutcome) -> crate::error::Result<()> {
        let mut records = self.records.lock();
        if let Some(r) = records.iter_mut().find(|r| r.id == trace_id) {
            r.outcome = Some(outcome);
        }
        Ok(())
    }

    async fn delete_older_than(&self, cutoff_millis: i64) -> crate::error::Result<usize> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff_millis);
        Ok(before - records.len())
    }
}

impl InMemoryTraceSink {
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }
}

/// Buffered telemetry sink. `log_trace` returns in well under 1ms: it only
/// pushes into an in-memory buffer (swapped out on flush) and never awaits
/// the sink directly from the caller's path.
pub struct AlgorithmTracer {
    buffer: Arc<Mutex<VecDeque<TraceRecord>>>,
    buffer_size: usize,
    sink: Arc<dyn TraceSink>,
    flush_tx: mpsc::UnboundedSender<()>,
}

impl AlgorithmTracer {
    /// Construct a tracer and spawn its periodic flusher. Call
    /// [`Self::stop`] (drop the returned handle) to stop the background
    /// task; the tracer itself has no `start`/`stop` pair since its
    /// lifecycle is tied to construction (unlike [`crate::sync::GraphSyncController`],
    /// which subscribes to external events).
    #[must_use]
    pub fn new(sink: Arc<dyn TraceSink>, buffer_size: usize, flush_interval: Duration) -> Self {
        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(buffer_size)));
        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel::<()>();

        let task_buffer = buffer.clone();
        let task_sink = sink.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        flush_once(&task_buffer, &task_sink).await;
                    }
                    signal = flush_rx.recv() => {
                        if signal.is_none() {
                            break;
                        }
                        flush_once(&task_buffer, &task_sink).await;
                    }
                }
            }
        });

        Self { buffer, buffer_size, sink, flush_tx }
    }

    #[must_use]
    pub fn with_defaults(sink: Arc<dyn TraceSink>) -> Self {
        Self::new(
            sink,
            TRACER_BUFFER_SIZE,
            Duration::from_secs(TRACER_FLUSH_INTERVAL_SECS),
        )
    }

    /// Record a scoring decision. Guaranteed sub-millisecond: only a lock
    /// and a push. Forces a flush signal (non-blocking, best-effort) when
    /// the buffer is full.
    pub fn log_trace(&self, record: TraceRecord) {
        let started = Instant::now();
        let mut buffer = self.buffer.lock();
        let full = buffer.len() >= self.buffer_size;
        buffer.push_back(record);
        drop(buffer);
        if full {
            let _ = self.flush_tx.send(());
        }
        debug_assert!(started.elapsed() < Duration::from_millis(1));
    }

    /// Patch an in-memory-buffered trace's outcome; falls through to the
    /// store if it already flushed.
    pub async fn update_outcome(&self, trace_id: Uuid, outcome: TraceOutcome) {
        let found = {
            let mut buffer = self.buffer.lock();
            if let Some(r) = buffer.iter_mut().find(|r| r.id == trace_id) {
                r.outcome = Some(outcome.clone());
                true
            } else {
                false
            }
        };
        if !found {
            if let Err(e) = self.sink.patch_outcome(trace_id, outcome).await {
                warn!(error = %e, "tracer: failed to patch outcome in store");
            }
        }
    }

    /// Force an immediate flush (used by tests and graceful shutdown).
    pub async fn flush(&self) {
        flush_once(&self.buffer, &self.sink).await;
    }

    /// Delete traces older than the retention window.
    pub async fn sweep_retention(&self, retention_days: i64) -> crate::error::Result<usize> {
        let cutoff = Utc::now().timestamp_millis() - retention_days.max(0) * 86_400_000;
        self.sink.delete_older_than(cutoff).await
    }

    #[must_use]
    pub fn default_retention_days() -> i64 {
        TRACE_RETENTION_DAYS
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }
}

async fn flush_once(buffer: &Arc<Mutex<VecDeque<TraceRecord>>>, sink: &Arc<dyn TraceSink>) {
    let batch: Vec<TraceRecord> = {
        let mut buffer = buffer.lock();
        buffer.drain(..).collect()
    };
    if batch.is_empty() {
        return;
    }
    let capacity_before_flush = batch.len();
    if let Err(e) = sink.insert_batch(batch.clone()).await {
        warn!(error = %e, count = capacity_before_flush, "tracer: flush failed, re-queueing");
        let mut locked = buffer.lock();
        let room = capacity_before_flush.saturating_sub(locked.len());
        for record in batch.into_iter().take(room) {
            locked.push_back(record);
        }
        return;
    }
    debug!(count = capacity_before_flush, "tracer: flushed batch");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlgorithmMode, Decision, ScoreParams, Signals, TargetType};

    fn sample_record() -> TraceRecord {
        TraceRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now().timestamp_millis(),
            algorithm_mode: AlgorithmMode::ActiveSearch,
            target_type: TargetType::Tool,
            target_id: "tool:a".into(),
            intent: "do the thing".into(),
            signals: Signals::default(),
            params: ScoreParams { alpha: 0.65, reliability_factor: 0.25, structural_boost: 0.1 },
            final_score: 0.8,
            threshold_used: 0.6,
            decision: Decision::Accepted,
            outcome: None,
        }
    }

    #[tokio::test]
    async fn log_trace_returns_fast_for_small_buffers() {
        let sink: Arc<dyn TraceSink> = Arc::new(InMemoryTraceSink::default());
        let tracer = AlgorithmTracer::new(sink, 100, Duration::from_secs(5));
        let started = Instant::now();
        for _ in 0..50 {
            tracer.log_trace(sample_record());
        }
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn flush_moves_records_to_sink() {
        let sink = Arc::new(InMemoryTraceSink::default());
        let tracer = AlgorithmTracer::new(sink.clone(), 100, Duration::from_secs(5));
        tracer.log_trace(sample_record());
        tracer.flush().await;
        assert_eq!(sink.records().len(), 1);
        assert_eq!(tracer.buffered_len(), 0);
    }

    #[tokio::test]
    async fn update_outcome_patches_buffered_record() {
        let sink: Arc<dyn TraceSink> = Arc::new(InMemoryTraceSink::default());
        let tracer = AlgorithmTracer::new(sink, 100, Duration::from_secs(5));
        let record = sample_record();
        let id = record.id;
        tracer.log_trace(record);
        tracer
            .update_outcome(id, TraceOutcome { success: true, detail: None })
            .await;
        let buffer = tracer.buffer.lock();
        assert!(buffer.iter().any(|r| r.id == id && r.outcome.is_some()));
    }

    #[tokio::test]
    async fn sweep_retention_deletes_old_traces() {
        let sink = Arc::new(InMemoryTraceSink::default());
        let mut old = sample_record();
        old.timestamp = 0;
        sink.insert_batch(vec![old]).await.unwrap();
        let tracer = AlgorithmTracer::new(sink.clone(), 100, Duration::from_secs(5));
        let removed = tracer.sweep_retention(7).await.unwrap();
        assert_eq!(removed, 1);
        assert!(sink.records().is_empty());
    }
}
