//! Layered execution: runs a [`crate::planner::Dag`] one layer
//! at a time, launching each layer's tasks concurrently up to a configured
//! cap, honoring human-in-the-loop and agent-in-the-loop suspend points,
//! per-task deadlines, and cooperative cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, Semaphore};
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{AilDecisionPoint, ProcMemConfig};
use crate::constants::MAX_REPLANS;
use crate::error::Result;
use crate::planner::Dag;
use crate::types::{ExecutionTrace, Task, TaskResult, TaskStatus};

/// Invokes a single tool. The executor is agnostic to what a tool actually
/// does (an MCP round-trip, a sandboxed subprocess, ...); that is supplied
/// by the embedding application.
#[async_trait::async_trait]
pub trait ToolAdapter: Send + Sync {
    async fn invoke(&self, task: &Task) -> Result<serde_json::Value>;
}

/// The execution state machine a [`LayeredExecutor`] run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Planning,
    ExecutingLayer,
    AwaitingDecision,
    Done,
    Failed,
    Aborted,
}

/// Why execution paused to ask for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    HumanInTheLoop,
    AgentPerLayer,
    AgentOnError,
}

/// What to do about a suspended execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AilCommand {
    Continue,
    Abort,
    ReplanDag,
}

/// Context handed to a [`DecisionHandler`] when execution suspends.
pub struct DecisionContext<'a> {
    pub reason: SuspendReason,
    pub layer_index: usize,
    pub completed: &'a [TaskResult],
}

/// Decides what happens at a suspend point. Synchronous by design: the
/// decision itself (a human's click, a policy lookup) happens outside the
/// executor's async loop and is handed in already resolved.
pub trait DecisionHandler: Send + Sync {
    fn decide(&self, ctx: DecisionContext<'_>) -> AilCommand;
}

/// Always continues; the default when neither HIL nor AIL suspension is
/// configured.
pub struct AlwaysContinue;

impl DecisionHandler for AlwaysContinue {
    fn decide(&self, _ctx: DecisionContext<'_>) -> AilCommand {
        AilCommand::Continue
    }
}

/// Produces a replacement DAG when a suspend point returns
/// [`AilCommand::ReplanDag`].
pub trait ReplanHandler: Send + Sync {
    fn replan(&self, current: &Dag, completed: &[TaskResult]) -> Dag;
}

/// A handle a caller can use to cancel a running execution from outside the
/// future driving it.
#[derive(Clone, Default)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs a [`Dag`] layer by layer.
pub struct LayeredExecutor<A: ToolAdapter> {
    adapter: Arc<A>,
    max_concurrency: usize,
    task_timeout: Duration,
    hil_enabled: bool,
    ail_decision_point: AilDecisionPoint,
}

impl<A: ToolAdapter> LayeredExecutor<A> {
    #[must_use]
    pub fn new(adapter: Arc<A>, config: &ProcMemConfig, task_timeout: Duration) -> Self {
        Self {
            adapter,
            max_concurrency: config.max_concurrency.max(1),
            task_timeout,
            hil_enabled: config.hil.enabled,
            ail_decision_point: config.ail.decision_points,
        }
    }

    /// Execute every layer of `dag` in order, suspending for a decision
    /// between layers (HIL, or AIL in `PerLayer` mode) or after a failing
    /// task (AIL in `OnError` mode). A suspend returning
    /// [`AilCommand::Abort`] transitions to [`ExecutionState::Aborted`]; one
    /// returning [`AilCommand::ReplanDag`] calls `replan` and continues,
    /// bounded by [`MAX_REPLANS`] — exceeding the bound fails the
    /// execution rather than looping forever.
    pub async fn execute(
        &self,
        mut dag: Dag,
        capability_id: Option<Uuid>,
        intent: &str,
        decisions: &dyn DecisionHandler,
        replanner: Option<&dyn ReplanHandler>,
        cancellation: &CancellationHandle,
    ) -> ExecutionTrace {
        let started_at = Instant::now();
        let trace_id = Uuid::new_v4();
        let mut completed: Vec<TaskResult> = Vec::new();
        let mut layer_timestamps = Vec::new();
        let mut replans = 0u32;
        let mut state = ExecutionState::Planning;
        let mut overall_success = true;

        // `layer_index` persists across a replan: the layers before it have
        // already executed and must not be re-run just because the DAG
        // grew new tasks further downstream.
        let mut layer_index = 0usize;
        loop {
            dag.assign_layers();
            let max_layer = dag.tasks.iter().filter_map(|t| t.layer_index).max();
            let Some(max_layer) = max_layer else {
                state = ExecutionState::Done;
                break;
            };
            if layer_index > max_layer {
                state = ExecutionState::Done;
                break;
            }

            if cancellation.is_cancelled() {
                state = ExecutionState::Aborted;
                break;
            }

            state = ExecutionState::ExecutingLayer;
            let layer_tasks: Vec<Task> = dag
                .tasks
                .iter()
                .filter(|t| t.layer_index == Some(layer_index))
                .cloned()
                .collect();
            layer_timestamps.push(chrono::Utc::now().timestamp_millis());

            let results = self.run_layer(&layer_tasks, cancellation).await;
            let layer_failed = results.iter().any(|r| r.status != TaskStatus::Success);
            completed.extend(results);

            if cancellation.is_cancelled() {
                state = ExecutionState::Aborted;
                break;
            }

            let suspend_reason = if self.hil_enabled {
                Some(SuspendReason::HumanInTheLoop)
            } else if layer_failed && self.ail_decision_point == AilDecisionPoint::OnError {
                Some(SuspendReason::AgentOnError)
            } else if self.ail_decision_point == AilDecisionPoint::PerLayer {
                Some(SuspendReason::AgentPerLayer)
            } else {
                None
            };

            let mut replanned = false;
            if let Some(reason) = suspend_reason {
                state = ExecutionState::AwaitingDecision;
                let command = decisions.decide(DecisionContext { reason, layer_index, completed: &completed });
                match command {
                    AilCommand::Continue => {}
                    AilCommand::Abort => {
                        state = ExecutionState::Aborted;
                        break;
                    }
                    AilCommand::ReplanDag => {
                        if replans >= MAX_REPLANS {
                            warn!("executor: replan budget exhausted, failing execution");
                            state = ExecutionState::Failed;
                            overall_success = false;
                            break;
                        }
                        let Some(replanner) = replanner else {
                            warn!("executor: replan requested with no replan handler configured");
                            state = ExecutionState::Failed;
                            overall_success = false;
                            break;
                        };
                        dag = replanner.replan(&dag, &completed);
                        replans += 1;
                        replanned = true;
                    }
                }
            }

            if layer_failed
                && !replanned
                && self.ail_decision_point != AilDecisionPoint::OnError
                && !self.hil_enabled
            {
                overall_success = false;
                state = ExecutionState::Failed;
                break;
            }

            layer_index += 1;
        }

        if state == ExecutionState::Aborted {
            overall_success = false;
        }

        ExecutionTrace {
            id: trace_id,
            capability_id,
            intent: intent.to_string(),
            task_results: completed,
            layer_timestamps,
            success: overall_success && state == ExecutionState::Done,
            total_duration_ms: started_at.elapsed().as_millis() as u64,
        }
    }

    async fn run_layer(&self, tasks: &[Task], cancellation: &CancellationHandle) -> Vec<TaskResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let adapter = self.adapter.clone();
            let task = task.clone();
            let timeout = self.task_timeout;
            let cancellation = cancellation.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                run_one_task(adapter.as_ref(), &task, timeout, &cancellation)
                    .instrument(info_span!("capability.task", task_id = %task.id, tool = %task.tool))
                    .await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(_join_err) => results.push(TaskResult {
                    task_id: "unknown".into(),
                    status: TaskStatus::Failure,
                    output: None,
                    error: Some("task panicked".into()),
                    duration_ms: 0,
                }),
            }
        }
        results
    }
}

async fn run_one_task(
    adapter: &dyn ToolAdapter,
    task: &Task,
    timeout: Duration,
    cancellation: &CancellationHandle,
) -> TaskResult {
    let started = Instant::now();
    tracing::debug!(task_id = %task.id, "capability.start");

    let outcome = tokio::select! {
        result = tokio::time::timeout(timeout, adapter.invoke(task)) => result,
        () = cancellation.notify.notified() => {
            tracing::debug!(task_id = %task.id, "capability.end");
            return TaskResult {
                task_id: task.id.clone(),
                status: TaskStatus::Cancelled,
                output: None,
                error: Some("cancelled".into()),
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::debug!(task_id = %task.id, duration_ms, "capability.end");

    match outcome {
        Ok(Ok(output)) => TaskResult {
            task_id: task.id.clone(),
            status: TaskStatus::Success,
            output: Some(output),
            error: None,
            duration_ms,
        },
        Ok(Err(e)) => TaskResult {
            task_id: task.id.clone(),
            status: TaskStatus::Failure,
            output: None,
            error: Some(e.to_string()),
            duration_ms,
        },
        Err(_elapsed) => TaskResult {
            task_id: task.id.clone(),
            status: TaskStatus::Timeout,
            output: None,
            error: Some(crate::error::Error::Timeout(timeout.as_millis() as u64).to_string()),
            duration_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct EchoAdapter {
        invocations: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ToolAdapter for EchoAdapter {
        async fn invoke(&self, task: &Task) -> Result<serde_json::Value> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "task": task.id }))
        }
    }

    struct FailingAdapter;

    #[async_trait::async_trait]
    impl ToolAdapter for FailingAdapter {
        async fn invoke(&self, _task: &Task) -> Result<serde_json::Value> {
            Err(crate::error::Error::Internal("boom".into()))
        }
    }

    struct SlowAdapter;

    #[async_trait::async_trait]
    impl ToolAdapter for SlowAdapter {
        async fn invoke(&self, _task: &Task) -> Result<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(serde_json::json!({}))
        }
    }

    fn linear_dag() -> Dag {
        let mut dag = Dag::new(vec![
            Task { id: "a".into(), tool: "echo".into(), depends_on: vec![], layer_index: None, input: None },
            Task { id: "b".into(), tool: "echo".into(), depends_on: vec!["a".into()], layer_index: None, input: None },
        ]);
        dag.assign_layers();
        dag
    }

    fn config() -> ProcMemConfig {
        ProcMemConfig::default()
    }

    #[tokio::test]
    async fn executes_all_layers_to_completion() {
        let adapter = Arc::new(EchoAdapter { invocations: AtomicUsize::new(0) });
        let executor = LayeredExecutor::new(adapter.clone(), &config(), Duration::from_secs(1));
        let trace = executor
            .execute(linear_dag(), None, "intent", &AlwaysContinue, None, &CancellationHandle::new())
            .await;
        assert!(trace.success);
        assert_eq!(trace.task_results.len(), 2);
        assert_eq!(adapter.invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn task_failure_without_ail_fails_execution() {
        let adapter = Arc::new(FailingAdapter);
        let executor = LayeredExecutor::new(adapter, &config(), Duration::from_secs(1));
        let trace = executor
            .execute(linear_dag(), None, "intent", &AlwaysContinue, None, &CancellationHandle::new())
            .await;
        assert!(!trace.success);
        assert_eq!(trace.task_results[0].status, TaskStatus::Failure);
    }

    #[tokio::test]
    async fn task_timeout_produces_timeout_status() {
        let adapter = Arc::new(SlowAdapter);
        let executor = LayeredExecutor::new(adapter, &config(), Duration::from_millis(20));
        let trace = executor
            .execute(linear_dag(), None, "intent", &AlwaysContinue, None, &CancellationHandle::new())
            .await;
        assert_eq!(trace.task_results[0].status, TaskStatus::Timeout);
    }

    #[tokio::test]
    async fn cancellation_before_start_aborts_immediately() {
        let adapter = Arc::new(EchoAdapter { invocations: AtomicUsize::new(0) });
        let executor = LayeredExecutor::new(adapter.clone(), &config(), Duration::from_secs(1));
        let cancellation = CancellationHandle::new();
        cancellation.cancel();
        let trace = executor
            .execute(linear_dag(), None, "intent", &AlwaysContinue, None, &cancellation)
            .await;
        assert!(!trace.success);
        assert!(trace.task_results.is_empty());
        assert_eq!(adapter.invocations.load(Ordering::SeqCst), 0);
    }

    struct AbortOnce;
    impl DecisionHandler for AbortOnce {
        fn decide(&self, _ctx: DecisionContext<'_>) -> AilCommand {
            AilCommand::Abort
        }
    }

    #[tokio::test]
    async fn hil_abort_stops_execution() {
        let mut cfg = config();
        cfg.hil.enabled = true;
        let adapter = Arc::new(EchoAdapter { invocations: AtomicUsize::new(0) });
        let executor = LayeredExecutor::new(adapter, &cfg, Duration::from_secs(1));
        let trace = executor
            .execute(linear_dag(), None, "intent", &AbortOnce, None, &CancellationHandle::new())
            .await;
        assert!(!trace.success);
        assert_eq!(trace.task_results.len(), 1);
    }

    struct ReplanOnce {
        used: AtomicBool,
    }
    impl DecisionHandler for ReplanOnce {
        fn decide(&self, _ctx: DecisionContext<'_>) -> AilCommand {
            if self.used.swap(true, Ordering::SeqCst) {
                AilCommand::Continue
            } else {
                AilCommand::ReplanDag
            }
        }
    }
    struct AppendTask;
    impl ReplanHandler for AppendTask {
        fn replan(&self, current: &Dag, _completed: &[TaskResult]) -> Dag {
            let mut dag = current.clone();
            dag.tasks.push(Task {
                id: "c".into(),
                tool: "echo".into(),
                depends_on: vec!["b".into()],
                layer_index: None,
                input: None,
            });
            dag
        }
    }

    #[tokio::test]
    async fn replan_extends_and_completes_dag() {
        let mut cfg = config();
        cfg.ail.decision_points = crate::config::AilDecisionPoint::PerLayer;
        let adapter = Arc::new(EchoAdapter { invocations: AtomicUsize::new(0) });
        let executor = LayeredExecutor::new(adapter, &cfg, Duration::from_secs(1));
        let handler = ReplanOnce { used: AtomicBool::new(false) };
        let trace = executor
            .execute(linear_dag(), None, "intent", &handler, Some(&AppendTask), &CancellationHandle::new())
            .await;
        assert!(trace.task_results.iter().any(|r| r.task_id == "c"));
    }
}
