//! Flow executor: wave-based parallel DAG execution with durable
//! checkpointing.
//!
//! The `DagExecutor` processes flow steps in topological wave order. Steps
//! within the same wave run concurrently via `tokio::JoinSet`. Each step is
//! checkpointed before and after execution; a step failure (after retries)
//! halts the remaining waves and marks the run failed.
//!
//! # Execution flow
//!
//! 1. Create a `FlowRun` record.
//! 2. Build an execution plan via `build_execution_plan` (waves of steps).
//! 3. For each wave, spawn all steps as parallel tasks.
//! 4. Each step: evaluate condition -> checkpoint start -> run with timeout
//!    -> retry per its `RetryConfig` -> checkpoint result.
//! 5. Accumulate outputs in `FlowContext`.
//! 6. On completion/failure/cancellation, update the run record.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use lamel_types::flow::{
    FlowDefinition, FlowRun, FlowRunStatus, StepDefinition, TriggerEvent,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::context::FlowContext;
use super::definition::FlowError;
use super::expression::FlowEvaluator;
use super::plan::build_execution_plan;
use super::retry::RetryPolicy;
use super::runner::{Extractor, FunctionInvoker, ObjectStore, StepRunner};
use crate::repository::run::RunRepository;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default flow-level timeout (30 minutes).
pub const DEFAULT_FLOW_TIMEOUT_SECS: u64 = 1800;

/// Default step-level timeout (5 minutes).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// FlowExecutor trait
// ---------------------------------------------------------------------------

/// Trait for flow execution engines.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods.
pub trait FlowExecutor: Send + Sync {
    /// Execute a flow definition for a triggering event.
    fn execute(
        &self,
        definition: &FlowDefinition,
        event: &TriggerEvent,
    ) -> impl std::future::Future<Output = Result<ExecutionResult, ExecutorError>> + Send;

    /// Cancel a running flow.
    fn cancel(
        &self,
        run_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), ExecutorError>> + Send;
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Result of a completed flow execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The flow run ID.
    pub run_id: Uuid,
    /// Final status of the run.
    pub status: FlowRunStatus,
    /// Accumulated context (step outputs).
    pub context: FlowContext,
    /// IDs of steps that completed.
    pub completed_steps: Vec<String>,
    /// Error message if the flow failed.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// DagExecutor
// ---------------------------------------------------------------------------

/// Wave-based DAG executor with durable checkpointing.
///
/// Generic over the repository and the collaborator clients so production
/// wires SQLite + HTTP implementations while tests use in-memory mocks.
pub struct DagExecutor<R, E, S, F>
where
    R: RunRepository,
{
    checkpoint: Arc<CheckpointManager<R>>,
    evaluator: FlowEvaluator,
    step_runner: Arc<StepRunner<E, S, F>>,
    /// Per-flow concurrency semaphores keyed by flow name.
    concurrency_semaphores: DashMap<String, Arc<Semaphore>>,
    /// Cancellation tokens keyed by run_id.
    cancellation_tokens: DashMap<Uuid, tokio_util::sync::CancellationToken>,
}

impl<R, E, S, F> DagExecutor<R, E, S, F>
where
    R: RunRepository + 'static,
    E: Extractor + 'static,
    S: ObjectStore + 'static,
    F: FunctionInvoker + 'static,
{
    /// Create a new DAG executor.
    pub fn new(repo: R, step_runner: StepRunner<E, S, F>) -> Self {
        Self {
            checkpoint: Arc::new(CheckpointManager::new(repo)),
            evaluator: FlowEvaluator::new(),
            step_runner: Arc::new(step_runner),
            concurrency_semaphores: DashMap::new(),
            cancellation_tokens: DashMap::new(),
        }
    }

    /// Access the underlying run repository (for querying run history).
    pub fn repository(&self) -> &R {
        self.checkpoint.repo()
    }

    /// Acquire a concurrency permit for the flow (if concurrency is limited).
    fn acquire_concurrency_permit(
        &self,
        definition: &FlowDefinition,
    ) -> Result<Option<tokio::sync::OwnedSemaphorePermit>, ExecutorError> {
        if let Some(max) = definition.concurrency {
            let semaphore = self
                .concurrency_semaphores
                .entry(definition.name.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(max as usize)))
                .clone();

            let permit = semaphore
                .try_acquire_owned()
                .map_err(|_| ExecutorError::Flow(FlowError::ConcurrencyLimitReached))?;

            Ok(Some(permit))
        } else {
            Ok(None)
        }
    }

    /// Execute the waves of a flow, mutating `ctx` as steps complete.
    async fn execute_waves(
        &self,
        definition: &FlowDefinition,
        run_id: Uuid,
        ctx: &mut FlowContext,
        cancel_token: &tokio_util::sync::CancellationToken,
    ) -> Result<FlowRunStatus, ExecutorError> {
        // Build the plan and immediately clone steps into owned vectors so
        // that spawned tasks don't borrow from `definition`.
        let waves_refs = build_execution_plan(&definition.steps).map_err(ExecutorError::Flow)?;
        let waves: Vec<Vec<StepDefinition>> = waves_refs
            .into_iter()
            .map(|wave| wave.into_iter().cloned().collect())
            .collect();

        let flow_timeout =
            Duration::from_secs(definition.timeout_secs.unwrap_or(DEFAULT_FLOW_TIMEOUT_SECS));

        let execution = async {
            for (wave_idx, wave) in waves.iter().enumerate() {
                if cancel_token.is_cancelled() {
                    return Ok(FlowRunStatus::Cancelled);
                }

                tracing::debug!(
                    run_id = %run_id,
                    wave = wave_idx,
                    steps = wave.len(),
                    "processing wave"
                );

                let mut join_set = JoinSet::new();

                for step_def in wave {
                    // Evaluate the step condition against the current context
                    if let Some(condition) = &step_def.condition {
                        let should_run = self
                            .evaluator
                            .evaluate_in_flow_context(condition, ctx)
                            .map_err(|e| {
                                ExecutorError::Flow(FlowError::ExpressionError(e.to_string()))
                            })?;

                        if !should_run {
                            tracing::info!(
                                run_id = %run_id,
                                step_id = step_def.id.as_str(),
                                condition = condition.as_str(),
                                "condition not met, skipping step"
                            );
                            self.checkpoint
                                .checkpoint_step_skipped(run_id, &step_def.id, &step_def.name)
                                .await
                                .map_err(ExecutorError::Checkpoint)?;
                            continue;
                        }
                    }

                    // Clone what the spawned task needs
                    let step = step_def.clone();
                    let checkpoint = Arc::clone(&self.checkpoint);
                    let runner = Arc::clone(&self.step_runner);
                    let step_ctx = ctx.clone();
                    let step_timeout = Duration::from_secs(
                        step.timeout_secs.unwrap_or(DEFAULT_STEP_TIMEOUT_SECS),
                    );
                    let token = cancel_token.clone();

                    join_set.spawn(async move {
                        if token.is_cancelled() {
                            return Err(ExecutorError::Cancelled);
                        }

                        let mut attempt = 1u32;
                        loop {
                            let log_id = checkpoint
                                .checkpoint_step_start(run_id, &step.id, &step.name, attempt)
                                .await
                                .map_err(ExecutorError::Checkpoint)?;

                            // Each attempt gets the full step timeout
                            let result = tokio::time::timeout(
                                step_timeout,
                                runner.run(&step, &step_ctx),
                            )
                            .await;

                            let err_msg = match result {
                                Ok(Ok(output)) => {
                                    checkpoint
                                        .checkpoint_step_complete(log_id, Some(&output))
                                        .await
                                        .map_err(ExecutorError::Checkpoint)?;
                                    return Ok((step.id.clone(), output));
                                }
                                Ok(Err(step_err)) => step_err.to_string(),
                                Err(_elapsed) => "step timed out".to_string(),
                            };

                            checkpoint
                                .checkpoint_step_failed(log_id, &err_msg)
                                .await
                                .map_err(ExecutorError::Checkpoint)?;

                            let retry = match &step.retry {
                                Some(retry) if RetryPolicy::should_retry(retry, attempt) => retry,
                                _ => {
                                    return Err(ExecutorError::StepFailed {
                                        step_id: step.id.clone(),
                                        error: err_msg,
                                    });
                                }
                            };

                            let delay = RetryPolicy::delay(retry, attempt);
                            tracing::warn!(
                                run_id = %run_id,
                                step_id = step.id.as_str(),
                                attempt,
                                delay_secs = delay.as_secs(),
                                error = err_msg.as_str(),
                                "step failed, retrying"
                            );

                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = token.cancelled() => return Err(ExecutorError::Cancelled),
                            }
                            attempt += 1;
                        }
                    });
                }

                // Collect results from the wave; the first failure aborts the
                // run (remaining tasks in the wave are dropped with the set).
                while let Some(result) = join_set.join_next().await {
                    let task_result = result.map_err(|e| {
                        ExecutorError::Flow(FlowError::ExecutionError(format!(
                            "task join error: {e}"
                        )))
                    })?;

                    let (step_id, output) = task_result?;
                    ctx.set_step_output(&step_id, output)
                        .map_err(ExecutorError::Flow)?;

                    // Snapshot the context after each completed step
                    self.checkpoint
                        .checkpoint_run_status(
                            run_id,
                            FlowRunStatus::Running,
                            None,
                            Some(&ctx.to_json()),
                        )
                        .await
                        .map_err(ExecutorError::Checkpoint)?;
                }
            }

            Ok(FlowRunStatus::Completed)
        };

        // Apply flow-level timeout
        tokio::time::timeout(flow_timeout, execution)
            .await
            .map_err(|_| ExecutorError::FlowTimeout)?
    }
}

impl<R, E, S, F> FlowExecutor for DagExecutor<R, E, S, F>
where
    R: RunRepository + 'static,
    E: Extractor + 'static,
    S: ObjectStore + 'static,
    F: FunctionInvoker + 'static,
{
    async fn execute(
        &self,
        definition: &FlowDefinition,
        event: &TriggerEvent,
    ) -> Result<ExecutionResult, ExecutorError> {
        // Acquire concurrency permit (released on drop)
        let _permit = self.acquire_concurrency_permit(definition)?;

        let run_id = Uuid::now_v7();
        let cancel_token = tokio_util::sync::CancellationToken::new();
        self.cancellation_tokens.insert(run_id, cancel_token.clone());

        let trigger_payload = event.to_payload();
        let mut ctx = FlowContext::new(definition.name.clone(), run_id, trigger_payload.clone());

        let run = FlowRun {
            id: run_id,
            flow_id: definition.id,
            flow_name: definition.name.clone(),
            status: FlowRunStatus::Running,
            trigger_type: event.kind.as_str().to_string(),
            trigger_payload: Some(trigger_payload),
            context: ctx.to_json(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            concurrency_key: Some(definition.name.clone()),
        };

        self.checkpoint
            .repo()
            .create_run(&run)
            .await
            .map_err(|e| ExecutorError::Flow(FlowError::ExecutionError(e.to_string())))?;

        tracing::info!(
            run_id = %run_id,
            flow = definition.name.as_str(),
            trigger = event.kind.as_str(),
            "starting flow execution"
        );

        let run_start = std::time::Instant::now();
        let result = self
            .execute_waves(definition, run_id, &mut ctx, &cancel_token)
            .await;

        self.cancellation_tokens.remove(&run_id);

        match result {
            Ok(status) => {
                self.checkpoint
                    .checkpoint_run_status(run_id, status, None, Some(&ctx.to_json()))
                    .await
                    .map_err(ExecutorError::Checkpoint)?;

                let completed = self
                    .checkpoint
                    .completed_steps(run_id)
                    .await
                    .unwrap_or_default();

                tracing::info!(
                    run_id = %run_id,
                    flow = definition.name.as_str(),
                    status = ?status,
                    duration_ms = run_start.elapsed().as_millis() as u64,
                    steps_completed = completed.len(),
                    "flow execution finished"
                );

                Ok(ExecutionResult {
                    run_id,
                    status,
                    context: ctx,
                    completed_steps: completed,
                    error: None,
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                let _ = self
                    .checkpoint
                    .checkpoint_run_status(
                        run_id,
                        FlowRunStatus::Failed,
                        Some(&err_msg),
                        Some(&ctx.to_json()),
                    )
                    .await;

                tracing::error!(
                    run_id = %run_id,
                    flow = definition.name.as_str(),
                    error = err_msg.as_str(),
                    "flow execution failed"
                );

                Err(e)
            }
        }
    }

    async fn cancel(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        if let Some((_, token)) = self.cancellation_tokens.remove(&run_id) {
            token.cancel();
            self.checkpoint
                .checkpoint_run_status(
                    run_id,
                    FlowRunStatus::Cancelled,
                    Some("cancelled by user"),
                    None,
                )
                .await
                .map_err(ExecutorError::Checkpoint)?;

            tracing::info!(run_id = %run_id, "flow cancelled");
            Ok(())
        } else {
            Err(ExecutorError::RunNotFound(run_id))
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutorError
// ---------------------------------------------------------------------------

/// Errors that can occur during flow execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Flow-level error (definition, DAG, expression).
    #[error("flow error: {0}")]
    Flow(#[from] FlowError),

    /// Checkpoint persistence error.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A step failed during execution (after exhausting retries).
    #[error("step '{step_id}' failed: {error}")]
    StepFailed { step_id: String, error: String },

    /// Flow exceeded its overall timeout.
    #[error("flow timed out")]
    FlowTimeout,

    /// Flow execution was cancelled.
    #[error("flow cancelled")]
    Cancelled,

    /// Run not found (for cancel).
    #[error("flow run not found: {0}")]
    RunNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
