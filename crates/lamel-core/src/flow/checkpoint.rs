//! Durable checkpoint manager for flow execution state.
//!
//! Wraps `RunRepository` to provide a higher-level API for recording
//! step-level execution checkpoints. Each step transition (pending -> running
//! -> completed/failed/skipped) is persisted before the executor moves
//! forward, so run history survives a crash.

use chrono::Utc;
use lamel_types::flow::{FlowRunStatus, StepLog, StepStatus};
use serde_json::Value;
use uuid::Uuid;

use crate::repository::run::RunRepository;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages durable execution checkpoints for flow runs.
///
/// Generic over `R: RunRepository` so it works with any storage backend
/// (SQLite, in-memory mock, etc.).
pub struct CheckpointManager<R: RunRepository> {
    repo: R,
}

impl<R: RunRepository> CheckpointManager<R> {
    /// Create a new checkpoint manager backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Step-level checkpoints
    // -----------------------------------------------------------------------

    /// Checkpoint a step as starting (Pending -> Running).
    ///
    /// Creates the step log entry and marks it as `Running`.
    pub async fn checkpoint_step_start(
        &self,
        run_id: Uuid,
        step_id: &str,
        step_name: &str,
        attempt: u32,
    ) -> Result<Uuid, CheckpointError> {
        let log_id = Uuid::now_v7();
        let log = StepLog {
            id: log_id,
            run_id,
            step_id: step_id.to_string(),
            step_name: step_name.to_string(),
            status: StepStatus::Running,
            attempt,
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        };

        self.repo
            .create_step_log(&log)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            run_id = %run_id,
            step_id,
            attempt,
            log_id = %log_id,
            "checkpointed step start"
        );

        Ok(log_id)
    }

    /// Checkpoint a step as completed successfully.
    pub async fn checkpoint_step_complete(
        &self,
        log_id: Uuid,
        output: Option<&Value>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_step_status(&log_id, StepStatus::Completed, output, None)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(log_id = %log_id, "checkpointed step complete");
        Ok(())
    }

    /// Checkpoint a step as failed.
    pub async fn checkpoint_step_failed(
        &self,
        log_id: Uuid,
        error: &str,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_step_status(&log_id, StepStatus::Failed, None, Some(error))
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(log_id = %log_id, error, "checkpointed step failed");
        Ok(())
    }

    /// Checkpoint a step as skipped (condition not met).
    pub async fn checkpoint_step_skipped(
        &self,
        run_id: Uuid,
        step_id: &str,
        step_name: &str,
    ) -> Result<(), CheckpointError> {
        let log = StepLog {
            id: Uuid::now_v7(),
            run_id,
            step_id: step_id.to_string(),
            step_name: step_name.to_string(),
            status: StepStatus::Skipped,
            attempt: 0,
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        };

        self.repo
            .create_step_log(&log)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_id = %run_id, step_id, "checkpointed step skipped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run-level checkpoints
    // -----------------------------------------------------------------------

    /// Update the run's status, error, and context snapshot.
    pub async fn checkpoint_run_status(
        &self,
        run_id: Uuid,
        status: FlowRunStatus,
        error: Option<&str>,
        context: Option<&Value>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_run_status(&run_id, status, error, context)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_id = %run_id, status = ?status, "checkpointed run status");
        Ok(())
    }

    /// Step IDs that completed successfully within a run.
    pub async fn completed_steps(&self, run_id: Uuid) -> Result<Vec<String>, CheckpointError> {
        self.repo
            .completed_step_ids(&run_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// CheckpointError
// ---------------------------------------------------------------------------

/// Errors from checkpoint persistence.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint repository error: {0}")]
    Repository(String),
}
