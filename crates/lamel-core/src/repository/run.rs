//! Run repository trait definition.
//!
//! Defines the storage interface for flow definitions, execution runs, and
//! step logs. The infrastructure layer (lamel-infra) implements this trait
//! with SQLite persistence; tests use in-memory implementations.
//!
//! Uses native async fn in traits (no async_trait macro).

use lamel_types::error::RepositoryError;
use lamel_types::flow::{FlowDefinition, FlowRun, FlowRunStatus, StepLog, StepStatus};
use uuid::Uuid;

/// Repository trait for flow persistence.
///
/// Covers three entity families:
/// - **Definitions:** registered (deployed) flow definitions.
/// - **Runs:** create/update/query flow execution instances.
/// - **Steps:** create/update/query individual step execution logs.
pub trait RunRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Upsert a flow definition (insert or replace by name).
    fn save_definition(
        &self,
        def: &FlowDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a flow definition by name.
    fn get_definition_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<FlowDefinition>, RepositoryError>> + Send;

    /// List all registered flow definitions.
    fn list_definitions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<FlowDefinition>, RepositoryError>> + Send;

    /// Delete a flow definition by name. Returns `true` if it existed.
    fn delete_definition(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Create a new flow run record.
    fn create_run(
        &self,
        run: &FlowRun,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a run's status (and optionally error message / context).
    fn update_run_status(
        &self,
        run_id: &Uuid,
        status: FlowRunStatus,
        error: Option<&str>,
        context: Option<&serde_json::Value>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a flow run by its UUID.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<FlowRun>, RepositoryError>> + Send;

    /// List runs for a flow name, ordered by started_at DESC.
    fn list_runs(
        &self,
        flow_name: &str,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<FlowRun>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Create a new step execution log entry.
    fn create_step_log(
        &self,
        log: &StepLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a step log's status, output, and error.
    fn update_step_status(
        &self,
        log_id: &Uuid,
        status: StepStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List step logs for a run, ordered by started_at ASC.
    fn list_step_logs(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepLog>, RepositoryError>> + Send;

    /// Step IDs that completed successfully within a run.
    fn completed_step_ids(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
