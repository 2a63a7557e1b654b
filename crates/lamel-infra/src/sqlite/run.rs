//! SQLite run repository implementation.
//!
//! Implements `RunRepository` from `lamel-core` using sqlx with split
//! read/write pools. Flow definitions are stored as JSON blobs. Runs and
//! step logs track execution state for auditing.

use chrono::{DateTime, Utc};
use lamel_core::repository::run::RunRepository;
use lamel_types::error::RepositoryError;
use lamel_types::flow::{FlowDefinition, FlowRun, FlowRunStatus, StepLog, StepStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RunRepository`.
pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

fn status_to_string<T: serde::Serialize>(status: &T) -> String {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => s,
        _ => "unknown".to_string(),
    }
}

fn run_status_from_str(s: &str) -> Result<FlowRunStatus, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid run status: {s}")))
}

fn step_status_from_str(s: &str) -> Result<StepStatus, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid step status: {s}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|_| RepositoryError::Query(format!("invalid UUID: {s}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepositoryError::Query(format!("invalid timestamp: {s}")))
}

fn to_query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct RunRow {
    id: String,
    flow_id: String,
    flow_name: String,
    status: String,
    trigger_type: String,
    trigger_payload: Option<String>,
    context: String,
    started_at: String,
    completed_at: Option<String>,
    error: Option<String>,
    concurrency_key: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            flow_id: row.try_get("flow_id")?,
            flow_name: row.try_get("flow_name")?,
            status: row.try_get("status")?,
            trigger_type: row.try_get("trigger_type")?,
            trigger_payload: row.try_get("trigger_payload")?,
            context: row.try_get("context")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error: row.try_get("error")?,
            concurrency_key: row.try_get("concurrency_key")?,
        })
    }

    fn into_run(self) -> Result<FlowRun, RepositoryError> {
        let trigger_payload = self
            .trigger_payload
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid trigger_payload: {e}")))
            })
            .transpose()?;

        let context: serde_json::Value = serde_json::from_str(&self.context)
            .map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))?;

        Ok(FlowRun {
            id: parse_uuid(&self.id)?,
            flow_id: parse_uuid(&self.flow_id)?,
            flow_name: self.flow_name,
            status: run_status_from_str(&self.status)?,
            trigger_type: self.trigger_type,
            trigger_payload,
            context,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            error: self.error,
            concurrency_key: self.concurrency_key,
        })
    }
}

struct StepRow {
    id: String,
    run_id: String,
    step_id: String,
    step_name: String,
    status: String,
    attempt: i64,
    output: Option<String>,
    error: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            step_id: row.try_get("step_id")?,
            step_name: row.try_get("step_name")?,
            status: row.try_get("status")?,
            attempt: row.try_get("attempt")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_step_log(self) -> Result<StepLog, RepositoryError> {
        let output = self
            .output
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid step output: {e}")))
            })
            .transpose()?;

        Ok(StepLog {
            id: parse_uuid(&self.id)?,
            run_id: parse_uuid(&self.run_id)?,
            step_id: self.step_id,
            step_name: self.step_name,
            status: step_status_from_str(&self.status)?,
            attempt: self.attempt as u32,
            output,
            error: self.error,
            started_at: self
                .started_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// RunRepository implementation
// ---------------------------------------------------------------------------

impl RunRepository for SqliteRunRepository {
    async fn save_definition(&self, def: &FlowDefinition) -> Result<(), RepositoryError> {
        let definition = serde_json::to_string(def)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize definition: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO flow_definitions (id, name, definition, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
                id = excluded.id,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(def.id.to_string())
        .bind(&def.name)
        .bind(definition)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(to_query_err)?;

        Ok(())
    }

    async fn get_definition_by_name(
        &self,
        name: &str,
    ) -> Result<Option<FlowDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM flow_definitions WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(to_query_err)?;

        row.map(|row| {
            let definition: String = row.try_get("definition").map_err(to_query_err)?;
            serde_json::from_str(&definition)
                .map_err(|e| RepositoryError::Query(format!("invalid definition JSON: {e}")))
        })
        .transpose()
    }

    async fn list_definitions(&self) -> Result<Vec<FlowDefinition>, RepositoryError> {
        let rows = sqlx::query("SELECT definition FROM flow_definitions ORDER BY name")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(to_query_err)?;

        rows.into_iter()
            .map(|row| {
                let definition: String = row.try_get("definition").map_err(to_query_err)?;
                serde_json::from_str(&definition)
                    .map_err(|e| RepositoryError::Query(format!("invalid definition JSON: {e}")))
            })
            .collect()
    }

    async fn delete_definition(&self, name: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM flow_definitions WHERE name = ?1")
            .bind(name)
            .execute(&self.pool.writer)
            .await
            .map_err(to_query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_run(&self, run: &FlowRun) -> Result<(), RepositoryError> {
        let trigger_payload = run
            .trigger_payload
            .as_ref()
            .map(|v| {
                serde_json::to_string(v)
                    .map_err(|e| RepositoryError::Query(format!("invalid trigger payload: {e}")))
            })
            .transpose()?;
        let context = serde_json::to_string(&run.context)
            .map_err(|e| RepositoryError::Query(format!("invalid context: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO flow_runs
                (id, flow_id, flow_name, status, trigger_type, trigger_payload,
                 context, started_at, completed_at, error, concurrency_key)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.flow_id.to_string())
        .bind(&run.flow_name)
        .bind(status_to_string(&run.status))
        .bind(&run.trigger_type)
        .bind(trigger_payload)
        .bind(context)
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(&run.error)
        .bind(&run.concurrency_key)
        .execute(&self.pool.writer)
        .await
        .map_err(to_query_err)?;

        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: &Uuid,
        status: FlowRunStatus,
        error: Option<&str>,
        context: Option<&serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        let context = context
            .map(|v| {
                serde_json::to_string(v)
                    .map_err(|e| RepositoryError::Query(format!("invalid context: {e}")))
            })
            .transpose()?;

        // Terminal statuses stamp completed_at
        let completed_at = match status {
            FlowRunStatus::Pending | FlowRunStatus::Running => None,
            _ => Some(Utc::now().to_rfc3339()),
        };

        sqlx::query(
            r#"
            UPDATE flow_runs SET
                status = ?1,
                error = COALESCE(?2, error),
                context = COALESCE(?3, context),
                completed_at = COALESCE(?4, completed_at)
            WHERE id = ?5
            "#,
        )
        .bind(status_to_string(&status))
        .bind(error)
        .bind(context)
        .bind(completed_at)
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(to_query_err)?;

        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<FlowRun>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM flow_runs WHERE id = ?1")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(to_query_err)?;

        row.map(|row| RunRow::from_row(&row).map_err(to_query_err)?.into_run())
            .transpose()
    }

    async fn list_runs(&self, flow_name: &str, limit: u32) -> Result<Vec<FlowRun>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM flow_runs WHERE flow_name = ?1 ORDER BY started_at DESC LIMIT ?2",
        )
        .bind(flow_name)
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(to_query_err)?;

        rows.into_iter()
            .map(|row| RunRow::from_row(&row).map_err(to_query_err)?.into_run())
            .collect()
    }

    async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
        let output = log
            .output
            .as_ref()
            .map(|v| {
                serde_json::to_string(v)
                    .map_err(|e| RepositoryError::Query(format!("invalid output: {e}")))
            })
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO step_logs
                (id, run_id, step_id, step_name, status, attempt, output,
                 error, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.run_id.to_string())
        .bind(&log.step_id)
        .bind(&log.step_name)
        .bind(status_to_string(&log.status))
        .bind(log.attempt as i64)
        .bind(output)
        .bind(&log.error)
        .bind(log.started_at.map(|t| t.to_rfc3339()))
        .bind(log.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool.writer)
        .await
        .map_err(to_query_err)?;

        Ok(())
    }

    async fn update_step_status(
        &self,
        log_id: &Uuid,
        status: StepStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let output = output
            .map(|v| {
                serde_json::to_string(v)
                    .map_err(|e| RepositoryError::Query(format!("invalid output: {e}")))
            })
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE step_logs SET
                status = ?1,
                output = COALESCE(?2, output),
                error = ?3,
                completed_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(status_to_string(&status))
        .bind(output)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(to_query_err)?;

        Ok(())
    }

    async fn list_step_logs(&self, run_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM step_logs WHERE run_id = ?1 ORDER BY started_at ASC, id ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(to_query_err)?;

        rows.into_iter()
            .map(|row| StepRow::from_row(&row).map_err(to_query_err)?.into_step_log())
            .collect()
    }

    async fn completed_step_ids(&self, run_id: &Uuid) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT step_id FROM step_logs WHERE run_id = ?1 AND status = 'completed'",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(to_query_err)?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("step_id").map_err(to_query_err))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lamel_types::flow::{StepConfig, StepDefinition, TriggerConfig};
    use serde_json::json;
    use std::collections::HashMap;

    async fn repo() -> (SqliteRunRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (SqliteRunRepository::new(pool), dir)
    }

    fn sample_definition(name: &str) -> FlowDefinition {
        FlowDefinition {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: Some("test flow".to_string()),
            version: "1.0.0".to_string(),
            concurrency: Some(1),
            timeout_secs: None,
            triggers: vec![TriggerConfig::Manual {}],
            steps: vec![StepDefinition {
                id: "extract".to_string(),
                name: "Extract".to_string(),
                depends_on: vec![],
                condition: None,
                timeout_secs: None,
                retry: None,
                config: StepConfig::Extract {
                    source: "sales".to_string(),
                    count: 500,
                },
            }],
            metadata: HashMap::new(),
        }
    }

    fn sample_run(flow: &FlowDefinition) -> FlowRun {
        FlowRun {
            id: Uuid::now_v7(),
            flow_id: flow.id,
            flow_name: flow.name.clone(),
            status: FlowRunStatus::Running,
            trigger_type: "push".to_string(),
            trigger_payload: Some(json!({"event": "push", "branch": "main"})),
            context: json!({"step_outputs": {}}),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            concurrency_key: Some(flow.name.clone()),
        }
    }

    #[tokio::test]
    async fn test_definition_upsert_roundtrip() {
        let (repo, _dir) = repo().await;
        let def = sample_definition("sales-etl");

        repo.save_definition(&def).await.unwrap();
        let loaded = repo.get_definition_by_name("sales-etl").await.unwrap().unwrap();
        assert_eq!(loaded.name, "sales-etl");
        assert_eq!(loaded.steps.len(), 1);

        // Upsert by name replaces the definition
        let mut updated = def.clone();
        updated.description = Some("updated".to_string());
        repo.save_definition(&updated).await.unwrap();

        let loaded = repo.get_definition_by_name("sales-etl").await.unwrap().unwrap();
        assert_eq!(loaded.description.as_deref(), Some("updated"));
        assert_eq!(repo.list_definitions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_definition_delete() {
        let (repo, _dir) = repo().await;
        repo.save_definition(&sample_definition("sales-etl"))
            .await
            .unwrap();

        assert!(repo.delete_definition("sales-etl").await.unwrap());
        assert!(!repo.delete_definition("sales-etl").await.unwrap());
        assert!(repo.get_definition_by_name("sales-etl").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let (repo, _dir) = repo().await;
        let def = sample_definition("sales-etl");
        let run = sample_run(&def);

        repo.create_run(&run).await.unwrap();

        let loaded = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, FlowRunStatus::Running);
        assert_eq!(loaded.trigger_type, "push");
        assert!(loaded.completed_at.is_none());

        repo.update_run_status(
            &run.id,
            FlowRunStatus::Completed,
            None,
            Some(&json!({"step_outputs": {"extract": {"row_count": 2}}})),
        )
        .await
        .unwrap();

        let loaded = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, FlowRunStatus::Completed);
        assert!(loaded.completed_at.is_some());
        assert_eq!(
            loaded.context["step_outputs"]["extract"]["row_count"],
            json!(2)
        );
    }

    #[tokio::test]
    async fn test_run_failure_records_error() {
        let (repo, _dir) = repo().await;
        let def = sample_definition("sales-etl");
        let run = sample_run(&def);
        repo.create_run(&run).await.unwrap();

        repo.update_run_status(
            &run.id,
            FlowRunStatus::Failed,
            Some("step 'extract' failed: feed returned status 503"),
            None,
        )
        .await
        .unwrap();

        let loaded = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, FlowRunStatus::Failed);
        assert!(loaded.error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_list_runs_orders_and_limits() {
        let (repo, _dir) = repo().await;
        let def = sample_definition("sales-etl");

        for _ in 0..3 {
            repo.create_run(&sample_run(&def)).await.unwrap();
        }

        let runs = repo.list_runs("sales-etl", 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].started_at >= runs[1].started_at);

        assert!(repo.list_runs("other-flow", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_step_log_lifecycle() {
        let (repo, _dir) = repo().await;
        let def = sample_definition("sales-etl");
        let run = sample_run(&def);
        repo.create_run(&run).await.unwrap();

        let log = StepLog {
            id: Uuid::now_v7(),
            run_id: run.id,
            step_id: "extract".to_string(),
            step_name: "Extract".to_string(),
            status: StepStatus::Running,
            attempt: 1,
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        };
        repo.create_step_log(&log).await.unwrap();

        repo.update_step_status(
            &log.id,
            StepStatus::Completed,
            Some(&json!({"row_count": 500})),
            None,
        )
        .await
        .unwrap();

        let logs = repo.list_step_logs(&run.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, StepStatus::Completed);
        assert_eq!(logs[0].output.as_ref().unwrap()["row_count"], json!(500));
        assert!(logs[0].completed_at.is_some());

        let completed = repo.completed_step_ids(&run.id).await.unwrap();
        assert_eq!(completed, vec!["extract"]);
    }

    #[tokio::test]
    async fn test_completed_step_ids_ignores_failures() {
        let (repo, _dir) = repo().await;
        let def = sample_definition("sales-etl");
        let run = sample_run(&def);
        repo.create_run(&run).await.unwrap();

        let failed = StepLog {
            id: Uuid::now_v7(),
            run_id: run.id,
            step_id: "extract".to_string(),
            step_name: "Extract".to_string(),
            status: StepStatus::Failed,
            attempt: 1,
            output: None,
            error: Some("feed returned status 503".to_string()),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        };
        repo.create_step_log(&failed).await.unwrap();

        assert!(repo.completed_step_ids(&run.id).await.unwrap().is_empty());
    }
}
