//! Flow management commands: validate, run, deploy, list, runs, logs.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use lamel_core::flow::definition::{discover_flows, load_flow_file, validate_definition};
use lamel_core::flow::executor::{DagExecutor, ExecutionResult, FlowExecutor};
use lamel_core::flow::plan::build_execution_plan;
use lamel_core::flow::runner::StepRunner;
use lamel_core::flow::trigger::matching_trigger;
use lamel_core::repository::run::RunRepository;
use lamel_infra::credentials::{Credentials, require_api_key};
use lamel_infra::extract::HttpExtractor;
use lamel_infra::invoke::HttpFunctionInvoker;
use lamel_infra::sqlite::run::SqliteRunRepository;
use lamel_infra::store::HttpObjectStore;
use lamel_types::flow::{FlowDefinition, FlowRunStatus, StepStatus};
use uuid::Uuid;

use super::EventArg;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// Parse and validate a flow file, reporting its shape.
pub fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let def = load_flow_file(file)
        .with_context(|| format!("failed to load flow from {}", file.display()))?;
    let waves = build_execution_plan(&def.steps).context("invalid step graph")?;

    if json {
        let report = serde_json::json!({
            "name": def.name,
            "version": def.version,
            "steps": def.steps.len(),
            "triggers": def.triggers.len(),
            "waves": waves.len(),
            "valid": true,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "  {} {} is valid ({} steps in {} waves, {} triggers)",
            style("✓").green(),
            style(&def.name).cyan(),
            def.steps.len(),
            waves.len(),
            def.triggers.len()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Execute a flow (from a file path or a deployed name) for an event.
pub async fn handle_run(
    flow: &str,
    event_arg: EventArg,
    branch: &str,
    payload: Option<&str>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let repo = SqliteRunRepository::new(state.db_pool.clone());
    let def = resolve_flow(flow, &repo).await?;

    let payload = payload
        .map(serde_json::from_str)
        .transpose()
        .context("event payload is not valid JSON")?;
    let event = event_arg.to_event(branch, payload);

    // A run starts only when the event matches one of the flow's triggers
    if matching_trigger(&def, &event).is_none() {
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "flow": def.name,
                    "triggered": false,
                }))?
            );
        } else {
            println!(
                "  {} {} event does not trigger flow '{}', nothing to do",
                style("∅").dim(),
                event.kind.as_str(),
                def.name
            );
        }
        return Ok(());
    }

    // Resolve credentials before touching anything external
    let scope = state.workspace_scope();
    let credentials = Credentials::load(&state.secret_service, &scope).await?;

    let extractor = HttpExtractor::new(
        state.config.extract.base_url.clone(),
        credentials.extract_api_key,
    )?;
    let store = HttpObjectStore::new(
        state.config.store.endpoint.clone(),
        credentials.bucket,
        credentials.store_access_key_id.clone(),
        credentials.store_secret_access_key.clone(),
    )?;
    let invoker = HttpFunctionInvoker::new(
        state.config.invoke.endpoint.clone(),
        credentials.store_access_key_id,
        credentials.store_secret_access_key,
    )?;

    let executor = DagExecutor::new(repo, StepRunner::new(extractor, store, invoker));

    let result = executor
        .execute(&def, &event)
        .await
        .with_context(|| format!("flow '{}' failed", def.name))?;

    render_result(&def, &result, &executor, json).await
}

async fn resolve_flow(flow: &str, repo: &SqliteRunRepository) -> Result<FlowDefinition> {
    let path = Path::new(flow);
    if path.exists() {
        return load_flow_file(path)
            .with_context(|| format!("failed to load flow from {}", path.display()));
    }

    match repo.get_definition_by_name(flow).await? {
        Some(def) => Ok(def),
        None => bail!("'{flow}' is neither a flow file nor a deployed flow"),
    }
}

async fn render_result<R, E, S, F>(
    def: &FlowDefinition,
    result: &ExecutionResult,
    executor: &DagExecutor<R, E, S, F>,
    json: bool,
) -> Result<()>
where
    R: RunRepository + 'static,
    E: lamel_core::flow::runner::Extractor + 'static,
    S: lamel_core::flow::runner::ObjectStore + 'static,
    F: lamel_core::flow::runner::FunctionInvoker + 'static,
{
    let logs = executor.repository().list_step_logs(&result.run_id).await?;

    if json {
        let report = serde_json::json!({
            "flow": def.name,
            "run_id": result.run_id,
            "status": result.status,
            "completed_steps": result.completed_steps,
            "steps": logs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Flow '{}' {} (run {})",
        status_glyph(result.status),
        style(&def.name).cyan(),
        status_word(result.status),
        style(result.run_id).dim()
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Step", "Status", "Attempt", "Error"]);

    for log in logs {
        table.add_row(vec![
            Cell::new(&log.step_id),
            step_status_cell(log.status),
            Cell::new(log.attempt),
            Cell::new(log.error.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn status_glyph(status: FlowRunStatus) -> String {
    match status {
        FlowRunStatus::Completed => format!("{}", style("✓").green()),
        FlowRunStatus::Failed => format!("{}", style("✗").red()),
        FlowRunStatus::Cancelled => format!("{}", style("∅").yellow()),
        _ => format!("{}", style("…").dim()),
    }
}

fn status_word(status: FlowRunStatus) -> &'static str {
    match status {
        FlowRunStatus::Pending => "pending",
        FlowRunStatus::Running => "running",
        FlowRunStatus::Completed => "completed",
        FlowRunStatus::Failed => "failed",
        FlowRunStatus::Cancelled => "cancelled",
    }
}

fn step_status_cell(status: StepStatus) -> Cell {
    match status {
        StepStatus::Completed => Cell::new("completed").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
        StepStatus::Skipped => Cell::new("skipped").fg(Color::Yellow),
        StepStatus::Running => Cell::new("running"),
        StepStatus::Pending => Cell::new("pending"),
    }
}

// ---------------------------------------------------------------------------
// Deploy
// ---------------------------------------------------------------------------

/// Register every valid flow definition found under `dir`.
pub async fn handle_deploy(dir: &Path, state: &AppState, json: bool) -> Result<()> {
    // Deploying requires an authenticated workspace; refuse before touching
    // the registry when the key is absent.
    let scope = state.workspace_scope();
    require_api_key(&state.secret_service, &scope)
        .await
        .context("not logged in (run `lamel login` first)")?;

    let discovered = discover_flows(dir)
        .with_context(|| format!("failed to scan {}", dir.display()))?;
    if discovered.is_empty() {
        bail!("no flow definitions found under {}", dir.display());
    }

    let repo = SqliteRunRepository::new(state.db_pool.clone());
    let mut deployed = Vec::new();
    for (path, def) in discovered {
        validate_definition(&def)
            .with_context(|| format!("invalid flow in {}", path.display()))?;
        build_execution_plan(&def.steps)
            .with_context(|| format!("invalid step graph in {}", path.display()))?;
        repo.save_definition(&def).await?;
        deployed.push((path, def));
    }

    if json {
        let report: Vec<_> = deployed
            .iter()
            .map(|(path, def)| {
                serde_json::json!({
                    "name": def.name,
                    "version": def.version,
                    "path": path,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Deployed {} flow(s)",
        style("✓").green(),
        deployed.len()
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Flow", "Version", "Steps", "Triggers", "Source"]);
    for (path, def) in &deployed {
        table.add_row(vec![
            Cell::new(&def.name).fg(Color::Cyan),
            Cell::new(&def.version),
            Cell::new(def.steps.len()),
            Cell::new(def.triggers.len()),
            Cell::new(path.display()),
        ]);
    }
    println!("{table}");
    Ok(())
}

// ---------------------------------------------------------------------------
// List / Runs / Logs
// ---------------------------------------------------------------------------

/// List deployed flows.
pub async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let repo = SqliteRunRepository::new(state.db_pool.clone());
    let definitions = repo.list_definitions().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    if definitions.is_empty() {
        println!("  No flows deployed. Use `lamel deploy <dir>` to register some.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Flow", "Version", "Steps", "Triggers", "Description"]);
    for def in &definitions {
        table.add_row(vec![
            Cell::new(&def.name).fg(Color::Cyan),
            Cell::new(&def.version),
            Cell::new(def.steps.len()),
            Cell::new(def.triggers.len()),
            Cell::new(def.description.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Show recent runs for a flow.
pub async fn handle_runs(name: &str, limit: u32, state: &AppState, json: bool) -> Result<()> {
    let repo = SqliteRunRepository::new(state.db_pool.clone());
    let runs = repo.list_runs(name, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("  No runs recorded for '{name}'.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Run", "Status", "Trigger", "Started", "Error"]);
    for run in &runs {
        table.add_row(vec![
            Cell::new(run.id),
            Cell::new(status_word(run.status)).fg(match run.status {
                FlowRunStatus::Completed => Color::Green,
                FlowRunStatus::Failed => Color::Red,
                _ => Color::White,
            }),
            Cell::new(&run.trigger_type),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(run.error.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Show step logs for a run.
pub async fn handle_logs(run_id: &str, state: &AppState, json: bool) -> Result<()> {
    let run_id = Uuid::parse_str(run_id).context("run id is not a valid UUID")?;
    let repo = SqliteRunRepository::new(state.db_pool.clone());
    let logs = repo.list_step_logs(&run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }

    if logs.is_empty() {
        println!("  No step logs for run {run_id}.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Step", "Status", "Attempt", "Started", "Error"]);
    for log in &logs {
        table.add_row(vec![
            Cell::new(&log.step_id),
            step_status_cell(log.status),
            Cell::new(log.attempt),
            Cell::new(
                log.started_at
                    .map(|t| t.format("%H:%M:%S%.3f").to_string())
                    .unwrap_or_default(),
            ),
            Cell::new(log.error.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use lamel_core::flow::definition::parse_flow_yaml;
    use lamel_core::flow::plan::build_execution_plan;

    /// The shipped sales flow must always parse, validate, and plan.
    #[test]
    fn test_shipped_sales_flow_is_valid() {
        let yaml = include_str!("../../../../flows/sales-etl.yaml");
        let def = parse_flow_yaml(yaml).expect("shipped flow must be valid");

        assert_eq!(def.name, "sales-etl");
        assert_eq!(def.triggers.len(), 3);

        let waves = build_execution_plan(&def.steps).expect("shipped flow must plan");

        // The warehouse load is alone in the final wave, gated on push
        let last_wave = waves.last().unwrap();
        assert_eq!(last_wave.len(), 1);
        assert_eq!(last_wave[0].id, "load-warehouse");
        assert_eq!(
            last_wave[0].condition.as_deref(),
            Some("trigger.event == 'push'")
        );

        // All five uploads share a wave
        let upload_wave = waves
            .iter()
            .find(|wave| wave.iter().any(|s| s.id.starts_with("upload-")))
            .unwrap();
        assert_eq!(upload_wave.len(), 5);
    }
}
