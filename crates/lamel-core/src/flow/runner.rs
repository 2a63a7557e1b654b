//! Step runner for all flow step types.
//!
//! `StepRunner` dispatches execution to the appropriate handler based on the
//! `StepConfig` variant. Handlers read their inputs from the flow context,
//! call the collaborator clients where needed, and return a JSON output that
//! the executor stores back into the context.
//!
//! The collaborators -- data feed, object store, loader function -- are
//! traits implemented by `lamel-infra`; tests supply in-memory mocks.

use lamel_types::error::{ExtractError, InvokeError, StoreError};
use lamel_types::flow::{StepConfig, StepDefinition, TableKind};
use lamel_types::sales::{RawSalesRecord, SalesRecord};
use serde_json::{Value, json};

use super::context::FlowContext;
use crate::pipeline::codec::{self, CodecError};
use crate::pipeline::{model, transform};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// The data feed: fetches a batch of raw sales rows.
pub trait Extractor: Send + Sync {
    fn fetch(
        &self,
        source: &str,
        count: u32,
    ) -> impl std::future::Future<Output = Result<Vec<RawSalesRecord>, ExtractError>> + Send;
}

/// The object store: persists rendered CSV tables.
pub trait ObjectStore: Send + Sync {
    /// Upload `body` under `key`; returns the object's location.
    fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<String, StoreError>> + Send;
}

/// The loader function gateway: triggers the store-to-warehouse load.
pub trait FunctionInvoker: Send + Sync {
    fn invoke(
        &self,
        function: &str,
        payload: &Value,
    ) -> impl std::future::Future<Output = Result<Value, InvokeError>> + Send;
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors that can occur during step execution.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Step execution failed.
    #[error("step execution failed: {0}")]
    ExecutionFailed(String),

    /// A referenced input step has no output in the context.
    #[error("no output available from step '{step_id}'")]
    MissingInput { step_id: String },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Executes individual flow steps by dispatching to type-specific handlers.
///
/// Generic over the collaborator clients so the executor can be wired with
/// the HTTP implementations in production and mocks in tests.
pub struct StepRunner<E, S, F> {
    extractor: E,
    store: S,
    invoker: F,
}

impl<E: Extractor, S: ObjectStore, F: FunctionInvoker> StepRunner<E, S, F> {
    /// Create a new step runner over the given clients.
    pub fn new(extractor: E, store: S, invoker: F) -> Self {
        Self {
            extractor,
            store,
            invoker,
        }
    }

    /// Run a step and return its JSON output.
    pub async fn run(&self, step: &StepDefinition, ctx: &FlowContext) -> Result<Value, StepError> {
        match &step.config {
            StepConfig::Extract { source, count } => self.run_extract(source, *count).await,
            StepConfig::Transform { input } => self.run_transform(input, ctx).await,
            StepConfig::Model { input } => self.run_model(input, ctx).await,
            StepConfig::Upload { table, input, key } => {
                self.run_upload(*table, input, key, ctx).await
            }
            StepConfig::Confirm { sources } => self.run_confirm(sources, ctx).await,
            StepConfig::Invoke { function, payload } => {
                self.run_invoke(function, payload.as_ref()).await
            }
        }
    }

    // -- Extract: fetch a raw batch from the feed --

    async fn run_extract(&self, source: &str, count: u32) -> Result<Value, StepError> {
        tracing::debug!(source, count, "extracting raw batch from feed");
        let records = self.extractor.fetch(source, count).await?;
        let row_count = records.len();
        tracing::info!(rows = row_count, source, "raw batch extracted");
        Ok(json!({
            "rows": records,
            "row_count": row_count,
        }))
    }

    // -- Transform: clean the raw rows --

    async fn run_transform(&self, input: &str, ctx: &FlowContext) -> Result<Value, StepError> {
        let raw: Vec<RawSalesRecord> = self.input_rows(input, ctx)?;
        let (cleaned, report) = transform::clean_sales_data(raw);
        tracing::info!(
            rows_in = report.rows_in,
            rows_out = report.rows_out,
            "sales batch cleaned"
        );
        let row_count = cleaned.len();
        Ok(json!({
            "rows": cleaned,
            "row_count": row_count,
            "report": report,
        }))
    }

    // -- Model: split into dimension/fact tables --

    async fn run_model(&self, input: &str, ctx: &FlowContext) -> Result<Value, StepError> {
        let rows: Vec<SalesRecord> = self.input_rows(input, ctx)?;
        let tables = model::model_sales_data(&rows);
        tracing::info!(
            customers = tables.customers.len(),
            products = tables.products.len(),
            stores = tables.stores.len(),
            sales = tables.sales.len(),
            "tables modelled"
        );
        Ok(json!({
            "customers": tables.customers,
            "products": tables.products,
            "stores": tables.stores,
            "sales": tables.sales,
        }))
    }

    // -- Upload: render a table as CSV and push it to the object store --

    async fn run_upload(
        &self,
        table: TableKind,
        input: &str,
        key: &str,
        ctx: &FlowContext,
    ) -> Result<Value, StepError> {
        let output = ctx
            .get_step_output(input)
            .ok_or_else(|| StepError::MissingInput {
                step_id: input.to_string(),
            })?;
        let field = table.output_field();
        let rows = output.get(field).ok_or_else(|| {
            StepError::ExecutionFailed(format!(
                "output of step '{input}' has no '{field}' table"
            ))
        })?;

        let body = codec::encode_table(table, rows)?;
        let bytes = body.len();
        let location = self.store.put_object(key, body).await?;
        tracing::info!(key, bytes, %location, "table uploaded");

        Ok(json!({
            "location": location,
            "key": key,
            "bytes": bytes,
        }))
    }

    // -- Confirm: barrier verifying every upload landed --

    async fn run_confirm(&self, sources: &[String], ctx: &FlowContext) -> Result<Value, StepError> {
        let mut locations = Vec::with_capacity(sources.len());
        for source in sources {
            let output = ctx
                .get_step_output(source)
                .ok_or_else(|| StepError::MissingInput {
                    step_id: source.clone(),
                })?;
            let location = output
                .get("location")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    StepError::ExecutionFailed(format!(
                        "upload step '{source}' reported no location"
                    ))
                })?;
            locations.push(location.to_string());
        }

        for location in &locations {
            tracing::info!(%location, "upload confirmed");
        }

        Ok(json!({
            "confirmed": true,
            "locations": locations,
        }))
    }

    // -- Invoke: trigger the loader function --

    async fn run_invoke(
        &self,
        function: &str,
        payload: Option<&Value>,
    ) -> Result<Value, StepError> {
        let empty = json!({});
        let payload = payload.unwrap_or(&empty);
        tracing::info!(function, "invoking loader function");
        let response = self.invoker.invoke(function, payload).await?;
        Ok(response)
    }

    // -- Shared input plumbing --

    /// Deserialize the `rows` field of a prior step's output.
    fn input_rows<T: serde::de::DeserializeOwned>(
        &self,
        input: &str,
        ctx: &FlowContext,
    ) -> Result<Vec<T>, StepError> {
        let output = ctx
            .get_step_output(input)
            .ok_or_else(|| StepError::MissingInput {
                step_id: input.to_string(),
            })?;
        let rows = output.get("rows").ok_or_else(|| {
            StepError::ExecutionFailed(format!("output of step '{input}' has no 'rows' field"))
        })?;
        serde_json::from_value(rows.clone()).map_err(|e| {
            StepError::ExecutionFailed(format!("rows from step '{input}' have the wrong shape: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
