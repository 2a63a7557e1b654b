//! Flow domain types for lamel.
//!
//! Defines the canonical intermediate representation for flows: YAML files on
//! disk and registered definitions in the run store both convert to and from
//! `FlowDefinition`. This module also contains execution tracking types
//! (`FlowRun`, `StepLog`) and trigger configuration.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Flow Definition (canonical IR)
// ---------------------------------------------------------------------------

/// The canonical flow definition.
///
/// YAML files and the registered (deployed) form are both this struct. It is
/// the single source of truth for a flow's shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// UUIDv7 assigned on first save.
    pub id: Uuid,
    /// Human-readable flow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semantic version string (e.g. "1.0.0").
    pub version: String,
    /// Maximum concurrent runs of this flow (None = unlimited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
    /// Per-flow timeout in seconds (overrides the executor default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Trigger configurations (push, pull_request, manual).
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    /// Ordered list of step definitions forming the flow DAG.
    pub steps: Vec<StepDefinition>,
    /// Extensible metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step in the flow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// User-defined step ID (e.g. "upload-customers"). Unique within a flow.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// Step IDs this step depends on (DAG edges).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Optional JEXL expression for conditional execution
    /// (e.g. `trigger.event == 'push'`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Step-level timeout in seconds (default 300).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Retry configuration for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// Step-specific configuration payload.
    pub config: StepConfig,
}

/// Step-specific configuration payload.
///
/// Internally tagged by `type` to match YAML structure:
/// ```yaml
/// config:
///   type: upload
///   table: customers
///   input: model
///   key: transformed_data/customers.csv
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Fetch raw records from the data feed.
    Extract {
        /// Dataset handle on the feed (appended to the feed base URL).
        source: String,
        /// Number of rows to request.
        #[serde(default = "default_extract_count")]
        count: u32,
    },
    /// Clean a raw batch into validated sales records.
    Transform {
        /// Step ID whose output provides the raw rows.
        input: String,
    },
    /// Split cleaned records into dimension and fact tables.
    Model {
        /// Step ID whose output provides the cleaned rows.
        input: String,
    },
    /// Render one table as CSV and upload it to the object store.
    Upload {
        /// Which table to upload.
        table: TableKind,
        /// Step ID whose output provides the table data.
        input: String,
        /// Object key (e.g. "transformed_data/customers.csv").
        key: String,
    },
    /// Barrier that verifies a set of uploads all landed.
    Confirm {
        /// Upload step IDs whose locations must be present.
        #[serde(default)]
        sources: Vec<String>,
    },
    /// Invoke a remote loader function.
    Invoke {
        /// Function name on the invoke endpoint.
        function: String,
        /// Optional JSON payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
}

fn default_extract_count() -> u32 {
    500
}

/// The tables an Upload step can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Customers,
    Products,
    Stores,
    Sales,
    /// The untransformed feed rows, archived alongside the modelled tables.
    Raw,
}

impl TableKind {
    /// The key under which this table appears in a producing step's output.
    pub fn output_field(&self) -> &'static str {
        match self {
            TableKind::Customers => "customers",
            TableKind::Products => "products",
            TableKind::Stores => "stores",
            TableKind::Sales => "sales",
            TableKind::Raw => "rows",
        }
    }
}

// ---------------------------------------------------------------------------
// Retry Configuration
// ---------------------------------------------------------------------------

/// Retry configuration for a flow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in seconds (default 10).
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
    /// How the delay grows across attempts.
    #[serde(default)]
    pub backoff: RetryBackoff,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    10
}

/// Delay growth strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Same delay before every attempt.
    #[default]
    Fixed,
    /// Delay doubles after each failed attempt.
    Exponential,
}

// ---------------------------------------------------------------------------
// Trigger Configuration
// ---------------------------------------------------------------------------

/// How a flow can be triggered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Manually triggered via the CLI.
    Manual {},
    /// A push to the named branch.
    Push { branch: String },
    /// A pull request targeting the named branch.
    PullRequest { branch: String },
}

impl TriggerConfig {
    /// Whether this trigger fires for the given event.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match (self, &event.kind) {
            (TriggerConfig::Manual {}, EventKind::Manual) => true,
            (TriggerConfig::Push { branch }, EventKind::Push) => {
                event.branch.as_deref() == Some(branch.as_str())
            }
            (TriggerConfig::PullRequest { branch }, EventKind::PullRequest) => {
                event.branch.as_deref() == Some(branch.as_str())
            }
            _ => false,
        }
    }
}

/// The kind of event that starts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Manual,
}

impl EventKind {
    /// Stable string form used in trigger payloads and run records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Manual => "manual",
        }
    }
}

/// A concrete triggering event, matched against a definition's triggers and
/// exposed to step conditions as the `trigger` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// What kind of event fired.
    pub kind: EventKind,
    /// Branch the event concerns (push source / pull request target).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Arbitrary extra event data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl TriggerEvent {
    pub fn manual() -> Self {
        Self {
            kind: EventKind::Manual,
            branch: None,
            payload: None,
        }
    }

    pub fn push(branch: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Push,
            branch: Some(branch.into()),
            payload: None,
        }
    }

    pub fn pull_request(branch: impl Into<String>) -> Self {
        Self {
            kind: EventKind::PullRequest,
            branch: Some(branch.into()),
            payload: None,
        }
    }

    /// JSON form stored on the run and exposed to condition expressions.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "event": self.kind.as_str(),
            "branch": self.branch,
            "payload": self.payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Flow Execution Status
// ---------------------------------------------------------------------------

/// Overall status of a flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Status of an individual step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

// ---------------------------------------------------------------------------
// Flow Run (query result / audit record)
// ---------------------------------------------------------------------------

/// A single execution instance of a flow. Used for query results and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRun {
    /// UUIDv7 run ID.
    pub id: Uuid,
    /// ID of the flow definition being executed.
    pub flow_id: Uuid,
    /// Name of the flow (denormalized for display).
    pub flow_name: String,
    /// Current run status.
    pub status: FlowRunStatus,
    /// How this run was triggered ("push", "pull_request", "manual").
    pub trigger_type: String,
    /// JSON payload from the triggering event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_payload: Option<serde_json::Value>,
    /// JSON flow context (accumulated step outputs).
    pub context: serde_json::Value,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run completed (None if still running).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Key for concurrency limiting (matches `FlowDefinition.name` by default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_key: Option<String>,
}

/// Execution log for a single step within a flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    /// UUIDv7 step execution ID.
    pub id: Uuid,
    /// Parent flow run ID.
    pub run_id: Uuid,
    /// Step ID matching `StepDefinition.id`.
    pub step_id: String,
    /// Step name (denormalized for display).
    pub step_name: String,
    /// Current step status.
    pub status: StepStatus,
    /// Attempt number (1-based, increments on retry).
    pub attempt: u32,
    /// JSON output produced by this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Error message if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When step execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When step execution completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
