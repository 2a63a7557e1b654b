//! Flow execution context with step output tracking.
//!
//! `FlowContext` is the mutable state that flows through a run. It stores
//! step outputs and the triggering event, with size limits to prevent
//! unbounded memory growth, and serializes to JSON for checkpointing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::definition::FlowError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum size of a single step output (1 MB).
pub const MAX_STEP_OUTPUT_SIZE: usize = 1_048_576;

/// Maximum total size of all context data (10 MB).
pub const MAX_CONTEXT_SIZE: usize = 10_485_760;

// ---------------------------------------------------------------------------
// FlowContext
// ---------------------------------------------------------------------------

/// Mutable execution context that tracks state across a flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowContext {
    /// Step outputs keyed by step ID.
    pub step_outputs: HashMap<String, Value>,
    /// Trigger payload (event kind, branch, extra data).
    pub trigger: Value,
    /// Flow name.
    pub flow_name: String,
    /// Run ID.
    pub run_id: Uuid,
}

impl FlowContext {
    /// Create a new flow context for a run.
    pub fn new(flow_name: String, run_id: Uuid, trigger: Value) -> Self {
        Self {
            step_outputs: HashMap::new(),
            trigger,
            flow_name,
            run_id,
        }
    }

    /// Store the output of a completed step.
    ///
    /// Enforces `MAX_STEP_OUTPUT_SIZE` (1 MB) per output. If the output
    /// exceeds this limit, it is replaced with a JSON marker indicating the
    /// overflow. Also enforces `MAX_CONTEXT_SIZE` (10 MB) total.
    pub fn set_step_output(&mut self, step_id: &str, output: Value) -> Result<(), FlowError> {
        let serialized =
            serde_json::to_string(&output).map_err(|e| FlowError::ExecutionError(e.to_string()))?;

        if serialized.len() > MAX_STEP_OUTPUT_SIZE {
            tracing::warn!(
                step_id,
                size = serialized.len(),
                max = MAX_STEP_OUTPUT_SIZE,
                "step output exceeds size limit, truncating"
            );
            let truncated = json!({
                "_truncated": true,
                "_original_size": serialized.len(),
            });
            self.step_outputs.insert(step_id.to_string(), truncated);
        } else {
            self.step_outputs.insert(step_id.to_string(), output);
        }

        let total = self.total_size();
        if total > MAX_CONTEXT_SIZE {
            return Err(FlowError::ExecutionError(format!(
                "total context size ({} bytes) exceeds maximum ({} bytes)",
                total, MAX_CONTEXT_SIZE
            )));
        }

        Ok(())
    }

    /// Get the output of a completed step.
    pub fn get_step_output(&self, step_id: &str) -> Option<&Value> {
        self.step_outputs.get(step_id)
    }

    /// Compute the total serialized size of all context data in bytes.
    pub fn total_size(&self) -> usize {
        let outputs_size: usize = self
            .step_outputs
            .values()
            .map(|v| serde_json::to_string(v).map(|s| s.len()).unwrap_or(0))
            .sum();
        let trigger_size = serde_json::to_string(&self.trigger)
            .map(|s| s.len())
            .unwrap_or(0);
        outputs_size + trigger_size
    }

    /// Serialize the entire context to JSON for checkpointing.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(json!({}))
    }

    /// Restore a context from a JSON checkpoint.
    pub fn from_json(value: Value) -> Result<Self, FlowError> {
        serde_json::from_value(value)
            .map_err(|e| FlowError::ParseError(format!("failed to restore context: {}", e)))
    }

    /// Build a JSON object suitable for JEXL condition evaluation.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "steps": { "<step_id>": { "output": <value> }, ... },
    ///   "trigger": { "event": "push", "branch": "main", ... },
    ///   "flow": { "name": "...", "run_id": "..." }
    /// }
    /// ```
    pub fn to_expression_context(&self) -> Value {
        let mut steps = serde_json::Map::new();
        for (id, output) in &self.step_outputs {
            steps.insert(id.clone(), json!({ "output": output }));
        }

        json!({
            "steps": steps,
            "trigger": self.trigger,
            "flow": {
                "name": self.flow_name,
                "run_id": self.run_id.to_string(),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
