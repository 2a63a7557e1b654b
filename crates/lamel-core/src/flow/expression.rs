//! JEXL expression evaluator for step `condition` clauses.
//!
//! Wraps `jexl_eval::Evaluator` with a small set of pre-registered transforms
//! and provides boolean evaluation against a flow context.
//!
//! Payloads are always passed as context objects, never interpolated into
//! expression strings.

use serde_json::{Value, json};

use super::context::FlowContext;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during expression evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression evaluation failed: {0}")]
    EvalFailed(String),

    #[error("invalid context: {0}")]
    InvalidContext(String),
}

// ---------------------------------------------------------------------------
// FlowEvaluator
// ---------------------------------------------------------------------------

/// JEXL expression evaluator with standard transforms registered.
///
/// Used for step `condition` evaluation, e.g. `trigger.event == 'push'` or
/// `steps.extract.output.row_count > 0`.
pub struct FlowEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl FlowEvaluator {
    /// Create a new evaluator with transforms registered.
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.contains(search)))
            })
            .with_transform("length", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                let len = match &val {
                    Value::String(s) => s.len(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!Self::value_to_bool(&val)))
            });

        Self { evaluator }
    }

    /// Evaluate an expression to a boolean result.
    ///
    /// The `context` must be a JSON object. Expression results are coerced
    /// to boolean using JavaScript-like truthiness rules.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        if !context.is_object() {
            return Err(ExpressionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }

        let result = self
            .evaluator
            .eval_in_context(expression, context)
            .map_err(|e| ExpressionError::EvalFailed(e.to_string()))?;

        Ok(Self::value_to_bool(&result))
    }

    /// Evaluate an expression against a flow context.
    ///
    /// Builds a context JSON object with `steps`, `trigger`, and `flow` keys.
    pub fn evaluate_in_flow_context(
        &self,
        expression: &str,
        flow_context: &FlowContext,
    ) -> Result<bool, ExpressionError> {
        let context = flow_context.to_expression_context();
        self.evaluate_bool(expression, &context)
    }

    /// Coerce a JSON value to boolean using JavaScript-like truthiness.
    fn value_to_bool(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

impl Default for FlowEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lamel_types::flow::TriggerEvent;
    use uuid::Uuid;

    fn push_context() -> FlowContext {
        FlowContext::new(
            "sales-etl".to_string(),
            Uuid::now_v7(),
            TriggerEvent::push("main").to_payload(),
        )
    }

    fn pull_request_context() -> FlowContext {
        FlowContext::new(
            "sales-etl".to_string(),
            Uuid::now_v7(),
            TriggerEvent::pull_request("main").to_payload(),
        )
    }

    #[test]
    fn test_push_gate_true_on_push() {
        let evaluator = FlowEvaluator::new();
        let ctx = push_context();
        assert!(
            evaluator
                .evaluate_in_flow_context("trigger.event == 'push'", &ctx)
                .unwrap()
        );
    }

    #[test]
    fn test_push_gate_false_on_pull_request() {
        let evaluator = FlowEvaluator::new();
        let ctx = pull_request_context();
        assert!(
            !evaluator
                .evaluate_in_flow_context("trigger.event == 'push'", &ctx)
                .unwrap()
        );
    }

    #[test]
    fn test_branch_comparison() {
        let evaluator = FlowEvaluator::new();
        let ctx = push_context();
        assert!(
            evaluator
                .evaluate_in_flow_context("trigger.branch == 'main'", &ctx)
                .unwrap()
        );
        assert!(
            !evaluator
                .evaluate_in_flow_context("trigger.branch == 'develop'", &ctx)
                .unwrap()
        );
    }

    #[test]
    fn test_step_output_reference() {
        let evaluator = FlowEvaluator::new();
        let mut ctx = push_context();
        ctx.set_step_output("extract", serde_json::json!({"row_count": 500}))
            .unwrap();

        assert!(
            evaluator
                .evaluate_in_flow_context("steps.extract.output.row_count > 0", &ctx)
                .unwrap()
        );
    }

    #[test]
    fn test_length_transform() {
        let evaluator = FlowEvaluator::new();
        let ctx = serde_json::json!({ "items": ["a", "b", "c"] });
        assert!(evaluator.evaluate_bool("items|length == 3", &ctx).unwrap());
    }

    #[test]
    fn test_invalid_context_rejected() {
        let evaluator = FlowEvaluator::new();
        let err = evaluator
            .evaluate_bool("true", &serde_json::json!("not an object"))
            .unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_truthiness_coercion() {
        let evaluator = FlowEvaluator::new();
        let ctx = serde_json::json!({ "name": "sales" });
        // Non-empty string coerces to true
        assert!(evaluator.evaluate_bool("name", &ctx).unwrap());
    }
}
