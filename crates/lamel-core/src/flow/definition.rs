//! Flow definition parsing, validation, and filesystem operations.
//!
//! Converts between YAML files and the canonical `FlowDefinition` IR,
//! validates structural constraints (unique IDs, valid dependencies and input
//! references, name format), and provides discovery for flow files on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use lamel_types::flow::{FlowDefinition, StepConfig};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during flow operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A step references an unknown dependency.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// JEXL condition expression error.
    #[error("expression error: {0}")]
    ExpressionError(String),

    /// Runtime execution failure.
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// Concurrency limit for this flow was reached.
    #[error("concurrency limit reached")]
    ConcurrencyLimitReached,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `FlowDefinition`.
///
/// Runs `validate_definition` after deserialization, so the returned value
/// is guaranteed to be structurally valid.
pub fn parse_flow_yaml(yaml: &str) -> Result<FlowDefinition, FlowError> {
    let def: FlowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| FlowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `FlowDefinition` to a YAML string.
pub fn serialize_flow_yaml(def: &FlowDefinition) -> Result<String, FlowError> {
    serde_yaml_ng::to_string(def).map_err(|e| FlowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `FlowDefinition`.
///
/// Checks:
/// - Name is non-empty and contains only alphanumeric characters and hyphens
/// - At least one step and at least one trigger exist
/// - All step IDs are unique
/// - All `depends_on` references point to existing step IDs
/// - All `input`/`sources` references in step configs point to existing steps
/// - Extract count > 0
/// - Concurrency >= 1 if set
/// - Timeout > 0 if set
pub fn validate_definition(def: &FlowDefinition) -> Result<(), FlowError> {
    // Name format: non-empty, alphanumeric + hyphens only
    if def.name.is_empty() {
        return Err(FlowError::ValidationError(
            "flow name must not be empty".to_string(),
        ));
    }
    if !def.name.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return Err(FlowError::ValidationError(format!(
            "flow name '{}' contains invalid characters (only alphanumeric and hyphens allowed)",
            def.name
        )));
    }

    // At least one step
    if def.steps.is_empty() {
        return Err(FlowError::ValidationError(
            "flow must have at least one step".to_string(),
        ));
    }

    // At least one trigger, otherwise no event can ever start a run
    if def.triggers.is_empty() {
        return Err(FlowError::ValidationError(
            "flow must have at least one trigger".to_string(),
        ));
    }

    // Unique step IDs
    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(FlowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
    }

    // depends_on references must be valid
    for step in &def.steps {
        for dep in &step.depends_on {
            if !seen_ids.contains(dep.as_str()) {
                return Err(FlowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                )));
            }
        }
    }

    // Config back-references must be valid
    for step in &def.steps {
        match &step.config {
            StepConfig::Extract { count, .. } => {
                if *count == 0 {
                    return Err(FlowError::ValidationError(format!(
                        "extract step '{}' requests zero rows",
                        step.id
                    )));
                }
            }
            StepConfig::Transform { input }
            | StepConfig::Model { input }
            | StepConfig::Upload { input, .. } => {
                if !seen_ids.contains(input.as_str()) {
                    return Err(FlowError::ValidationError(format!(
                        "step '{}' reads input from unknown step '{}'",
                        step.id, input
                    )));
                }
            }
            StepConfig::Confirm { sources } => {
                for src in sources {
                    if !seen_ids.contains(src.as_str()) {
                        return Err(FlowError::ValidationError(format!(
                            "confirm step '{}' references unknown step '{}'",
                            step.id, src
                        )));
                    }
                }
            }
            StepConfig::Invoke { function, .. } => {
                if function.is_empty() {
                    return Err(FlowError::ValidationError(format!(
                        "invoke step '{}' has an empty function name",
                        step.id
                    )));
                }
            }
        }
    }

    // Concurrency >= 1 if set
    if let Some(c) = def.concurrency {
        if c < 1 {
            return Err(FlowError::ValidationError(
                "concurrency must be >= 1".to_string(),
            ));
        }
    }

    // Timeout > 0 if set
    if let Some(t) = def.timeout_secs {
        if t == 0 {
            return Err(FlowError::ValidationError(
                "timeout must be > 0".to_string(),
            ));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a flow definition from a YAML file.
pub fn load_flow_file(path: &Path) -> Result<FlowDefinition, FlowError> {
    let content = std::fs::read_to_string(path)?;
    parse_flow_yaml(&content)
}

/// Save a flow definition to a YAML file.
///
/// Creates parent directories if they don't exist.
pub fn save_flow_file(path: &Path, def: &FlowDefinition) -> Result<(), FlowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_flow_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover all flow YAML files under `base_dir`.
///
/// Scans for `.yaml` and `.yml` files recursively. Each file is parsed and
/// returned alongside its path. Files that fail to parse are skipped with a
/// warning (they may not be flow definitions).
pub fn discover_flows(base_dir: &Path) -> Result<Vec<(PathBuf, FlowDefinition)>, FlowError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, FlowDefinition)>,
) -> Result<(), FlowError> {
    let entries = std::fs::read_dir(dir)?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if let Some(ext) = path.extension() {
            if ext == "yaml" || ext == "yml" {
                match load_flow_file(&path) {
                    Ok(def) => results.push((path, def)),
                    Err(_) => {
                        tracing::warn!(?path, "skipping unparseable flow file");
                    }
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lamel_types::flow::{StepDefinition, TriggerConfig};
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Helper: build a minimal valid flow definition.
    fn minimal_flow(name: &str, steps: Vec<StepDefinition>) -> FlowDefinition {
        FlowDefinition {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: None,
            version: "1.0.0".to_string(),
            concurrency: None,
            timeout_secs: None,
            triggers: vec![TriggerConfig::Manual {}],
            steps,
            metadata: HashMap::new(),
        }
    }

    /// Helper: build a simple extract step.
    fn extract_step(id: &str, depends_on: Vec<&str>) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            name: id.to_string(),
            depends_on: depends_on.into_iter().map(String::from).collect(),
            condition: None,
            timeout_secs: None,
            retry: None,
            config: StepConfig::Extract {
                source: "sales".to_string(),
                count: 500,
            },
        }
    }

    // -----------------------------------------------------------------------
    // YAML roundtrip
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_yaml_roundtrip() {
        let yaml = r#"
id: "01938e90-0000-7000-8000-000000000001"
name: sales-etl
description: Extract and load sales data
version: "1.0"
concurrency: 1
triggers:
  - type: push
    branch: main
  - type: manual
steps:
  - id: extract
    name: Extract Raw Sales
    config:
      type: extract
      source: sales
      count: 500
    timeout_secs: 120
  - id: transform
    name: Clean Sales Data
    depends_on: [extract]
    config:
      type: transform
      input: extract
"#;
        let def = parse_flow_yaml(yaml).expect("should parse");
        assert_eq!(def.name, "sales-etl");
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.triggers.len(), 2);
        assert_eq!(def.concurrency, Some(1));

        // Serialize back to YAML and re-parse
        let yaml2 = serialize_flow_yaml(&def).expect("should serialize");
        let def2 = parse_flow_yaml(&yaml2).expect("should re-parse");
        assert_eq!(def2.name, def.name);
        assert_eq!(def2.steps.len(), def.steps.len());
        assert_eq!(def2.triggers.len(), def.triggers.len());
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_validation_rejects_duplicate_step_ids() {
        let def = minimal_flow(
            "test-flow",
            vec![extract_step("step-a", vec![]), extract_step("step-a", vec![])],
        );
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate step ID"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_unknown_dependency() {
        let def = minimal_flow("test-flow", vec![extract_step("step-a", vec!["nonexistent"])]);
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown step"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_empty_flow() {
        let def = minimal_flow("test-flow", vec![]);
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("at least one step"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_missing_triggers() {
        let mut def = minimal_flow("test-flow", vec![extract_step("a", vec![])]);
        def.triggers.clear();
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("at least one trigger"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_invalid_name() {
        let def = minimal_flow("has spaces!", vec![extract_step("a", vec![])]);
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid characters"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_empty_name() {
        let def = minimal_flow("", vec![extract_step("a", vec![])]);
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("must not be empty"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut def = minimal_flow("test-flow", vec![extract_step("a", vec![])]);
        def.timeout_secs = Some(0);
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("timeout must be > 0"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_unknown_input_reference() {
        let mut def = minimal_flow("test-flow", vec![extract_step("clean", vec![])]);
        def.steps[0].config = StepConfig::Transform {
            input: "nonexistent".to_string(),
        };
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown step"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_unknown_confirm_source() {
        let mut def = minimal_flow("test-flow", vec![extract_step("confirm", vec![])]);
        def.steps[0].config = StepConfig::Confirm {
            sources: vec!["missing".to_string()],
        };
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("references unknown step"), "got: {msg}");
    }

    #[test]
    fn test_validation_rejects_zero_extract_count() {
        let mut def = minimal_flow("test-flow", vec![extract_step("extract", vec![])]);
        def.steps[0].config = StepConfig::Extract {
            source: "sales".to_string(),
            count: 0,
        };
        let err = validate_definition(&def).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("zero rows"), "got: {msg}");
    }

    // -----------------------------------------------------------------------
    // Filesystem
    // -----------------------------------------------------------------------

    #[test]
    fn test_save_and_load_flow_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows/test.yaml");

        let def = minimal_flow("test-flow", vec![extract_step("a", vec![])]);
        save_flow_file(&path, &def).expect("should save");

        let loaded = load_flow_file(&path).expect("should load");
        assert_eq!(loaded.name, "test-flow");
        assert_eq!(loaded.steps.len(), 1);
    }

    #[test]
    fn test_discover_flows() {
        let dir = tempfile::tempdir().unwrap();

        let flow1 = minimal_flow("flow-one", vec![extract_step("a", vec![])]);
        let flow2 = minimal_flow("flow-two", vec![extract_step("b", vec![])]);

        save_flow_file(&dir.path().join("f1.yaml"), &flow1).unwrap();
        save_flow_file(&dir.path().join("sub/f2.yml"), &flow2).unwrap();
        std::fs::write(dir.path().join("not-a-flow.yaml"), "key: value").unwrap();

        let found = discover_flows(dir.path()).expect("should discover");
        assert_eq!(found.len(), 2, "should find exactly 2 valid flows");
    }

    #[test]
    fn test_discover_nonexistent_dir() {
        let result = discover_flows(Path::new("/nonexistent/path"));
        assert!(result.is_ok());
        assert!(result.unwrap().is_empty());
    }
}
