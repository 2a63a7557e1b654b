//! DAG builder, cycle detection, and parallel wave computation.
//!
//! Uses `petgraph` to model step dependencies as a directed graph. Topological
//! sort detects cycles, and depth-based grouping produces parallel execution
//! waves where all steps in a wave can run concurrently.
//!
//! Waves are computed purely from the definition, so the same definition
//! always yields the same plan -- re-running a flow replays the same ordered
//! sequence of external calls.

use std::collections::HashMap;

use lamel_types::flow::StepDefinition;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::definition::FlowError;

// ---------------------------------------------------------------------------
// Execution plan (wave computation)
// ---------------------------------------------------------------------------

/// Build an execution plan from flow steps, grouping them into parallel waves.
///
/// Each wave contains steps that can execute concurrently because all their
/// dependencies are satisfied by prior waves. The algorithm:
///
/// 1. Build a `DiGraph` with step IDs as nodes and `depends_on` edges.
/// 2. Run `petgraph::algo::toposort` to verify acyclicity.
/// 3. Compute each node's depth (max dependency depth + 1).
/// 4. Group steps by depth into waves, preserving definition order.
///
/// Returns `Vec<Vec<&StepDefinition>>` where index 0 is the first wave.
pub fn build_execution_plan<'a>(
    steps: &'a [StepDefinition],
) -> Result<Vec<Vec<&'a StepDefinition>>, FlowError> {
    if steps.is_empty() {
        return Ok(vec![]);
    }

    let id_to_step: HashMap<&str, &StepDefinition> =
        steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let id_to_idx: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    // Build directed graph: edge from dependency -> dependent
    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = steps.iter().map(|s| graph.add_node(s.id.as_str())).collect();

    for step in steps {
        let to_idx = id_to_idx[step.id.as_str()];
        for dep in &step.depends_on {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                FlowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                ))
            })?;
            graph.add_edge(node_indices[*from_idx], node_indices[to_idx], ());
        }
    }

    // Topological sort -- detects cycles
    let sorted = toposort(&graph, None).map_err(|cycle| {
        let node_id = graph[cycle.node_id()];
        FlowError::CycleDetected(format!("cycle detected involving step '{}'", node_id))
    })?;

    // Compute depth for each node: root nodes have depth 0
    let mut depths: HashMap<&str, usize> = HashMap::new();
    for &node_idx in &sorted {
        let step_id = graph[node_idx];
        let step = id_to_step[step_id];
        let depth = if step.depends_on.is_empty() {
            0
        } else {
            step.depends_on
                .iter()
                .map(|dep| depths.get(dep.as_str()).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0)
        };
        depths.insert(step_id, depth);
    }

    // Group by depth into waves (iteration over `steps` keeps definition order)
    let max_depth = depths.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&StepDefinition>> = vec![vec![]; max_depth + 1];
    for step in steps {
        let depth = depths[step.id.as_str()];
        waves[depth].push(step);
    }

    Ok(waves)
}

// ---------------------------------------------------------------------------
// DAG validation (lighter weight, no wave computation)
// ---------------------------------------------------------------------------

/// Validate that steps form a valid DAG (no cycles, all references exist).
pub fn validate_dag(steps: &[StepDefinition]) -> Result<(), FlowError> {
    build_execution_plan(steps).map(|_| ())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lamel_types::flow::StepConfig;

    /// Helper: build a simple extract step with given ID and dependencies.
    fn step(id: &str, depends_on: Vec<&str>) -> StepDefinition {
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
    // Wave computation
    // -----------------------------------------------------------------------

    #[test]
    fn test_no_dependencies_single_wave() {
        let steps = vec![step("a", vec![]), step("b", vec![]), step("c", vec![])];
        let waves = build_execution_plan(&steps).unwrap();
        assert_eq!(waves.len(), 1, "all independent steps -> single wave");
        assert_eq!(waves[0].len(), 3);
    }

    #[test]
    fn test_linear_chain_n_waves() {
        // extract -> transform -> model
        let steps = vec![
            step("extract", vec![]),
            step("transform", vec!["extract"]),
            step("model", vec!["transform"]),
        ];
        let waves = build_execution_plan(&steps).unwrap();
        assert_eq!(waves.len(), 3, "linear chain -> 3 waves");
        assert_eq!(waves[0][0].id, "extract");
        assert_eq!(waves[1][0].id, "transform");
        assert_eq!(waves[2][0].id, "model");
    }

    #[test]
    fn test_fan_out_uploads_share_wave() {
        // model -> {upload-a, upload-b, upload-c} -> confirm
        let steps = vec![
            step("model", vec![]),
            step("upload-a", vec!["model"]),
            step("upload-b", vec!["model"]),
            step("upload-c", vec!["model"]),
            step("confirm", vec!["upload-a", "upload-b", "upload-c"]),
        ];
        let waves = build_execution_plan(&steps).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[1].len(), 3, "all uploads run concurrently");
        assert_eq!(waves[2][0].id, "confirm");
    }

    #[test]
    fn test_cycle_detected() {
        let steps = vec![step("a", vec!["b"]), step("b", vec!["a"])];
        let err = build_execution_plan(&steps).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cycle detected"), "got: {msg}");
    }

    #[test]
    fn test_empty_steps() {
        let waves = build_execution_plan(&[]).unwrap();
        assert!(waves.is_empty());
    }

    #[test]
    fn test_unknown_dependency() {
        let steps = vec![step("a", vec!["missing"])];
        let err = build_execution_plan(&steps).unwrap_err();
        assert!(err.to_string().contains("unknown step"));
    }

    // -----------------------------------------------------------------------
    // Determinism: same definition -> identical plan
    // -----------------------------------------------------------------------

    #[test]
    fn test_plan_is_deterministic() {
        let steps = vec![
            step("extract", vec![]),
            step("transform", vec!["extract"]),
            step("model", vec!["transform"]),
            step("upload-a", vec!["model"]),
            step("upload-b", vec!["model"]),
            step("confirm", vec!["upload-a", "upload-b"]),
        ];

        let first: Vec<Vec<String>> = build_execution_plan(&steps)
            .unwrap()
            .iter()
            .map(|wave| wave.iter().map(|s| s.id.clone()).collect())
            .collect();

        for _ in 0..10 {
            let again: Vec<Vec<String>> = build_execution_plan(&steps)
                .unwrap()
                .iter()
                .map(|wave| wave.iter().map(|s| s.id.clone()).collect())
                .collect();
            assert_eq!(again, first, "plan must not vary between runs");
        }
    }

    // -----------------------------------------------------------------------
    // DAG validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_validate_dag_valid() {
        let steps = vec![step("a", vec![]), step("b", vec!["a"])];
        assert!(validate_dag(&steps).is_ok());
    }

    #[test]
    fn test_validate_dag_cycle() {
        let steps = vec![
            step("a", vec!["c"]),
            step("b", vec!["a"]),
            step("c", vec!["b"]),
        ];
        let err = validate_dag(&steps).unwrap_err();
        assert!(err.to_string().contains("cycle detected"));
    }
}
