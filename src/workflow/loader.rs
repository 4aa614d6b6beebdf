//! YAML workflow definitions and structural validation.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Deserialize;

use crate::ids::Id;

use super::model::{Workflow, WorkflowStep};
use super::WorkflowError;

#[derive(Debug, Deserialize)]
struct WorkflowDocument {
    name: String,
    #[serde(default)]
    description: String,
    version: String,
    steps: Vec<WorkflowStep>,
}

/// Parses and validates a workflow definition, assigning a fresh [`Id`] and
/// creation timestamp. Validation: non-empty name, at least one step,
/// unique step ids, every `depends_on` target exists, and the dependency
/// graph is acyclic.
pub fn load(yaml: &str) -> Result<Workflow, WorkflowError> {
    let doc: WorkflowDocument = serde_yaml::from_str(yaml).map_err(|e| WorkflowError::InvalidDefinition(e.to_string()))?;

    if doc.name.trim().is_empty() {
        return Err(WorkflowError::InvalidDefinition("name must not be empty".into()));
    }
    if doc.steps.is_empty() {
        return Err(WorkflowError::InvalidDefinition("workflow must declare at least one step".into()));
    }

    let mut seen = HashSet::new();
    for step in &doc.steps {
        if !seen.insert(step.id.clone()) {
            return Err(WorkflowError::DuplicateStepId(step.id.clone()));
        }
    }
    let ids: HashSet<&str> = doc.steps.iter().map(|s| s.id.as_str()).collect();
    for step in &doc.steps {
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(WorkflowError::UnknownDependency(step.id.clone(), dep.clone()));
            }
        }
    }
    detect_cycle(&doc.steps)?;

    Ok(Workflow {
        id: Id::new(),
        name: doc.name,
        description: doc.description,
        version: doc.version,
        steps: doc.steps,
        created_at: Utc::now(),
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS with recursion-stack coloring: a `Gray` node reached again means a
/// back-edge, i.e. a cycle.
fn detect_cycle(steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
    let by_id: HashMap<&str, &WorkflowStep> = steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut color: HashMap<&str, Color> = steps.iter().map(|s| (s.id.as_str(), Color::White)).collect();

    fn visit<'a>(
        node: &'a str,
        by_id: &HashMap<&'a str, &'a WorkflowStep>,
        color: &mut HashMap<&'a str, Color>,
    ) -> Result<(), WorkflowError> {
        color.insert(node, Color::Gray);
        if let Some(step) = by_id.get(node) {
            for dep in &step.depends_on {
                match color.get(dep.as_str()) {
                    Some(Color::Gray) => {
                        return Err(WorkflowError::CircularDependency(format!("{node} -> {dep}")));
                    }
                    Some(Color::White) | None => visit(dep, by_id, color)?,
                    Some(Color::Black) => {}
                }
            }
        }
        color.insert(node, Color::Black);
        Ok(())
    }

    for step in steps {
        if color.get(step.id.as_str()) == Some(&Color::White) {
            visit(&step.id, &by_id, &mut color)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name: deploy
version: "1"
steps:
  - id: build
    type: shell
    config: { command: "make build" }
  - id: test
    type: shell
    depends_on: [build]
    config: { command: "make test" }
"#;

    #[test]
    fn loads_a_valid_workflow() {
        let wf = load(VALID).unwrap();
        assert_eq!(wf.steps.len(), 2);
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let yaml = r#"
name: x
version: "1"
steps:
  - id: a
    type: shell
    config: {}
  - id: a
    type: shell
    config: {}
"#;
        assert!(matches!(load(yaml), Err(WorkflowError::DuplicateStepId(_))));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let yaml = r#"
name: x
version: "1"
steps:
  - id: a
    type: shell
    depends_on: [missing]
    config: {}
"#;
        assert!(matches!(load(yaml), Err(WorkflowError::UnknownDependency(_, _))));
    }

    #[test]
    fn rejects_circular_dependency() {
        let yaml = r#"
name: x
version: "1"
steps:
  - id: a
    type: shell
    depends_on: [b]
    config: {}
  - id: b
    type: shell
    depends_on: [a]
    config: {}
"#;
        assert!(matches!(load(yaml), Err(WorkflowError::CircularDependency(_))));
    }
}
