// SPDX-License-Identifier: MIT

//! Semantic validation of a parsed [`GraphDocument`]: version support, non-empty
//! task set, dangling dependencies, unknown task types, and dependency cycles.
//!
//! Cycle detection is a DFS over the dependency edges with three colors (white /
//! gray / black): a gray node reached again is a back edge, i.e. a cycle.

use std::collections::HashMap;
use std::str::FromStr;

use substrate_core::TaskType;

use crate::document::{GraphDocument, SUPPORTED_VERSIONS};
use crate::error::GraphError;

pub fn validate(doc: &GraphDocument) -> Result<(), GraphError> {
    if !SUPPORTED_VERSIONS.contains(&doc.version.as_str()) {
        return Err(GraphError::Validation(format!("unsupported graph version: {}", doc.version)));
    }
    if doc.tasks.is_empty() {
        return Err(GraphError::Validation("graph has no tasks".to_string()));
    }
    for (key, task) in &doc.tasks {
        TaskType::from_str(&task.task_type)
            .map_err(|_| GraphError::Validation(format!("task {key}: unknown task type {}", task.task_type)))?;
        for dep in &task.depends_on {
            if !doc.tasks.contains_key(dep) {
                return Err(GraphError::Validation(format!("task {key}: depends_on unknown task {dep}")));
            }
        }
    }
    detect_cycle(doc)
}

fn detect_cycle(doc: &GraphDocument) -> Result<(), GraphError> {
    const WHITE: u8 = 0;

    let mut color: HashMap<&str, u8> = doc.tasks.keys().map(|k| (k.as_str(), WHITE)).collect();
    for key in doc.tasks.keys() {
        if color[key.as_str()] == WHITE && visit(doc, key, &mut color) {
            return Err(GraphError::Validation(format!("dependency cycle detected involving task {key}")));
        }
    }
    Ok(())
}

fn visit<'a>(doc: &'a GraphDocument, key: &'a str, color: &mut HashMap<&'a str, u8>) -> bool {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    color.insert(key, GRAY);
    if let Some(task) = doc.tasks.get(key) {
        for dep in &task.depends_on {
            match color.get(dep.as_str()).copied() {
                Some(GRAY) => return true,
                Some(WHITE) | None => {
                    if visit(doc, dep.as_str(), color) {
                        return true;
                    }
                }
                _ => {}
            }
        }
    }
    color.insert(key, BLACK);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{SessionDef, TaskDef};
    use std::collections::BTreeMap;

    fn task(name: &str, depends_on: &[&str]) -> TaskDef {
        TaskDef {
            name: name.to_string(),
            prompt: "do it".to_string(),
            task_type: "coding".to_string(),
            description: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            budget_usd: None,
            agent: None,
            model: None,
        }
    }

    fn doc(tasks: BTreeMap<String, TaskDef>) -> GraphDocument {
        GraphDocument { version: "1".to_string(), session: SessionDef { name: "demo".to_string(), budget_usd: None }, tasks }
    }

    #[test]
    fn rejects_an_unsupported_version() {
        let mut d = doc(BTreeMap::from([("a".to_string(), task("a", &[]))]));
        d.version = "2".to_string();
        assert!(matches!(validate(&d).unwrap_err(), GraphError::Validation(_)));
    }

    #[test]
    fn rejects_an_empty_task_graph() {
        let d = doc(BTreeMap::new());
        assert!(matches!(validate(&d).unwrap_err(), GraphError::Validation(_)));
    }

    #[test]
    fn rejects_a_dangling_dependency() {
        let d = doc(BTreeMap::from([("a".to_string(), task("a", &["missing"]))]));
        assert!(matches!(validate(&d).unwrap_err(), GraphError::Validation(_)));
    }

    #[test]
    fn rejects_an_unknown_task_type() {
        let mut t = task("a", &[]);
        t.task_type = "sorcery".to_string();
        let d = doc(BTreeMap::from([("a".to_string(), t)]));
        assert!(matches!(validate(&d).unwrap_err(), GraphError::Validation(_)));
    }

    #[yare::parameterized(
        two_cycle = { vec![("a", vec!["b"]), ("b", vec!["a"])] },
        self_cycle = { vec![("a", vec!["a"])] },
        three_cycle = { vec![("a", vec!["b"]), ("b", vec!["c"]), ("c", vec!["a"])] },
    )]
    fn rejects_cyclic_graphs(edges: Vec<(&str, Vec<&str>)>) {
        let tasks = edges.into_iter().map(|(k, deps)| (k.to_string(), task(k, &deps))).collect();
        let d = doc(tasks);
        assert!(matches!(validate(&d).unwrap_err(), GraphError::Validation(_)));
    }

    #[test]
    fn accepts_a_diamond_dependency() {
        let d = doc(BTreeMap::from([
            ("a".to_string(), task("a", &[])),
            ("b".to_string(), task("b", &["a"])),
            ("c".to_string(), task("c", &["a"])),
            ("d".to_string(), task("d", &["b", "c"])),
        ]));
        assert!(validate(&d).is_ok());
    }
}
