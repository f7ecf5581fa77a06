// SPDX-License-Identifier: MIT

//! Turn a validated [`GraphDocument`] into the session/task/dependency rows a
//! caller persists into the store. Keeping this separate from [`crate::load`] lets
//! a caller load+validate once and decide when (and under what session clock) to
//! materialize, rather than tying wall-clock timestamps to parse time.

use std::collections::HashMap;
use std::str::FromStr;

use substrate_core::{Session, Task, TaskDependency, TaskId, TaskType};

use crate::document::GraphDocument;
use crate::error::GraphError;

pub struct MaterializedGraph {
    pub session: Session,
    pub tasks: Vec<Task>,
    pub dependencies: Vec<TaskDependency>,
}

pub fn materialize(
    doc: &GraphDocument,
    graph_source_path: &str,
    base_branch: &str,
    now_ms: u64,
) -> Result<MaterializedGraph, GraphError> {
    let session = Session::new(
        doc.session.name.clone(),
        graph_source_path,
        base_branch,
        doc.session.budget_usd,
        serde_json::json!({}),
        now_ms,
    );

    let mut ids: HashMap<&str, TaskId> = HashMap::new();
    let mut tasks = Vec::with_capacity(doc.tasks.len());
    for (key, def) in &doc.tasks {
        let task_type = TaskType::from_str(&def.task_type)
            .map_err(|_| GraphError::Validation(format!("task {key}: unknown task type {}", def.task_type)))?;
        let task = Task::new(
            session.id.clone(),
            key.clone(),
            def.name.clone(),
            def.prompt.clone(),
            task_type,
            0,
            def.budget_usd,
            def.agent.clone(),
            def.model.clone(),
            now_ms,
        );
        ids.insert(key.as_str(), task.id.clone());
        tasks.push(task);
    }

    let mut dependencies = Vec::new();
    for (key, def) in &doc.tasks {
        let task_id = &ids[key.as_str()];
        for dep_key in &def.depends_on {
            let depends_on = ids
                .get(dep_key.as_str())
                .ok_or_else(|| GraphError::Validation(format!("task {key}: depends_on unknown task {dep_key}")))?;
            dependencies.push(TaskDependency {
                session_id: session.id.clone(),
                task_id: task_id.clone(),
                depends_on: depends_on.clone(),
            });
        }
    }

    Ok(MaterializedGraph { session, tasks, dependencies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{SessionDef, TaskDef};
    use std::collections::BTreeMap;

    fn sample() -> GraphDocument {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "a".to_string(),
            TaskDef {
                name: "Task A".to_string(),
                prompt: "do a".to_string(),
                task_type: "coding".to_string(),
                description: None,
                depends_on: Vec::new(),
                budget_usd: None,
                agent: Some("fake".to_string()),
                model: None,
            },
        );
        tasks.insert(
            "b".to_string(),
            TaskDef {
                name: "Task B".to_string(),
                prompt: "do b".to_string(),
                task_type: "testing".to_string(),
                description: None,
                depends_on: vec!["a".to_string()],
                budget_usd: Some(5.0),
                agent: None,
                model: None,
            },
        );
        GraphDocument {
            version: "1".to_string(),
            session: SessionDef { name: "demo".to_string(), budget_usd: Some(20.0) },
            tasks,
        }
    }

    #[test]
    fn materializes_session_and_tasks() {
        let doc = sample();
        let out = materialize(&doc, "g.yaml", "main", 0).unwrap();
        assert_eq!(out.session.name, "demo");
        assert_eq!(out.session.budget_usd, Some(20.0));
        assert_eq!(out.tasks.len(), 2);
        assert_eq!(out.dependencies.len(), 1);
    }

    #[test]
    fn dependency_edges_reference_the_materialized_task_ids() {
        let doc = sample();
        let out = materialize(&doc, "g.yaml", "main", 0).unwrap();
        let a = out.tasks.iter().find(|t| t.key == "a").unwrap();
        let b = out.tasks.iter().find(|t| t.key == "b").unwrap();
        let edge = &out.dependencies[0];
        assert_eq!(edge.task_id, b.id);
        assert_eq!(edge.depends_on, a.id);
    }
}
