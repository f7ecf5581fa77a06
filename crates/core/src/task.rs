// SPDX-License-Identifier: MIT

//! Task: a single unit of agent work, and its strict status transition graph.

use crate::error::CoreError;
use crate::ids::{SessionId, TaskId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Ready => "ready",
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    /// Validate a transition against the strict status graph:
    /// pending -> ready -> queued -> running -> {completed, failed, pending (retry)}
    /// any non-terminal -> cancelled.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, Queued)
                | (Queued, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Pending) // retry
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Coding,
    Testing,
    Docs,
    Debugging,
    Refactoring,
}

crate::simple_display! {
    TaskType {
        Coding => "coding",
        Testing => "testing",
        Docs => "docs",
        Debugging => "debugging",
        Refactoring => "refactoring",
    }
}

impl std::str::FromStr for TaskType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coding" => Ok(TaskType::Coding),
            "testing" => Ok(TaskType::Testing),
            "docs" => Ok(TaskType::Docs),
            "debugging" => Ok(TaskType::Debugging),
            "refactoring" => Ok(TaskType::Refactoring),
            other => Err(CoreError::Validation(format!("unknown task type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub session_id: SessionId,
    /// Short slug, unique within the session (the graph file's task key).
    pub key: String,
    pub name: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub task_type: TaskType,
    pub adapter_id: Option<String>,
    pub model_hint: Option<String>,
    pub worker_id: Option<String>,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub result_payload: Option<serde_json::Value>,
    pub error_text: Option<String>,
    pub exit_code: Option<i32>,
    pub retry_count: u32,
    pub retry_ceiling: u32,
    pub budget_usd: Option<f64>,
    pub cumulative_cost_usd: f64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        key: impl Into<String>,
        name: impl Into<String>,
        prompt: impl Into<String>,
        task_type: TaskType,
        retry_ceiling: u32,
        budget_usd: Option<f64>,
        adapter_id: Option<String>,
        model_hint: Option<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: TaskId::new(),
            session_id,
            key: key.into(),
            name: name.into(),
            prompt: prompt.into(),
            status: TaskStatus::Pending,
            task_type,
            adapter_id,
            model_hint,
            worker_id: None,
            started_at_ms: None,
            completed_at_ms: None,
            result_payload: None,
            error_text: None,
            exit_code: None,
            retry_count: 0,
            retry_ceiling,
            budget_usd,
            cumulative_cost_usd: 0.0,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Directed edge "task depends_on task". Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub session_id: SessionId,
    pub task_id: TaskId,
    pub depends_on: TaskId,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
