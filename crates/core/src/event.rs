// SPDX-License-Identifier: MIT

//! The `Event` enum carries every topic the event bus can deliver.
//! One variant per topic; payload fields are concrete rather than a generic envelope
//! so downstream assertions can pattern-match directly.

use crate::ids::{SessionId, StoryId, TaskId, WorkerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic", content = "data", rename_all = "snake_case")]
pub enum Event {
    #[serde(rename = "task:ready")]
    TaskReady { task_id: TaskId },
    #[serde(rename = "task:complete")]
    TaskComplete { task_id: TaskId, cost_usd: f64 },
    #[serde(rename = "task:failed")]
    TaskFailed { task_id: TaskId, error: String, exit_code: Option<i32>, will_retry: bool },

    #[serde(rename = "worker:spawned")]
    WorkerSpawned { worker_id: WorkerId, task_id: TaskId },
    #[serde(rename = "worker:terminated")]
    WorkerTerminated { worker_id: WorkerId, reason: String },

    #[serde(rename = "graph:loaded")]
    GraphLoaded { session_id: SessionId, task_count: usize },
    #[serde(rename = "graph:paused")]
    GraphPaused { session_id: SessionId },
    #[serde(rename = "graph:resumed")]
    GraphResumed { session_id: SessionId },
    #[serde(rename = "graph:cancelled")]
    GraphCancelled { session_id: SessionId, cancelled_tasks: usize },
    #[serde(rename = "graph:complete")]
    GraphComplete {
        session_id: SessionId,
        total_tasks: usize,
        completed_tasks: usize,
        failed_tasks: usize,
        total_cost_usd: f64,
    },

    #[serde(rename = "orchestrator:started")]
    OrchestratorStarted { session_id: SessionId },
    #[serde(rename = "orchestrator:story-phase-complete")]
    OrchestratorStoryPhaseComplete { story_id: StoryId, phase: String },
    #[serde(rename = "orchestrator:story-complete")]
    OrchestratorStoryComplete { story_id: StoryId },
    #[serde(rename = "orchestrator:story-escalated")]
    OrchestratorStoryEscalated { story_id: StoryId, verdict: String, issues: Vec<String> },
    #[serde(rename = "orchestrator:paused")]
    OrchestratorPaused { session_id: SessionId },
    #[serde(rename = "orchestrator:resumed")]
    OrchestratorResumed { session_id: SessionId },
    #[serde(rename = "orchestrator:complete")]
    OrchestratorComplete { session_id: SessionId },

    #[serde(rename = "session:pause:requested")]
    SessionPauseRequested { session_id: SessionId },
    #[serde(rename = "session:resume:requested")]
    SessionResumeRequested { session_id: SessionId },
    #[serde(rename = "session:cancel:requested")]
    SessionCancelRequested { session_id: SessionId },
}

impl Event {
    /// The bus topic string, used both for subscriber routing and NDJSON output
    /// (`--output-format json` emits one `{event, timestamp, data}` object per line).
    pub fn topic(&self) -> &'static str {
        use Event::*;
        match self {
            TaskReady { .. } => "task:ready",
            TaskComplete { .. } => "task:complete",
            TaskFailed { .. } => "task:failed",
            WorkerSpawned { .. } => "worker:spawned",
            WorkerTerminated { .. } => "worker:terminated",
            GraphLoaded { .. } => "graph:loaded",
            GraphPaused { .. } => "graph:paused",
            GraphResumed { .. } => "graph:resumed",
            GraphCancelled { .. } => "graph:cancelled",
            GraphComplete { .. } => "graph:complete",
            OrchestratorStarted { .. } => "orchestrator:started",
            OrchestratorStoryPhaseComplete { .. } => "orchestrator:story-phase-complete",
            OrchestratorStoryComplete { .. } => "orchestrator:story-complete",
            OrchestratorStoryEscalated { .. } => "orchestrator:story-escalated",
            OrchestratorPaused { .. } => "orchestrator:paused",
            OrchestratorResumed { .. } => "orchestrator:resumed",
            OrchestratorComplete { .. } => "orchestrator:complete",
            SessionPauseRequested { .. } => "session:pause:requested",
            SessionResumeRequested { .. } => "session:resume:requested",
            SessionCancelRequested { .. } => "session:cancel:requested",
        }
    }
}
