// SPDX-License-Identifier: MIT

//! A story: one unit of the implementation pipeline, layered over the task rows that
//! actually do the work. There is no separate stories table — a story's identity and
//! phase history live entirely in the intent log, keyed by the story's dev task.

use serde::{Deserialize, Serialize};

use substrate_core::{ExecutionLogEntry, LogEventKind, SessionId, StoryId, TaskId};
use substrate_storage::{exec_log, Store};

use crate::error::OrchestratorError;
use crate::review::ReviewVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Pending,
    InStoryCreation,
    InDev,
    InReview,
    Complete,
    Escalated,
}

impl StoryStatus {
    fn can_transition_to(self, next: StoryStatus) -> bool {
        use StoryStatus::*;
        matches!(
            (self, next),
            (Pending, InStoryCreation)
                | (InStoryCreation, InDev)
                | (InStoryCreation, Escalated)
                | (InDev, InReview)
                | (InDev, Escalated)
                | (InReview, Complete)
                | (InReview, InDev) // NEEDS_MINOR_FIXES / NEEDS_MAJOR_REWORK re-review cycle
                | (InReview, Escalated)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoryStatus::Pending => "pending",
            StoryStatus::InStoryCreation => "in_story_creation",
            StoryStatus::InDev => "in_dev",
            StoryStatus::InReview => "in_review",
            StoryStatus::Complete => "complete",
            StoryStatus::Escalated => "escalated",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StoryStatus::Complete | StoryStatus::Escalated)
    }
}

/// One story in the pipeline. `dev_task_id` anchors every intent-log entry written
/// for this story; `review_task_id` is set once the first review dispatch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    /// Slug used for conflict-group partitioning; usually the same key the graph
    /// file gave the dev task.
    pub key: String,
    pub dev_task_id: TaskId,
    pub review_task_id: Option<TaskId>,
    pub status: StoryStatus,
    pub review_cycles: u32,
    pub last_verdict: Option<ReviewVerdict>,
    pub last_issues: Vec<String>,
}

impl Story {
    pub fn new(key: impl Into<String>, dev_task_id: TaskId) -> Self {
        Self {
            id: StoryId::new(),
            key: key.into(),
            dev_task_id,
            review_task_id: None,
            status: StoryStatus::Pending,
            review_cycles: 0,
            last_verdict: None,
            last_issues: Vec::new(),
        }
    }
}

/// Validate and apply a story transition, writing a `story_status_changed` log entry
/// keyed by the story's dev task before mutating in-memory state. Any transition not
/// in the table above fails with `IllegalState` and leaves `story` untouched.
pub fn transition(
    store: &mut Store,
    session_id: &SessionId,
    story: &mut Story,
    next: StoryStatus,
    now_ms: u64,
) -> Result<(), OrchestratorError> {
    if !story.status.can_transition_to(next) {
        return Err(OrchestratorError::IllegalState(format!(
            "story {} cannot transition from {} to {}",
            story.id,
            story.status.as_str(),
            next.as_str()
        )));
    }
    let prior = story.status;
    store.with_transaction(|tx| {
        let entry = ExecutionLogEntry::new(
            session_id.clone(),
            Some(story.dev_task_id.clone()),
            LogEventKind::StoryStatusChanged,
            Some(prior.as_str().to_string()),
            next.as_str().to_string(),
            None,
            None,
            serde_json::json!({"story_id": story.id.to_string()}),
            now_ms,
        );
        exec_log::append(tx, &entry)
    })?;
    story.status = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use substrate_core::Session;
    use substrate_storage::sessions;

    fn seed_session(store: &mut Store) -> SessionId {
        let session = Session::new("demo", "g.yaml", "main", None, serde_json::json!({}), 0);
        sessions::insert(store.conn(), &session).unwrap();
        session.id
    }

    #[test]
    fn pending_to_in_dev_is_rejected_without_story_creation() {
        let mut store = Store::open_in_memory().unwrap();
        let session_id = seed_session(&mut store);
        let mut story = Story::new("auth-login", TaskId::new());
        let err = transition(&mut store, &session_id, &mut story, StoryStatus::InDev, 0).unwrap_err();
        assert!(matches!(err, OrchestratorError::IllegalState(_)));
        assert_eq!(story.status, StoryStatus::Pending);
    }

    #[test]
    fn happy_path_round_trip_to_complete() {
        let mut store = Store::open_in_memory().unwrap();
        let session_id = seed_session(&mut store);
        let mut story = Story::new("auth-login", TaskId::new());
        for next in [
            StoryStatus::InStoryCreation,
            StoryStatus::InDev,
            StoryStatus::InReview,
            StoryStatus::Complete,
        ] {
            transition(&mut store, &session_id, &mut story, next, 0).unwrap();
        }
        assert_eq!(story.status, StoryStatus::Complete);
    }

    #[test]
    fn review_cycle_returns_to_in_dev_then_escalates_on_exhaustion() {
        let mut store = Store::open_in_memory().unwrap();
        let session_id = seed_session(&mut store);
        let mut story = Story::new("auth-login", TaskId::new());
        transition(&mut store, &session_id, &mut story, StoryStatus::InStoryCreation, 0).unwrap();
        transition(&mut store, &session_id, &mut story, StoryStatus::InDev, 0).unwrap();
        transition(&mut store, &session_id, &mut story, StoryStatus::InReview, 0).unwrap();
        transition(&mut store, &session_id, &mut story, StoryStatus::InDev, 0).unwrap();
        transition(&mut store, &session_id, &mut story, StoryStatus::InReview, 0).unwrap();
        transition(&mut store, &session_id, &mut story, StoryStatus::Escalated, 0).unwrap();
        assert_eq!(story.status, StoryStatus::Escalated);
    }
}
