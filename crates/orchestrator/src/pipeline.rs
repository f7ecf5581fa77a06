// SPDX-License-Identifier: MIT

//! The pipeline orchestrator: drives a list of stories through
//! CREATE -> DEV -> REVIEW with bounded retries, partitioned into conflict groups
//! that run serially within themselves and in parallel across each other. Built on
//! top of [`GraphEngine`] for task-level bookkeeping (completion, retries, cost
//! accrual); the orchestrator owns only the story-phase state machine and the
//! review-cycle/escalation policy layered over it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use substrate_adapters::types::{DispatchOptions, PlanRequest};
use substrate_adapters::{AdapterRegistry, WorkerAdapter};
use substrate_core::{
    Event, ExecutionLogEntry, LogEventKind, SessionId, StoryId, Task, TaskId, TaskStatus, TaskType,
};
use substrate_engine::{dispatch, DispatchOutcome, DispatchRequest, DispatchStatus, EventBus, GraphEngine, WorkerPool};
use substrate_storage::{exec_log, tasks, Store};

use crate::conflict_group::partition_into_groups;
use crate::error::OrchestratorError;
use crate::output_contract::recover_output_contract;
use crate::review::{parse_review_output, ReviewVerdict};
use crate::story::{self, Story, StoryStatus};

pub struct PipelineConfig {
    pub max_concurrency: u32,
    pub max_review_cycles: u32,
    pub project_root: PathBuf,
    /// Explicit story-key -> conflict-group overrides; see [`crate::conflict_group`].
    pub conflict_groups: HashMap<String, String>,
}

/// Serialisable snapshot of one story, the unit `getStatus` reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorySnapshot {
    pub id: StoryId,
    pub key: String,
    pub status: StoryStatus,
    pub review_cycles: u32,
    pub last_verdict: Option<ReviewVerdict>,
    pub last_issues: Vec<String>,
}

impl From<&Story> for StorySnapshot {
    fn from(story: &Story) -> Self {
        Self {
            id: story.id.clone(),
            key: story.key.clone(),
            status: story.status,
            review_cycles: story.review_cycles,
            last_verdict: story.last_verdict,
            last_issues: story.last_issues.clone(),
        }
    }
}

/// Snapshot returned by [`PipelineOrchestrator::get_status`] and reloadable by
/// session id on restart — the CLI persists it to disk next to `.substrate/state.db`
/// after every phase transition so a restart can pick an in-flight run back up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub session_id: SessionId,
    pub paused: bool,
    pub stories: Vec<StorySnapshot>,
}

pub struct PipelineOrchestrator {
    store: Arc<parking_lot::Mutex<Store>>,
    bus: Arc<EventBus>,
    pool: Arc<WorkerPool>,
    engine: GraphEngine,
    registry: Arc<AdapterRegistry>,
    session_id: SessionId,
    config: PipelineConfig,
    stories: Vec<Story>,
    paused: bool,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<parking_lot::Mutex<Store>>,
        bus: Arc<EventBus>,
        pool: Arc<WorkerPool>,
        registry: Arc<AdapterRegistry>,
        session_id: SessionId,
        config: PipelineConfig,
    ) -> Self {
        let engine =
            GraphEngine::new(store.clone(), bus.clone(), pool.clone(), session_id.clone(), config.max_concurrency);
        Self { store, bus, pool, engine, registry, session_id, config, stories: Vec::new(), paused: false }
    }

    pub fn get_status(&self) -> PipelineStatus {
        PipelineStatus {
            session_id: self.session_id.clone(),
            paused: self.paused,
            stories: self.stories.iter().map(StorySnapshot::from).collect(),
        }
    }

    /// Reload a previously persisted snapshot — the counterpart to `get_status`,
    /// used by a restarted process before it has replayed any story into memory of
    /// its own.
    pub fn reload_status(snapshot: &PipelineStatus) -> Vec<StorySnapshot> {
        snapshot.stories.clone()
    }

    /// `pause()`: ongoing dispatches are left to finish, but the caller's own group
    /// loop must check [`Self::is_paused`] before starting a new story.
    pub fn pause(&mut self) {
        self.paused = true;
        self.bus.emit(Event::OrchestratorPaused { session_id: self.session_id.clone() });
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.bus.emit(Event::OrchestratorResumed { session_id: self.session_id.clone() });
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Dispatch a planning request through `adapter`, insert the resulting dev task,
    /// and register a new story anchored on it. On a dispatch or parse failure the
    /// story never reaches `InDev` or `InReview` — it escalates immediately, per the
    /// rule that create-story errors skip straight to escalation without attempting
    /// dev/review.
    pub async fn create_story_from_plan(
        &mut self,
        key: &str,
        adapter: &dyn WorkerAdapter,
        request: &PlanRequest,
        working_directory: &str,
        retry_ceiling: u32,
        now_ms: u64,
    ) -> Result<StoryId, OrchestratorError> {
        let options = DispatchOptions { working_directory: working_directory.to_string(), ..Default::default() };
        let recipe = adapter
            .build_planning_command(request, &options)
            .map_err(|e| OrchestratorError::Dispatch(e.to_string()))?;
        let (worker_id, child) = self.pool.spawn(TaskId::new(), &recipe)?;
        let output = child.wait_with_output().await?;
        self.pool.release(&worker_id);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let parsed = adapter.parse_plan_output(&stdout, &stderr, output.status.code());

        if !parsed.success || parsed.tasks.is_empty() {
            let reason = parsed.error.unwrap_or_else(|| "planning agent produced no tasks".to_string());
            let mut story = Story::new(key, TaskId::new());
            self.escalate_unborn_story(&mut story, &reason, now_ms)?;
            let id = story.id.clone();
            self.stories.push(story);
            return Ok(id);
        }

        let plan_task = &parsed.tasks[0];
        let dev_task = Task::new(
            self.session_id.clone(),
            plan_task.key.clone(),
            plan_task.name.clone(),
            plan_task.prompt.clone(),
            plan_task.task_type,
            retry_ceiling,
            None,
            Some(adapter.id().to_string()),
            None,
            now_ms,
        );
        let dev_task_id = dev_task.id.clone();
        tasks::insert(self.store.lock().conn(), &dev_task)?;

        let mut story = Story::new(key, dev_task_id);
        story::transition(&mut self.store.lock(), &self.session_id, &mut story, StoryStatus::InStoryCreation, now_ms)?;
        story::transition(&mut self.store.lock(), &self.session_id, &mut story, StoryStatus::InDev, now_ms)?;
        self.bus.emit(Event::OrchestratorStoryPhaseComplete {
            story_id: story.id.clone(),
            phase: "story_creation".to_string(),
        });
        let id = story.id.clone();
        self.stories.push(story);
        Ok(id)
    }

    /// Register a story whose dev task already exists (an explicit task from the
    /// loaded graph, rather than one synthesised by a planning dispatch).
    pub fn register_story(
        &mut self,
        key: &str,
        dev_task_id: TaskId,
        now_ms: u64,
    ) -> Result<StoryId, OrchestratorError> {
        let mut story = Story::new(key, dev_task_id);
        story::transition(&mut self.store.lock(), &self.session_id, &mut story, StoryStatus::InStoryCreation, now_ms)?;
        story::transition(&mut self.store.lock(), &self.session_id, &mut story, StoryStatus::InDev, now_ms)?;
        let id = story.id.clone();
        self.stories.push(story);
        Ok(id)
    }

    fn escalate_unborn_story(&self, story: &mut Story, reason: &str, now_ms: u64) -> Result<(), OrchestratorError> {
        story::transition(&mut self.store.lock(), &self.session_id, story, StoryStatus::InStoryCreation, now_ms)?;
        story.last_issues = vec![reason.to_string()];
        story::transition(&mut self.store.lock(), &self.session_id, story, StoryStatus::Escalated, now_ms)?;
        self.bus.emit(Event::OrchestratorStoryEscalated {
            story_id: story.id.clone(),
            verdict: "create_failed".to_string(),
            issues: story.last_issues.clone(),
        });
        Ok(())
    }

    /// Index of `story_id` in `self.stories`. Kept as a plain index rather than a
    /// returned `&mut Story` so callers can interleave it with `self.store`/`self.bus`
    /// access afterward — a method returning `&mut Story` would tie up the whole of
    /// `self` for as long as the reference lives.
    fn story_index(&self, story_id: &StoryId) -> Result<usize, OrchestratorError> {
        self.stories
            .iter()
            .position(|s| &s.id == story_id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("story {story_id}")))
    }

    pub fn story(&self, story_id: &StoryId) -> Result<&Story, OrchestratorError> {
        Ok(&self.stories[self.story_index(story_id)?])
    }

    /// Run the dev phase for `story_id`: dispatch its dev task, recover a missing
    /// structured result via the git working copy, record the outcome through the
    /// engine, then move the story on to `InReview`.
    pub async fn run_dev_phase(
        &mut self,
        story_id: &StoryId,
        adapter: &dyn WorkerAdapter,
        working_directory: &str,
        timeout: Duration,
        now_ms: u64,
    ) -> Result<(), OrchestratorError> {
        let idx = self.story_index(story_id)?;
        let dev_task_id = self.stories[idx].dev_task_id.clone();
        let task = tasks::get(self.store.lock().conn(), &dev_task_id)?;
        advance_task_to_running(&mut self.store.lock(), &self.session_id, &dev_task_id, now_ms)?;

        let request = DispatchRequest {
            task_id: dev_task_id.clone(),
            prompt: task.prompt.clone(),
            task_type: Some(task.task_type),
            working_directory: working_directory.to_string(),
            timeout,
            output_schema: None,
        };
        let outcome = dispatch(&self.pool, adapter, request).await?;

        match outcome.status {
            DispatchStatus::Completed => {
                let result = match outcome.parsed {
                    Some(value) => value,
                    None => recover_output_contract(std::path::Path::new(working_directory)).await?,
                };
                self.engine.mark_task_complete(&dev_task_id, Some(&result), 0.0, now_ms)?;
                story::transition(
                    &mut self.store.lock(),
                    &self.session_id,
                    &mut self.stories[idx],
                    StoryStatus::InReview,
                    now_ms,
                )?;
                self.bus.emit(Event::OrchestratorStoryPhaseComplete {
                    story_id: story_id.clone(),
                    phase: "dev".to_string(),
                });
                Ok(())
            }
            DispatchStatus::Failed | DispatchStatus::TimedOut => {
                self.engine.mark_task_failed(
                    &dev_task_id,
                    outcome.parse_error.as_deref().unwrap_or("dev dispatch failed"),
                    outcome.exit_code,
                    now_ms,
                )?;
                story::transition(
                    &mut self.store.lock(),
                    &self.session_id,
                    &mut self.stories[idx],
                    StoryStatus::Escalated,
                    now_ms,
                )?;
                self.bus.emit(Event::OrchestratorStoryEscalated {
                    story_id: story_id.clone(),
                    verdict: "dev_failed".to_string(),
                    issues: vec![outcome.parse_error.unwrap_or_default()],
                });
                Ok(())
            }
        }
    }

    /// Run the review phase: dispatch a review task against the dev task's recorded
    /// result and apply the verdict. `ShipIt` completes the story; the other two
    /// verdicts send it back to `InDev` for another cycle, unless `maxReviewCycles`
    /// is exhausted, in which case the story escalates with the verdict and issues.
    pub async fn run_review_phase(
        &mut self,
        story_id: &StoryId,
        adapter: &dyn WorkerAdapter,
        review_prompt: &str,
        working_directory: &str,
        timeout: Duration,
        now_ms: u64,
    ) -> Result<(), OrchestratorError> {
        let idx = self.story_index(story_id)?;
        let review_task = Task::new(
            self.session_id.clone(),
            format!("{}-review-{}", self.stories[idx].key, self.stories[idx].review_cycles),
            format!("{} review", self.stories[idx].key),
            review_prompt.to_string(),
            TaskType::Testing,
            0,
            None,
            Some(adapter.id().to_string()),
            None,
            now_ms,
        );
        let review_task_id = review_task.id.clone();
        tasks::insert(self.store.lock().conn(), &review_task)?;
        self.stories[idx].review_task_id = Some(review_task_id.clone());
        advance_task_to_running(&mut self.store.lock(), &self.session_id, &review_task_id, now_ms)?;

        let request = DispatchRequest {
            task_id: review_task_id.clone(),
            prompt: review_prompt.to_string(),
            task_type: Some(TaskType::Testing),
            working_directory: working_directory.to_string(),
            timeout,
            output_schema: Some(serde_json::json!({"required": ["verdict"]})),
        };
        let outcome = dispatch(&self.pool, adapter, request).await?;
        self.apply_review_outcome(story_id, &review_task_id, &outcome, now_ms)
    }

    fn apply_review_outcome(
        &mut self,
        story_id: &StoryId,
        review_task_id: &TaskId,
        outcome: &DispatchOutcome,
        now_ms: u64,
    ) -> Result<(), OrchestratorError> {
        let idx = self.story_index(story_id)?;

        if outcome.status != DispatchStatus::Completed {
            self.engine.mark_task_failed(
                review_task_id,
                outcome.parse_error.as_deref().unwrap_or("review dispatch failed"),
                outcome.exit_code,
                now_ms,
            )?;
            story::transition(
                &mut self.store.lock(),
                &self.session_id,
                &mut self.stories[idx],
                StoryStatus::Escalated,
                now_ms,
            )?;
            self.bus.emit(Event::OrchestratorStoryEscalated {
                story_id: story_id.clone(),
                verdict: "review_dispatch_failed".to_string(),
                issues: vec![outcome.parse_error.clone().unwrap_or_default()],
            });
            return Ok(());
        }

        self.engine.mark_task_complete(review_task_id, outcome.parsed.as_ref(), 0.0, now_ms)?;

        let (verdict, issues) = match parse_review_output(&outcome.parsed) {
            Ok(pair) => pair,
            Err(_) => (ReviewVerdict::NeedsMajorRework, vec!["review output missing or malformed".to_string()]),
        };

        self.stories[idx].last_verdict = Some(verdict);
        self.stories[idx].last_issues = issues.clone();

        if !verdict.requires_another_cycle() {
            story::transition(
                &mut self.store.lock(),
                &self.session_id,
                &mut self.stories[idx],
                StoryStatus::Complete,
                now_ms,
            )?;
            self.bus.emit(Event::OrchestratorStoryComplete { story_id: story_id.clone() });
            return Ok(());
        }

        self.stories[idx].review_cycles += 1;
        if self.stories[idx].review_cycles >= self.config.max_review_cycles {
            story::transition(
                &mut self.store.lock(),
                &self.session_id,
                &mut self.stories[idx],
                StoryStatus::Escalated,
                now_ms,
            )?;
            self.bus.emit(Event::OrchestratorStoryEscalated {
                story_id: story_id.clone(),
                verdict: format!("{verdict:?}"),
                issues,
            });
            return Ok(());
        }

        story::transition(&mut self.store.lock(), &self.session_id, &mut self.stories[idx], StoryStatus::InDev, now_ms)?;
        self.bus.emit(Event::OrchestratorStoryPhaseComplete { story_id: story_id.clone(), phase: "review".to_string() });
        Ok(())
    }

    /// Conflict-group partition of the stories registered so far, for a caller's own
    /// scheduling loop (the CLI's `start` command drives N groups concurrently, each
    /// draining its stories serially).
    pub fn conflict_groups(&self) -> Vec<Vec<StoryId>> {
        partition_into_groups(&self.stories, &self.config.conflict_groups)
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn all_terminal(&self) -> bool {
        !self.stories.is_empty() && self.stories.iter().all(|s| s.status.is_terminal())
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn project_root(&self) -> &PathBuf {
        &self.config.project_root
    }
}

/// Promote a freshly inserted (or post-review-cycle) task straight from `pending` to
/// `running`, logging each hop. The orchestrator dispatches dev/review tasks on its
/// own phase schedule rather than through the scheduler's dependency-driven ready
/// set, but every hop still gets its own intent-log entry ahead of the status write.
fn advance_task_to_running(
    store: &mut Store,
    session_id: &SessionId,
    task_id: &TaskId,
    now_ms: u64,
) -> Result<(), OrchestratorError> {
    for next in [TaskStatus::Ready, TaskStatus::Queued, TaskStatus::Running] {
        let current = tasks::get(store.conn(), task_id)?.status;
        store.with_transaction(|tx| {
            let entry = ExecutionLogEntry::new(
                session_id.clone(),
                Some(task_id.clone()),
                LogEventKind::TaskStatusChanged,
                Some(current.to_string()),
                next.to_string(),
                None,
                None,
                serde_json::json!({}),
                now_ms,
            );
            exec_log::append(tx, &entry)?;
            tasks::transition_status(tx, task_id, next, now_ms)?;
            Ok(())
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use substrate_adapters::FakeAdapter;
    use substrate_core::Session;
    use substrate_storage::sessions;

    fn setup(max_review_cycles: u32) -> (PipelineOrchestrator, tempfile::TempDir) {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("demo", "g.yaml", "main", None, serde_json::json!({}), 0);
        sessions::insert(store.conn(), &session).unwrap();
        let session_id = session.id.clone();
        let store = Arc::new(parking_lot::Mutex::new(store));
        let bus = Arc::new(EventBus::new());
        let pool = Arc::new(WorkerPool::new(bus.clone()));
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FakeAdapter::healthy("fake")));
        let registry = Arc::new(registry);
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            max_concurrency: 2,
            max_review_cycles,
            project_root: tmp.path().to_path_buf(),
            conflict_groups: HashMap::new(),
        };
        (PipelineOrchestrator::new(store, bus, pool, registry, session_id, config), tmp)
    }

    fn seed_dev_task(orch: &PipelineOrchestrator, key: &str) -> TaskId {
        let task =
            Task::new(orch.session_id.clone(), key, key, "implement it", TaskType::Coding, 1, None, None, None, 0);
        tasks::insert(orch.store.lock().conn(), &task).unwrap();
        task.id
    }

    fn seed_review_task(orch: &PipelineOrchestrator, key: &str) -> TaskId {
        let task =
            Task::new(orch.session_id.clone(), key, key, "review it", TaskType::Testing, 0, None, None, None, 0);
        tasks::insert(orch.store.lock().conn(), &task).unwrap();
        task.id
    }

    fn completed_outcome(parsed: serde_json::Value) -> DispatchOutcome {
        DispatchOutcome {
            status: DispatchStatus::Completed,
            exit_code: Some(0),
            output: String::new(),
            parsed: Some(parsed),
            parse_error: None,
            duration_ms: 1,
            token_estimate_total: 1,
        }
    }

    #[tokio::test]
    async fn dev_then_review_ship_it_completes_the_story() {
        let (mut orch, _tmp) = setup(3);
        let dev_task_id = seed_dev_task(&orch, "auth-login");
        let story_id = orch.register_story("auth-login", dev_task_id, 0).unwrap();

        let adapter = FakeAdapter::healthy("fake");
        orch.run_dev_phase(&story_id, &adapter, "/tmp", Duration::from_secs(5), 1).await.unwrap();
        assert_eq!(orch.story(&story_id).unwrap().status, StoryStatus::InReview);

        let review_task_id = seed_review_task(&orch, "auth-login-review-0");
        advance_task_to_running(&mut orch.store.lock(), &orch.session_id.clone(), &review_task_id, 2).unwrap();
        let outcome = completed_outcome(serde_json::json!({"verdict": "ship_it", "issues": []}));
        orch.apply_review_outcome(&story_id, &review_task_id, &outcome, 3).unwrap();
        assert_eq!(orch.story(&story_id).unwrap().status, StoryStatus::Complete);
    }

    #[tokio::test]
    async fn exhausting_review_cycles_escalates() {
        let (mut orch, _tmp) = setup(1);
        let dev_task_id = seed_dev_task(&orch, "auth-login");
        let story_id = orch.register_story("auth-login", dev_task_id, 0).unwrap();

        let adapter = FakeAdapter::healthy("fake");
        orch.run_dev_phase(&story_id, &adapter, "/tmp", Duration::from_secs(5), 1).await.unwrap();

        let review_task_id = seed_review_task(&orch, "auth-login-review-0");
        advance_task_to_running(&mut orch.store.lock(), &orch.session_id.clone(), &review_task_id, 2).unwrap();
        let outcome = completed_outcome(serde_json::json!({"verdict": "needs_minor_fixes", "issues": ["nit"]}));
        orch.apply_review_outcome(&story_id, &review_task_id, &outcome, 3).unwrap();
        assert_eq!(orch.story(&story_id).unwrap().status, StoryStatus::Escalated);
    }

    #[test]
    fn pause_then_resume_toggles_the_flag() {
        let (mut orch, _tmp) = setup(3);
        assert!(!orch.is_paused());
        orch.pause();
        assert!(orch.is_paused());
        orch.resume();
        assert!(!orch.is_paused());
    }

    #[test]
    fn get_status_reflects_registered_stories() {
        let (mut orch, _tmp) = setup(3);
        let dev_task_id = seed_dev_task(&orch, "billing/invoice");
        orch.register_story("billing/invoice", dev_task_id, 0).unwrap();
        let status = orch.get_status();
        assert_eq!(status.stories.len(), 1);
        assert_eq!(status.stories[0].status, StoryStatus::InDev);
    }

    #[test]
    fn conflict_groups_reflect_story_key_prefixes() {
        let (mut orch, _tmp) = setup(3);
        let a = seed_dev_task(&orch, "auth/login");
        let b = seed_dev_task(&orch, "billing/invoice");
        orch.register_story("auth/login", a, 0).unwrap();
        orch.register_story("billing/invoice", b, 0).unwrap();
        assert_eq!(orch.conflict_groups().len(), 2);
    }
}
