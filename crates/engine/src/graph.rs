// SPDX-License-Identifier: MIT

//! The task-graph engine: the top-level type that ties the scheduler, event bus,
//! worker pool, and orchestrator state machine into the operations described in
//! §4.2 — `startExecution`, `markTaskComplete`/`markTaskFailed` with cascading
//! rescheduling, pause/resume/cancel, and signal-driven transitions.

use std::sync::Arc;

use substrate_core::{
    Event, ExecutionLogEntry, LogEventKind, SessionId, SignalKind, TaskId, TaskStatus,
};
use substrate_storage::{exec_log, sessions, tasks, Store};

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::pool::WorkerPool;
use crate::scheduler;
use crate::state::{self, OrchestratorState};

pub struct GraphEngine {
    store: Arc<parking_lot::Mutex<Store>>,
    bus: Arc<EventBus>,
    pool: Arc<WorkerPool>,
    session_id: SessionId,
    max_concurrency: u32,
    state: OrchestratorState,
}

impl GraphEngine {
    pub fn new(
        store: Arc<parking_lot::Mutex<Store>>,
        bus: Arc<EventBus>,
        pool: Arc<WorkerPool>,
        session_id: SessionId,
        max_concurrency: u32,
    ) -> Self {
        Self { store, bus, pool, session_id, max_concurrency, state: OrchestratorState::Idle }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Reconcile tasks left at `running` by an unclean shutdown: no worker pool
    /// survives a process restart, so every such row is a dispatch the engine can no
    /// longer observe finishing. Each one is routed through [`Self::mark_task_failed`]
    /// with a synthetic error, which applies the normal retry-or-terminal-fail rule
    /// and logs the transition like any other failure. Call once, before
    /// [`Self::start_execution`], against a freshly opened store.
    pub fn recover_from_crash(&mut self, now_ms: u64) -> Result<usize, EngineError> {
        let stale: Vec<TaskId> = {
            let store = self.store.lock();
            tasks::list_non_terminal(store.conn(), &self.session_id)?
                .into_iter()
                .filter(|t| t.status == TaskStatus::Running)
                .map(|t| t.id)
                .collect()
        };
        for task_id in &stale {
            self.mark_task_failed(task_id, "worker not found after restart", None, now_ms)?;
        }
        Ok(stale.len())
    }

    /// `Idle -> Loading`, run the initial scheduling pass, `Loading -> Executing`.
    /// Emits `graph:loaded` before scheduling and one `task:ready` per task the
    /// initial pass admits.
    pub fn start_execution(&mut self, now_ms: u64) -> Result<(), EngineError> {
        let mut store = self.store.lock();
        state::transition(&mut store, &self.session_id, &mut self.state, OrchestratorState::Loading, now_ms)?;

        let task_count = tasks::list_for_session(store.conn(), &self.session_id)?.len();
        self.bus.emit(Event::GraphLoaded { session_id: self.session_id.clone(), task_count });

        state::transition(&mut store, &self.session_id, &mut self.state, OrchestratorState::Executing, now_ms)?;
        run_scheduling_pass(
            &mut store,
            &self.bus,
            &self.session_id,
            &mut self.state,
            self.max_concurrency,
            now_ms,
        )
    }

    /// `ready -> queued -> running`. Called exactly once per emitted `task:ready`,
    /// immediately before (queued) and after (running) the dispatcher actually
    /// launches the worker.
    pub fn mark_task_queued(&mut self, task_id: &TaskId, now_ms: u64) -> Result<(), EngineError> {
        let mut store = self.store.lock();
        scheduler::mark_queued(&mut store, &self.session_id, task_id, now_ms)
    }

    pub fn mark_task_running(&mut self, task_id: &TaskId, now_ms: u64) -> Result<(), EngineError> {
        let mut store = self.store.lock();
        scheduler::mark_running(&mut store, &self.session_id, task_id, now_ms)
    }

    /// `running -> completed`, accrue cost, emit `task:complete`, then cascade: a
    /// fresh scheduling pass picks up any dependent whose other dependencies were
    /// already satisfied.
    pub fn mark_task_complete(
        &mut self,
        task_id: &TaskId,
        result: Option<&serde_json::Value>,
        cost_delta_usd: f64,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let mut store = self.store.lock();
        let session_id = self.session_id.clone();
        store.with_transaction(|tx| {
            let entry = ExecutionLogEntry::new(
                session_id.clone(),
                Some(task_id.clone()),
                LogEventKind::TaskStatusChanged,
                Some(TaskStatus::Running.to_string()),
                TaskStatus::Completed.to_string(),
                None,
                Some(cost_delta_usd),
                serde_json::json!({}),
                now_ms,
            );
            exec_log::append(tx, &entry)?;
            tasks::transition_status(tx, task_id, TaskStatus::Completed, now_ms)?;
            tasks::record_completion(tx, task_id, result, None, Some(0), cost_delta_usd, now_ms)?;
            sessions::accrue_cost(tx, &session_id, false, cost_delta_usd, now_ms)?;
            Ok(())
        })?;
        self.bus.emit(Event::TaskComplete { task_id: task_id.clone(), cost_usd: cost_delta_usd });
        run_scheduling_pass(
            &mut store,
            &self.bus,
            &self.session_id,
            &mut self.state,
            self.max_concurrency,
            now_ms,
        )
    }

    /// `running -> pending` (with `retryCount` incremented) if retries remain,
    /// otherwise `running -> failed`. Either way a scheduling pass runs afterward:
    /// a terminal failure may unblock nothing, but a retry returns a slot to the
    /// in-flight/pending pool that another branch of the graph might use.
    pub fn mark_task_failed(
        &mut self,
        task_id: &TaskId,
        error: &str,
        exit_code: Option<i32>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let mut store = self.store.lock();
        let task = tasks::get(store.conn(), task_id)?;
        let will_retry = task.retry_count < task.retry_ceiling;
        let session_id = self.session_id.clone();

        store.with_transaction(|tx| {
            let next = if will_retry { TaskStatus::Pending } else { TaskStatus::Failed };
            let entry = ExecutionLogEntry::new(
                session_id.clone(),
                Some(task_id.clone()),
                LogEventKind::TaskStatusChanged,
                Some(TaskStatus::Running.to_string()),
                next.to_string(),
                None,
                None,
                serde_json::json!({"error": error}),
                now_ms,
            );
            exec_log::append(tx, &entry)?;
            tasks::transition_status(tx, task_id, next, now_ms)?;
            tasks::record_completion(tx, task_id, None, Some(error), exit_code, 0.0, now_ms)?;
            if will_retry {
                tasks::increment_retry(tx, task_id, now_ms)?;
            }
            Ok(())
        })?;

        self.bus.emit(Event::TaskFailed {
            task_id: task_id.clone(),
            error: error.to_string(),
            exit_code,
            will_retry,
        });
        run_scheduling_pass(
            &mut store,
            &self.bus,
            &self.session_id,
            &mut self.state,
            self.max_concurrency,
            now_ms,
        )
    }

    /// `Executing -> Paused`. Running subprocesses are unaffected; only scheduling
    /// stops admitting new `task:ready` events until [`Self::resume`].
    pub fn pause(&mut self, now_ms: u64) -> Result<(), EngineError> {
        let mut store = self.store.lock();
        state::transition(&mut store, &self.session_id, &mut self.state, OrchestratorState::Paused, now_ms)?;
        self.bus.emit(Event::GraphPaused { session_id: self.session_id.clone() });
        Ok(())
    }

    /// `Paused -> Executing`, then run a scheduling pass immediately so anything
    /// that became ready while paused is emitted right away.
    pub fn resume(&mut self, now_ms: u64) -> Result<(), EngineError> {
        let mut store = self.store.lock();
        state::transition(&mut store, &self.session_id, &mut self.state, OrchestratorState::Executing, now_ms)?;
        self.bus.emit(Event::GraphResumed { session_id: self.session_id.clone() });
        run_scheduling_pass(
            &mut store,
            &self.bus,
            &self.session_id,
            &mut self.state,
            self.max_concurrency,
            now_ms,
        )
    }

    /// `Executing/Paused -> Cancelling`: mark every non-terminal task cancelled (one
    /// log entry each), emit `graph:cancelled` while still Cancelling, terminate
    /// every live subprocess, then `Cancelling -> Idle`.
    pub async fn cancel_all(&mut self, now_ms: u64) -> Result<usize, EngineError> {
        let cancelled_count = {
            let mut store = self.store.lock();
            state::transition(&mut store, &self.session_id, &mut self.state, OrchestratorState::Cancelling, now_ms)?;

            let non_terminal = tasks::list_non_terminal(store.conn(), &self.session_id)?;
            let session_id = self.session_id.clone();
            for task in &non_terminal {
                store.with_transaction(|tx| {
                    let entry = ExecutionLogEntry::new(
                        session_id.clone(),
                        Some(task.id.clone()),
                        LogEventKind::TaskStatusChanged,
                        Some(task.status.to_string()),
                        TaskStatus::Cancelled.to_string(),
                        None,
                        None,
                        serde_json::json!({}),
                        now_ms,
                    );
                    exec_log::append(tx, &entry)?;
                    tasks::transition_status(tx, &task.id, TaskStatus::Cancelled, now_ms)?;
                    Ok(())
                })?;
            }
            self.bus.emit(Event::GraphCancelled {
                session_id: self.session_id.clone(),
                cancelled_tasks: non_terminal.len(),
            });
            non_terminal.len()
        };

        self.pool.terminate_all("graph_cancelled").await;

        let mut store = self.store.lock();
        state::transition(&mut store, &self.session_id, &mut self.state, OrchestratorState::Idle, now_ms)?;
        Ok(cancelled_count)
    }

    /// Route a signal off the out-of-band queue to the matching transition.
    /// `pause`/`resume` are synchronous; `cancel` needs to await subprocess
    /// termination, so callers must match `Cancel` themselves and call
    /// [`Self::cancel_all`] directly.
    pub fn apply_non_cancel_signal(&mut self, kind: SignalKind, now_ms: u64) -> Result<(), EngineError> {
        match kind {
            SignalKind::Pause => self.pause(now_ms),
            SignalKind::Resume => self.resume(now_ms),
            SignalKind::Cancel => Err(EngineError::IllegalState(
                "cancel signals must be routed through cancel_all, not apply_non_cancel_signal".to_string(),
            )),
        }
    }
}

/// Run one scheduling pass, emit `task:ready` for everything it admits, and fold
/// the graph-exhausted case into `Completing -> Idle` with the aggregated
/// `graph:complete` snapshot. Free function (rather than a `GraphEngine` method) so
/// it can be called while the caller already holds the store's lock guard and a
/// disjoint mutable borrow of `state`, without needing a whole `&mut self`.
fn run_scheduling_pass(
    store: &mut Store,
    bus: &EventBus,
    session_id: &SessionId,
    state: &mut OrchestratorState,
    max_concurrency: u32,
    now_ms: u64,
) -> Result<(), EngineError> {
    let pass = scheduler::run_pass(store, session_id, max_concurrency, now_ms)?;
    for task_id in &pass.newly_ready {
        bus.emit(Event::TaskReady { task_id: task_id.clone() });
    }

    if pass.graph_exhausted && *state == OrchestratorState::Executing {
        state::transition(store, session_id, state, OrchestratorState::Completing, now_ms)?;
        let all = tasks::list_for_session(store.conn(), session_id)?;
        let total_tasks = all.len();
        let completed_tasks = all.iter().filter(|t| t.status == TaskStatus::Completed).count();
        let failed_tasks = all.iter().filter(|t| t.status == TaskStatus::Failed).count();
        let total_cost_usd = all.iter().map(|t| t.cumulative_cost_usd).sum();
        bus.emit(Event::GraphComplete {
            session_id: session_id.clone(),
            total_tasks,
            completed_tasks,
            failed_tasks,
            total_cost_usd,
        });
        state::transition(store, session_id, state, OrchestratorState::Idle, now_ms)?;
    }
    Ok(())
}
