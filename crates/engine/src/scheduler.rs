// SPDX-License-Identifier: MIT

//! The scheduling algorithm: `availableSlots = maxConcurrency - running - inFlight`,
//! where `inFlight` counts tasks promoted to `ready`/`queued` but not yet observed
//! running. Both counts are live queries against the store rather than a separately
//! tracked atomic — the engine's single-threaded cooperative model (no concurrent
//! mutation of the same session) means a query is exactly as correct as an in-memory
//! counter here, and it can never drift out of sync with what crash replay would see.

use rusqlite::Connection;
use substrate_core::{ExecutionLogEntry, LogEventKind, SessionId, Task, TaskId, TaskStatus};
use substrate_storage::{exec_log, tasks, Store, StoreError};

use crate::error::EngineError;

pub fn count_running(conn: &Connection, session_id: &SessionId) -> Result<u32, EngineError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM tasks WHERE session_id = ?1 AND status = 'running'",
            [session_id.as_str()],
            |row| row.get(0),
        )
        .map_err(StoreError::Sql)?;
    Ok(n as u32)
}

pub fn count_in_flight(conn: &Connection, session_id: &SessionId) -> Result<u32, EngineError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM tasks WHERE session_id = ?1 AND status IN ('ready', 'queued')",
            [session_id.as_str()],
            |row| row.get(0),
        )
        .map_err(StoreError::Sql)?;
    Ok(n as u32)
}

/// Outcome of one scheduling pass.
pub struct SchedulingPass {
    /// Tasks just promoted to `ready` this pass, in the order they should be emitted.
    pub newly_ready: Vec<TaskId>,
    /// True if, after this pass, the graph has no ready candidates and no running or
    /// in-flight tasks — the caller should transition Executing -> Completing.
    pub graph_exhausted: bool,
}

/// Run one scheduling pass: promote as many `pending` tasks with satisfied
/// dependencies to `ready` as available slots allow, writing the intent-log entry
/// before each status write in one transaction per task (matching the store's
/// log-then-status discipline).
pub fn run_pass(
    store: &mut Store,
    session_id: &SessionId,
    max_concurrency: u32,
    now_ms: u64,
) -> Result<SchedulingPass, EngineError> {
    let running = count_running(store.conn(), session_id)?;
    let in_flight = count_in_flight(store.conn(), session_id)?;
    let available_slots = max_concurrency.saturating_sub(running).saturating_sub(in_flight);

    let candidates = tasks::ready_candidates(store.conn(), session_id)?;
    if candidates.is_empty() && running == 0 && in_flight == 0 {
        return Ok(SchedulingPass { newly_ready: Vec::new(), graph_exhausted: true });
    }

    let mut newly_ready = Vec::new();
    for task in candidates.iter().take(available_slots as usize) {
        promote_to_ready(store, task, session_id, now_ms)?;
        newly_ready.push(task.id.clone());
    }

    let still_candidates = tasks::ready_candidates(store.conn(), session_id)?;
    let running_now = count_running(store.conn(), session_id)?;
    let in_flight_now = count_in_flight(store.conn(), session_id)?;
    let graph_exhausted = still_candidates.is_empty() && running_now == 0 && in_flight_now == 0;

    Ok(SchedulingPass { newly_ready, graph_exhausted })
}

fn promote_to_ready(
    store: &mut Store,
    task: &Task,
    session_id: &SessionId,
    now_ms: u64,
) -> Result<(), EngineError> {
    store.with_transaction(|tx| {
        let entry = ExecutionLogEntry::new(
            session_id.clone(),
            Some(task.id.clone()),
            LogEventKind::TaskStatusChanged,
            Some(TaskStatus::Pending.to_string()),
            TaskStatus::Ready.to_string(),
            None,
            None,
            serde_json::json!({}),
            now_ms,
        );
        exec_log::append(tx, &entry)?;
        tasks::transition_status(tx, &task.id, TaskStatus::Ready, now_ms)?;
        Ok(())
    })?;
    Ok(())
}

/// Claim a `ready` task for dispatch: `ready -> queued`. Called by the dispatcher
/// immediately before it spawns the worker for that task.
pub fn mark_queued(
    store: &mut Store,
    session_id: &SessionId,
    task_id: &TaskId,
    now_ms: u64,
) -> Result<(), EngineError> {
    transition_with_log(store, session_id, task_id, TaskStatus::Ready, TaskStatus::Queued, now_ms)
}

/// `queued -> running`. External code must call this exactly once per emitted
/// `task:ready` — it is what lets the in-flight count above shrink back to zero.
pub fn mark_running(
    store: &mut Store,
    session_id: &SessionId,
    task_id: &TaskId,
    now_ms: u64,
) -> Result<(), EngineError> {
    transition_with_log(store, session_id, task_id, TaskStatus::Queued, TaskStatus::Running, now_ms)
}

fn transition_with_log(
    store: &mut Store,
    session_id: &SessionId,
    task_id: &TaskId,
    prior: TaskStatus,
    next: TaskStatus,
    now_ms: u64,
) -> Result<(), EngineError> {
    store.with_transaction(|tx| {
        let entry = ExecutionLogEntry::new(
            session_id.clone(),
            Some(task_id.clone()),
            LogEventKind::TaskStatusChanged,
            Some(prior.to_string()),
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
    Ok(())
}
