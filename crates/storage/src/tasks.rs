// SPDX-License-Identifier: MIT

//! Task row mapping, status transitions, and the ready-set query the scheduler polls.

use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use substrate_core::{SessionId, Task, TaskId, TaskStatus, TaskType};
use std::str::FromStr;

fn from_row(row: &Row) -> rusqlite::Result<Task> {
    let status_str: String = row.get("status")?;
    let status = parse_status(&status_str).map_err(to_sql_err)?;
    let task_type_str: String = row.get("task_type")?;
    let task_type = TaskType::from_str(&task_type_str).map_err(to_sql_err)?;
    let result_payload: Option<String> = row.get("result_payload")?;

    Ok(Task {
        id: TaskId::from(row.get::<_, String>("id")?),
        session_id: SessionId::from(row.get::<_, String>("session_id")?),
        key: row.get("key")?,
        name: row.get("name")?,
        prompt: row.get("prompt")?,
        status,
        task_type,
        adapter_id: row.get("adapter_id")?,
        model_hint: row.get("model_hint")?,
        worker_id: row.get("worker_id")?,
        started_at_ms: row.get::<_, Option<i64>>("started_at_ms")?.map(|v| v as u64),
        completed_at_ms: row.get::<_, Option<i64>>("completed_at_ms")?.map(|v| v as u64),
        result_payload: result_payload
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(to_sql_err)?,
        error_text: row.get("error_text")?,
        exit_code: row.get("exit_code")?,
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        retry_ceiling: row.get::<_, i64>("retry_ceiling")? as u32,
        budget_usd: row.get("budget_usd")?,
        cumulative_cost_usd: row.get("cumulative_cost_usd")?,
        created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
        updated_at_ms: row.get::<_, i64>("updated_at_ms")? as u64,
    })
}

fn to_sql_err<E: std::fmt::Display>(e: E) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(e.to_string())),
    )
}

fn parse_status(s: &str) -> Result<TaskStatus, StoreError> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "ready" => Ok(TaskStatus::Ready),
        "queued" => Ok(TaskStatus::Queued),
        "running" => Ok(TaskStatus::Running),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(StoreError::Validation(format!("unknown task status: {other}"))),
    }
}

pub fn insert(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO tasks (id, session_id, key, name, prompt, status, task_type,
            adapter_id, model_hint, worker_id, started_at_ms, completed_at_ms,
            result_payload, error_text, exit_code, retry_count, retry_ceiling,
            budget_usd, cumulative_cost_usd, created_at_ms, updated_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21)",
        params![
            task.id.as_str(),
            task.session_id.as_str(),
            task.key,
            task.name,
            task.prompt,
            task.status.to_string(),
            task.task_type.to_string(),
            task.adapter_id,
            task.model_hint,
            task.worker_id,
            task.started_at_ms.map(|v| v as i64),
            task.completed_at_ms.map(|v| v as i64),
            task.result_payload.as_ref().map(serde_json::to_string).transpose()?,
            task.error_text,
            task.exit_code,
            task.retry_count,
            task.retry_ceiling,
            task.budget_usd,
            task.cumulative_cost_usd,
            task.created_at_ms as i64,
            task.updated_at_ms as i64,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &TaskId) -> Result<Task, StoreError> {
    conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id.as_str()], from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("task {id}")))
}

pub fn list_for_session(conn: &Connection, session_id: &SessionId) -> Result<Vec<Task>, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE session_id = ?1 ORDER BY created_at_ms")?;
    let rows = stmt.query_map(params![session_id.as_str()], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

/// Update status, validating the transition against [`TaskStatus::can_transition_to`].
/// Callers write the preceding intent-log row in the same transaction.
pub fn transition_status(
    conn: &Connection,
    id: &TaskId,
    next: TaskStatus,
    now_ms: u64,
) -> Result<TaskStatus, StoreError> {
    let current = get(conn, id)?.status;
    if !current.can_transition_to(next) {
        return Err(StoreError::Validation(format!(
            "task {id} cannot transition from {current} to {next}"
        )));
    }
    conn.execute(
        "UPDATE tasks SET status = ?1, updated_at_ms = ?2 WHERE id = ?3",
        params![next.to_string(), now_ms as i64, id.as_str()],
    )?;
    Ok(current)
}

#[allow(clippy::too_many_arguments)]
pub fn record_dispatch(
    conn: &Connection,
    id: &TaskId,
    worker_id: &str,
    adapter_id: &str,
    now_ms: u64,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE tasks SET worker_id = ?1, adapter_id = ?2, started_at_ms = ?3, updated_at_ms = ?3
         WHERE id = ?4",
        params![worker_id, adapter_id, now_ms as i64, id.as_str()],
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn record_completion(
    conn: &Connection,
    id: &TaskId,
    result_payload: Option<&serde_json::Value>,
    error_text: Option<&str>,
    exit_code: Option<i32>,
    cost_delta_usd: f64,
    now_ms: u64,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE tasks SET result_payload = ?1, error_text = ?2, exit_code = ?3,
            cumulative_cost_usd = cumulative_cost_usd + ?4, completed_at_ms = ?5,
            updated_at_ms = ?5
         WHERE id = ?6",
        params![
            result_payload.map(serde_json::to_string).transpose()?,
            error_text,
            exit_code,
            cost_delta_usd,
            now_ms as i64,
            id.as_str(),
        ],
    )?;
    Ok(())
}

pub fn increment_retry(conn: &Connection, id: &TaskId, now_ms: u64) -> Result<u32, StoreError> {
    conn.execute(
        "UPDATE tasks SET retry_count = retry_count + 1, updated_at_ms = ?1 WHERE id = ?2",
        params![now_ms as i64, id.as_str()],
    )?;
    let retry_count: i64 =
        conn.query_row("SELECT retry_count FROM tasks WHERE id = ?1", params![id.as_str()], |r| {
            r.get(0)
        })?;
    Ok(retry_count as u32)
}

/// Tasks that are `pending` with every dependency `completed`: the scheduler's
/// candidate set for promotion to `ready` on each pass. Ordered by insertion so a
/// scheduling pass that can't admit every candidate truncates deterministically.
pub fn ready_candidates(conn: &Connection, session_id: &SessionId) -> Result<Vec<Task>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT t.* FROM tasks t
         WHERE t.session_id = ?1 AND t.status = 'pending'
         AND NOT EXISTS (
             SELECT 1 FROM task_dependencies td
             JOIN tasks dt ON dt.id = td.depends_on
             WHERE td.task_id = t.id AND dt.status <> 'completed'
         )
         ORDER BY t.created_at_ms, t.id",
    )?;
    let rows = stmt.query_map(params![session_id.as_str()], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

/// Tasks currently in a non-terminal status, used to detect dangling "running" rows
/// left over from an unclean shutdown.
pub fn list_non_terminal(conn: &Connection, session_id: &SessionId) -> Result<Vec<Task>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks WHERE session_id = ?1
         AND status NOT IN ('completed', 'failed', 'cancelled')",
    )?;
    let rows = stmt.query_map(params![session_id.as_str()], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}
