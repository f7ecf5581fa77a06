// SPDX-License-Identifier: MIT

//! The intent log: append-only, written before the status change it describes in the
//! same transaction. Replaying it in timestamp order after an unclean shutdown tells
//! the engine exactly how far each task got.

use crate::error::StoreError;
use rusqlite::{params, Connection, Row};
use substrate_core::{ExecutionLogEntry, ExecutionLogId, LogEventKind, SessionId, TaskId};

fn parse_event_kind(s: &str) -> Result<LogEventKind, StoreError> {
    match s {
        "task_status_changed" => Ok(LogEventKind::TaskStatusChanged),
        "orchestrator_state_changed" => Ok(LogEventKind::OrchestratorStateChanged),
        "story_status_changed" => Ok(LogEventKind::StoryStatusChanged),
        other => Err(StoreError::Validation(format!("unknown log event kind: {other}"))),
    }
}

fn from_row(row: &Row) -> rusqlite::Result<ExecutionLogEntry> {
    let event_kind_str: String = row.get("event_kind")?;
    let event_kind = parse_event_kind(&event_kind_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let data_str: String = row.get("data")?;
    let task_id: Option<String> = row.get("task_id")?;

    Ok(ExecutionLogEntry {
        id: ExecutionLogId::from(row.get::<_, String>("id")?),
        session_id: SessionId::from(row.get::<_, String>("session_id")?),
        task_id: task_id.map(TaskId::from),
        event_kind,
        prior_status: row.get("prior_status")?,
        new_status: row.get("new_status")?,
        agent: row.get("agent")?,
        cost_delta_usd: row.get("cost_delta_usd")?,
        data: serde_json::from_str(&data_str).unwrap_or(serde_json::Value::Null),
        recorded_at_ms: row.get::<_, i64>("recorded_at_ms")? as u64,
    })
}

/// Append one row. Callers invoke this inside the same transaction that performs the
/// status write it precedes — the store never does that sequencing on the caller's
/// behalf since it spans two different entity modules.
pub fn append(conn: &Connection, entry: &ExecutionLogEntry) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO execution_log (id, session_id, task_id, event_kind, prior_status,
            new_status, agent, cost_delta_usd, data, recorded_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id.as_str(),
            entry.session_id.as_str(),
            entry.task_id.as_ref().map(|t| t.as_str()),
            entry.event_kind.to_string(),
            entry.prior_status,
            entry.new_status,
            entry.agent,
            entry.cost_delta_usd,
            serde_json::to_string(&entry.data)?,
            entry.recorded_at_ms as i64,
        ],
    )?;
    Ok(())
}

pub fn list_for_session(
    conn: &Connection,
    session_id: &SessionId,
) -> Result<Vec<ExecutionLogEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM execution_log WHERE session_id = ?1 ORDER BY recorded_at_ms, id",
    )?;
    let rows = stmt.query_map(params![session_id.as_str()], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions;
    use crate::store::Store;
    use substrate_core::Session;

    #[test]
    fn appended_entries_replay_in_order() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("demo", "g.yaml", "main", None, serde_json::json!({}), 0);
        sessions::insert(store.conn(), &session).unwrap();

        for (i, status) in ["ready", "queued", "running"].iter().enumerate() {
            let entry = ExecutionLogEntry::new(
                session.id.clone(),
                None,
                LogEventKind::TaskStatusChanged,
                None,
                *status,
                None,
                None,
                serde_json::json!({}),
                i as u64,
            );
            append(store.conn(), &entry).unwrap();
        }

        let entries = list_for_session(store.conn(), &session.id).unwrap();
        let statuses: Vec<_> = entries.iter().map(|e| e.new_status.as_str()).collect();
        assert_eq!(statuses, vec!["ready", "queued", "running"]);
    }

    #[test]
    fn secrets_stay_masked_on_the_way_to_disk() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("demo", "g.yaml", "main", None, serde_json::json!({}), 0);
        sessions::insert(store.conn(), &session).unwrap();

        let entry = ExecutionLogEntry::new(
            session.id.clone(),
            None,
            LogEventKind::TaskStatusChanged,
            None,
            "running",
            None,
            None,
            serde_json::json!({"api_key": "sk-secret"}),
            0,
        );
        append(store.conn(), &entry).unwrap();

        let loaded = list_for_session(store.conn(), &session.id).unwrap();
        assert_eq!(loaded[0].data["api_key"], "***");
    }
}
