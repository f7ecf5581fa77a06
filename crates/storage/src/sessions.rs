// SPDX-License-Identifier: MIT

//! Session row mapping and CRUD.

use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use substrate_core::{Session, SessionId, SessionStatus};

fn from_row(row: &Row) -> rusqlite::Result<Session> {
    let status_str: String = row.get("status")?;
    let status = parse_status(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let config_snapshot_str: String = row.get("config_snapshot")?;
    let config_snapshot = serde_json::from_str(&config_snapshot_str).unwrap_or(serde_json::Value::Null);

    Ok(Session {
        id: SessionId::from(row.get::<_, String>("id")?),
        name: row.get("name")?,
        graph_source_path: row.get("graph_source_path")?,
        status,
        budget_usd: row.get("budget_usd")?,
        running_cost_usd: row.get("running_cost_usd")?,
        planning_cost_usd: row.get("planning_cost_usd")?,
        base_branch: row.get("base_branch")?,
        config_snapshot,
        created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
        updated_at_ms: row.get::<_, i64>("updated_at_ms")? as u64,
    })
}

fn parse_status(s: &str) -> Result<SessionStatus, StoreError> {
    match s {
        "active" => Ok(SessionStatus::Active),
        "paused" => Ok(SessionStatus::Paused),
        "complete" => Ok(SessionStatus::Complete),
        "cancelled" => Ok(SessionStatus::Cancelled),
        other => Err(StoreError::Validation(format!("unknown session status: {other}"))),
    }
}

pub fn insert(conn: &Connection, session: &Session) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO sessions (id, name, graph_source_path, status, budget_usd,
            running_cost_usd, planning_cost_usd, base_branch, config_snapshot,
            created_at_ms, updated_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            session.id.as_str(),
            session.name,
            session.graph_source_path,
            session.status.to_string(),
            session.budget_usd,
            session.running_cost_usd,
            session.planning_cost_usd,
            session.base_branch,
            serde_json::to_string(&session.config_snapshot)?,
            session.created_at_ms as i64,
            session.updated_at_ms as i64,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &SessionId) -> Result<Session, StoreError> {
    conn.query_row("SELECT * FROM sessions WHERE id = ?1", params![id.as_str()], from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
}

pub fn update_status(
    conn: &Connection,
    id: &SessionId,
    status: SessionStatus,
    now_ms: u64,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE sessions SET status = ?1, updated_at_ms = ?2 WHERE id = ?3",
        params![status.to_string(), now_ms as i64, id.as_str()],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("session {id}")));
    }
    Ok(())
}

/// Add `delta_usd` to the session's running or planning cost bucket.
pub fn accrue_cost(
    conn: &Connection,
    id: &SessionId,
    planning: bool,
    delta_usd: f64,
    now_ms: u64,
) -> Result<(), StoreError> {
    let column = if planning { "planning_cost_usd" } else { "running_cost_usd" };
    let changed = conn.execute(
        &format!("UPDATE sessions SET {column} = {column} + ?1, updated_at_ms = ?2 WHERE id = ?3"),
        params![delta_usd, now_ms as i64, id.as_str()],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("session {id}")));
    }
    Ok(())
}

pub fn list_active(conn: &Connection) -> Result<Vec<Session>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT * FROM sessions WHERE status IN ('active', 'paused')")?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

/// Every session regardless of status, most recent first. Used by reporting views
/// (e.g. the `cost` command's cross-session rollup) that need terminal sessions too.
pub fn list_all(conn: &Connection) -> Result<Vec<Session>, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM sessions ORDER BY created_at_ms DESC")?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn sample_session() -> Session {
        Session::new("demo", "graph.yaml", "main", Some(10.0), serde_json::json!({}), 1_000)
    }

    #[test]
    fn round_trips_a_session() {
        let store = Store::open_in_memory().unwrap();
        let session = sample_session();
        insert(store.conn(), &session).unwrap();

        let loaded = get(store.conn(), &session.id).unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.status, SessionStatus::Active);
        assert_eq!(loaded.budget_usd, Some(10.0));
    }

    #[test]
    fn missing_session_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = get(store.conn(), &SessionId::from("ses-missing")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn accrue_cost_adds_to_running_bucket() {
        let store = Store::open_in_memory().unwrap();
        let session = sample_session();
        insert(store.conn(), &session).unwrap();

        accrue_cost(store.conn(), &session.id, false, 1.5, 2_000).unwrap();
        accrue_cost(store.conn(), &session.id, false, 0.5, 3_000).unwrap();

        let loaded = get(store.conn(), &session.id).unwrap();
        assert_eq!(loaded.running_cost_usd, 2.0);
    }

    #[test]
    fn list_active_excludes_terminal_sessions() {
        let store = Store::open_in_memory().unwrap();
        let active = sample_session();
        insert(store.conn(), &active).unwrap();

        let mut done = sample_session();
        done.id = substrate_core::SessionId::new();
        done.status = SessionStatus::Complete;
        insert(store.conn(), &done).unwrap();

        let listed = list_active(store.conn()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, active.id);
    }

    #[test]
    fn list_all_includes_terminal_sessions() {
        let store = Store::open_in_memory().unwrap();
        let active = sample_session();
        insert(store.conn(), &active).unwrap();

        let mut done = sample_session();
        done.id = substrate_core::SessionId::new();
        done.status = SessionStatus::Complete;
        insert(store.conn(), &done).unwrap();

        let listed = list_all(store.conn()).unwrap();
        assert_eq!(listed.len(), 2);
    }
}
