// SPDX-License-Identifier: MIT

//! Signal queue: the CLI's `pause`/`resume`/`cancel` commands enqueue a row here and
//! exit immediately; the running engine's signal poller drains it on its own cadence.
//! This is the entire cross-process control channel — no socket, no shared memory.

use crate::error::StoreError;
use rusqlite::{params, Connection, Row};
use substrate_core::{SessionId, SessionSignal, SignalId, SignalKind};

fn parse_kind(s: &str) -> Result<SignalKind, StoreError> {
    match s {
        "pause" => Ok(SignalKind::Pause),
        "resume" => Ok(SignalKind::Resume),
        "cancel" => Ok(SignalKind::Cancel),
        other => Err(StoreError::Validation(format!("unknown signal kind: {other}"))),
    }
}

fn from_row(row: &Row) -> rusqlite::Result<SessionSignal> {
    let kind_str: String = row.get("kind")?;
    let kind = parse_kind(&kind_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(SessionSignal {
        id: SignalId::from(row.get::<_, String>("id")?),
        session_id: SessionId::from(row.get::<_, String>("session_id")?),
        kind,
        created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
        processed_at_ms: row.get::<_, Option<i64>>("processed_at_ms")?.map(|v| v as u64),
    })
}

pub fn enqueue(
    conn: &Connection,
    session_id: &SessionId,
    kind: SignalKind,
    now_ms: u64,
) -> Result<SignalId, StoreError> {
    let id = SignalId::new();
    conn.execute(
        "INSERT INTO session_signals (id, session_id, kind, created_at_ms, processed_at_ms)
         VALUES (?1, ?2, ?3, ?4, NULL)",
        params![id.as_str(), session_id.as_str(), kind.to_string(), now_ms as i64],
    )?;
    Ok(id)
}

/// Unprocessed signals for one session, oldest first, so a pause followed quickly by
/// a cancel is applied in the order the operator issued them.
pub fn poll_unprocessed(
    conn: &Connection,
    session_id: &SessionId,
) -> Result<Vec<SessionSignal>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM session_signals
         WHERE session_id = ?1 AND processed_at_ms IS NULL
         ORDER BY created_at_ms, id",
    )?;
    let rows = stmt.query_map(params![session_id.as_str()], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

pub fn mark_processed(conn: &Connection, id: &SignalId, now_ms: u64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE session_signals SET processed_at_ms = ?1 WHERE id = ?2",
        params![now_ms as i64, id.as_str()],
    )?;
    Ok(())
}
