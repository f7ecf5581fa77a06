// SPDX-License-Identifier: MIT

//! Plan / PlanVersion records. Versions are append-only; a rollback is implemented by
//! copying an earlier version's graph into a brand new version number rather than
//! mutating history, so `plan diff` can always compare two real, distinct versions.

use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use substrate_core::{Plan, PlanId, PlanVersion};

fn from_row(row: &Row) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: PlanId::from(row.get::<_, String>("id")?),
        project: row.get("project")?,
        name: row.get("name")?,
        current_version: row.get::<_, i64>("current_version")? as u32,
        created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
    })
}

fn version_from_row(row: &Row) -> rusqlite::Result<PlanVersion> {
    let graph_str: String = row.get("graph")?;
    Ok(PlanVersion {
        plan_id: PlanId::from(row.get::<_, String>("plan_id")?),
        version_number: row.get::<_, i64>("version_number")? as u32,
        graph: serde_json::from_str(&graph_str).unwrap_or(serde_json::Value::Null),
        created_at_ms: row.get::<_, i64>("created_at_ms")? as u64,
    })
}

pub fn create(
    conn: &Connection,
    project: &str,
    name: &str,
    graph: &serde_json::Value,
    now_ms: u64,
) -> Result<Plan, StoreError> {
    let plan = Plan {
        id: PlanId::new(),
        project: project.to_string(),
        name: name.to_string(),
        current_version: 1,
        created_at_ms: now_ms,
    };
    conn.execute(
        "INSERT INTO plans (id, project, name, current_version, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![plan.id.as_str(), plan.project, plan.name, plan.current_version, now_ms as i64],
    )?;
    conn.execute(
        "INSERT INTO plan_versions (plan_id, version_number, graph, created_at_ms)
         VALUES (?1, 1, ?2, ?3)",
        params![plan.id.as_str(), serde_json::to_string(graph)?, now_ms as i64],
    )?;
    Ok(plan)
}

pub fn get(conn: &Connection, id: &PlanId) -> Result<Plan, StoreError> {
    conn.query_row("SELECT * FROM plans WHERE id = ?1", params![id.as_str()], from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("plan {id}")))
}

pub fn list(conn: &Connection) -> Result<Vec<Plan>, StoreError> {
    let mut stmt = conn.prepare("SELECT * FROM plans ORDER BY project, name")?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

pub fn get_version(
    conn: &Connection,
    id: &PlanId,
    version_number: u32,
) -> Result<PlanVersion, StoreError> {
    conn.query_row(
        "SELECT * FROM plan_versions WHERE plan_id = ?1 AND version_number = ?2",
        params![id.as_str(), version_number],
        version_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("plan {id} version {version_number}")))
}

pub fn append_version(
    conn: &Connection,
    id: &PlanId,
    graph: &serde_json::Value,
    now_ms: u64,
) -> Result<u32, StoreError> {
    let plan = get(conn, id)?;
    let next_version = plan.current_version + 1;
    conn.execute(
        "INSERT INTO plan_versions (plan_id, version_number, graph, created_at_ms)
         VALUES (?1, ?2, ?3, ?4)",
        params![id.as_str(), next_version, serde_json::to_string(graph)?, now_ms as i64],
    )?;
    conn.execute(
        "UPDATE plans SET current_version = ?1 WHERE id = ?2",
        params![next_version, id.as_str()],
    )?;
    Ok(next_version)
}

/// Roll back to `target_version` by appending its graph as a new version, leaving the
/// intervening history intact.
pub fn rollback_to(
    conn: &Connection,
    id: &PlanId,
    target_version: u32,
    now_ms: u64,
) -> Result<u32, StoreError> {
    let target = get_version(conn, id, target_version)?;
    append_version(conn, id, &target.graph, now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn create_seeds_version_one() {
        let store = Store::open_in_memory().unwrap();
        let plan = create(store.conn(), "proj", "main", &serde_json::json!({"tasks": {}}), 0).unwrap();
        assert_eq!(plan.current_version, 1);
        let version = get_version(store.conn(), &plan.id, 1).unwrap();
        assert_eq!(version.graph["tasks"], serde_json::json!({}));
    }

    #[test]
    fn rollback_appends_rather_than_mutates_history() {
        let store = Store::open_in_memory().unwrap();
        let plan = create(store.conn(), "proj", "main", &serde_json::json!({"v": 1}), 0).unwrap();
        append_version(store.conn(), &plan.id, &serde_json::json!({"v": 2}), 10).unwrap();

        let rolled_back = rollback_to(store.conn(), &plan.id, 1, 20).unwrap();
        assert_eq!(rolled_back, 3);

        let v1 = get_version(store.conn(), &plan.id, 1).unwrap();
        let v3 = get_version(store.conn(), &plan.id, 3).unwrap();
        assert_eq!(v1.graph, v3.graph);

        let plan = get(store.conn(), &plan.id).unwrap();
        assert_eq!(plan.current_version, 3);
    }
}
