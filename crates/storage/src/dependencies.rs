// SPDX-License-Identifier: MIT

//! Task dependency edges. Immutable once written; the graph crate is responsible for
//! rejecting cycles before any of this ever reaches the store.

use crate::error::StoreError;
use rusqlite::{params, Connection};
use substrate_core::{SessionId, TaskId};

pub fn insert(
    conn: &Connection,
    session_id: &SessionId,
    task_id: &TaskId,
    depends_on: &TaskId,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO task_dependencies (session_id, task_id, depends_on) VALUES (?1, ?2, ?3)",
        params![session_id.as_str(), task_id.as_str(), depends_on.as_str()],
    )?;
    Ok(())
}

/// Tasks that list `task_id` as a dependency, i.e. the tasks to re-check for
/// readiness once `task_id` completes.
pub fn dependents_of(conn: &Connection, task_id: &TaskId) -> Result<Vec<TaskId>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT task_id FROM task_dependencies WHERE depends_on = ?1")?;
    let rows = stmt.query_map(params![task_id.as_str()], |row| {
        row.get::<_, String>(0).map(TaskId::from)
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

pub fn dependencies_of(conn: &Connection, task_id: &TaskId) -> Result<Vec<TaskId>, StoreError> {
    let mut stmt = conn.prepare("SELECT depends_on FROM task_dependencies WHERE task_id = ?1")?;
    let rows = stmt.query_map(params![task_id.as_str()], |row| {
        row.get::<_, String>(0).map(TaskId::from)
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions;
    use crate::store::Store;
    use crate::tasks;
    use substrate_core::{Session, Task, TaskType};

    #[test]
    fn dependents_and_dependencies_are_inverse_views() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("demo", "g.yaml", "main", None, serde_json::json!({}), 0);
        sessions::insert(store.conn(), &session).unwrap();

        let a = Task::new(session.id.clone(), "a", "a", "p", TaskType::Coding, 0, None, None, None, 0);
        let b = Task::new(session.id.clone(), "b", "b", "p", TaskType::Coding, 0, None, None, None, 0);
        tasks::insert(store.conn(), &a).unwrap();
        tasks::insert(store.conn(), &b).unwrap();
        insert(store.conn(), &session.id, &b.id, &a.id).unwrap();

        assert_eq!(dependents_of(store.conn(), &a.id).unwrap(), vec![b.id.clone()]);
        assert_eq!(dependencies_of(store.conn(), &b.id).unwrap(), vec![a.id]);
    }
}
