// SPDX-License-Identifier: MIT

//! Ordered, idempotent schema migrations.
//!
//! Each [`Migration`] is a pure function keyed by version. `owns_transaction` marks a
//! migration that recreates a table with foreign-key references — SQLite requires FK
//! checks disabled for the duration of such a swap so the drop doesn't cascade, so the
//! runner wraps those in their own `PRAGMA foreign_keys=OFF` window instead of the
//! shared outer transaction.

use crate::error::StoreError;
use rusqlite::Connection;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

pub trait Migration: Send + Sync {
    fn version(&self) -> u32;
    fn owns_transaction(&self) -> bool {
        false
    }
    fn apply(&self, conn: &Connection) -> Result<(), StoreError>;
}

struct InitialSchema;

impl Migration for InitialSchema {
    fn version(&self) -> u32 {
        1
    }

    fn apply(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                graph_source_path TEXT NOT NULL,
                status TEXT NOT NULL,
                budget_usd REAL,
                running_cost_usd REAL NOT NULL DEFAULT 0,
                planning_cost_usd REAL NOT NULL DEFAULT 0,
                base_branch TEXT NOT NULL,
                config_snapshot TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );

            CREATE TABLE tasks (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                name TEXT NOT NULL,
                prompt TEXT NOT NULL,
                status TEXT NOT NULL,
                task_type TEXT NOT NULL,
                adapter_id TEXT,
                model_hint TEXT,
                worker_id TEXT,
                started_at_ms INTEGER,
                completed_at_ms INTEGER,
                result_payload TEXT,
                error_text TEXT,
                exit_code INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                retry_ceiling INTEGER NOT NULL DEFAULT 0,
                budget_usd REAL,
                cumulative_cost_usd REAL NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                UNIQUE(session_id, key)
            );
            CREATE INDEX idx_tasks_session_status ON tasks(session_id, status);

            CREATE TABLE task_dependencies (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                depends_on TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                PRIMARY KEY (task_id, depends_on)
            );
            CREATE INDEX idx_task_dependencies_depends_on ON task_dependencies(depends_on);

            CREATE TABLE execution_log (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                task_id TEXT,
                event_kind TEXT NOT NULL,
                prior_status TEXT,
                new_status TEXT NOT NULL,
                agent TEXT,
                cost_delta_usd REAL,
                data TEXT NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            );
            CREATE INDEX idx_execution_log_session_ts ON execution_log(session_id, recorded_at_ms);

            CREATE TABLE session_signals (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                processed_at_ms INTEGER
            );
            CREATE INDEX idx_session_signals_unprocessed
                ON session_signals(session_id) WHERE processed_at_ms IS NULL;

            CREATE TABLE cost_entries (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                task_id TEXT,
                agent TEXT NOT NULL,
                billing_mode TEXT NOT NULL,
                category TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                estimated_cost_usd REAL NOT NULL,
                actual_cost_usd REAL,
                savings_usd REAL,
                model TEXT NOT NULL,
                provider TEXT NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            );
            CREATE INDEX idx_cost_entries_session_task ON cost_entries(session_id, task_id);
            CREATE INDEX idx_cost_entries_category ON cost_entries(category);

            CREATE TABLE plans (
                id TEXT PRIMARY KEY,
                project TEXT NOT NULL,
                name TEXT NOT NULL,
                current_version INTEGER NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL,
                UNIQUE(project, name)
            );

            CREATE TABLE plan_versions (
                plan_id TEXT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
                version_number INTEGER NOT NULL,
                graph TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                PRIMARY KEY (plan_id, version_number)
            );
            "#,
        )?;
        Ok(())
    }
}

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

fn registry() -> Vec<Box<dyn Migration>> {
    vec![Box::new(InitialSchema)]
}

/// Apply every migration with `version() > current`, in order, recording each applied
/// version in `schema_migrations`. Re-running against an up-to-date database is a
/// no-op. Fails with [`StoreError::SchemaTooNew`] if the database already records a
/// version this binary doesn't know about.
pub fn run(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at_ms INTEGER NOT NULL
        );",
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |r| r.get(0))?;

    if current > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew(current, CURRENT_SCHEMA_VERSION));
    }

    for migration in registry() {
        if migration.version() <= current {
            continue;
        }

        let now_ms = now_ms();
        if migration.owns_transaction() {
            conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
            migration.apply(conn)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, applied_at_ms) VALUES (?1, ?2)",
                rusqlite::params![migration.version(), now_ms],
            )?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        } else {
            let tx = conn.transaction()?;
            migration.apply(&tx)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at_ms) VALUES (?1, ?2)",
                rusqlite::params![migration.version(), now_ms],
            )?;
            tx.commit()?;
        }
        tracing::info!(version = migration.version(), "applied schema migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_lands_on_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        let v: u32 =
            conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |r| r.get(0)).unwrap();
        assert_eq!(v, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn rerunning_migrations_is_a_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();
        let count: u32 =
            conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn future_schema_version_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at_ms) VALUES (99, 0)",
            [],
        )
        .unwrap();
        let err = run(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::SchemaTooNew(99, _)));
    }
}
