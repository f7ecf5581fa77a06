// SPDX-License-Identifier: MIT

//! The `Store` owns the single SQLite connection a session's engine talks to and is
//! the only place that opens a transaction. Every entity module (`sessions`, `tasks`,
//! ...) takes `&Connection` or `&Transaction` and leaves connection lifecycle to this
//! module, mirroring how the write path hands a borrowed connection down into query
//! helpers rather than threading a pool through every call site.

use crate::error::StoreError;
use crate::migrations;
use rusqlite::{Connection, Transaction};
use std::path::Path;

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if absent) the database at `path`, enable WAL journaling and
    /// foreign-key enforcement, and bring the schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut conn = Connection::open(path)?;
        Self::configure(&mut conn)?;
        Ok(Self { conn })
    }

    /// In-memory database for tests: same pragmas and migrations, nothing touches disk.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        Self::configure(&mut conn)?;
        Ok(Self { conn })
    }

    fn configure(conn: &mut Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )?;
        migrations::run(conn)?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
    /// This is the only way callers write to more than one table at a time, which
    /// keeps the intent-log-then-status-write discipline atomic: a crash mid-write
    /// leaves either both rows or neither.
    pub fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&Transaction) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self.conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_reports_current_schema_version() {
        let store = Store::open_in_memory().unwrap();
        let version: u32 = store
            .conn()
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, migrations::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn wal_and_foreign_keys_are_enabled() {
        let store = Store::open_in_memory().unwrap();
        let fk: i64 = store.conn().query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn failed_transaction_rolls_back_fully() {
        let mut store = Store::open_in_memory().unwrap();
        let result: Result<(), StoreError> = store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO sessions (id, name, graph_source_path, status, running_cost_usd,
                    planning_cost_usd, base_branch, config_snapshot, created_at_ms, updated_at_ms)
                 VALUES ('ses-1', 'x', 'g.yaml', 'active', 0, 0, 'main', '{}', 0, 0)",
                [],
            )?;
            Err(StoreError::Validation("deliberate rollback".into()))
        });
        assert!(result.is_err());
        let count: i64 =
            store.conn().query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }
}
