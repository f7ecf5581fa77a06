// SPDX-License-Identifier: MIT

//! substrate-storage: the SQLite-backed state store. One typed module per table, a
//! single `Store` that owns the connection, and the migration runner that brings a
//! fresh or older database up to the schema this binary expects.

pub mod cost;
pub mod dependencies;
pub mod error;
pub mod exec_log;
pub mod migrations;
pub mod plans;
pub mod sessions;
pub mod signals;
pub mod store;
pub mod tasks;

pub use error::StoreError;
pub use store::Store;
