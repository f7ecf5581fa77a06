// SPDX-License-Identifier: MIT

//! Store-level error taxonomy covering the persistence slice of the shared error
//! vocabulary: not-found, validation, and the underlying I/O/SQL failures, none of
//! which are ever swallowed on the way back to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unknown schema version {0}, this binary supports up to {1}")]
    SchemaTooNew(u32, u32),
}
