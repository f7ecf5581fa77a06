// SPDX-License-Identifier: MIT

//! Shared error taxonomy. Each downstream crate defines its own
//! `thiserror`-derived enum for its own concerns, but reuses [`CoreError`] for the
//! handful of failure modes that originate in domain validation shared by everyone
//! (e.g. parsing a `TaskType` out of a graph file).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),
}
