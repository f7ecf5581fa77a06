// SPDX-License-Identifier: MIT

//! Engine-level error taxonomy: the task-graph engine's slice of the shared
//! vocabulary, plus conversions from the crates it sits on top of.

use substrate_adapters::AdapterError;
use substrate_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("schema validation: {0}")]
    SchemaValidation(String),

    #[error("budget exceeded: {0}")]
    Budget(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("system error: {0}")]
    System(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::System(e.to_string())
    }
}
