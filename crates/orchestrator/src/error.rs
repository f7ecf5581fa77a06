// SPDX-License-Identifier: MIT

//! Orchestrator-level error taxonomy: the story pipeline's slice of the shared
//! vocabulary, plus conversions from the crates it sits on top of.

use substrate_engine::EngineError;
use substrate_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
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

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("system error: {0}")]
    System(String),
}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        OrchestratorError::System(e.to_string())
    }
}
