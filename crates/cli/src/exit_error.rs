// SPDX-License-Identifier: MIT

//! Commands return `ExitError` instead of calling `std::process::exit()` directly,
//! letting `main()` own process termination and print one consistent one-line error.

use substrate_adapters::AdapterError;
use substrate_engine::EngineError;
use substrate_graph::GraphError;
use substrate_storage::StoreError;

/// Exit codes used by every command: 0 success, 1 system error, 2 usage/validation
/// error (covers "not found", "invalid state", "invalid format").
pub const EXIT_SYSTEM: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(EXIT_SYSTEM, message)
    }
}

impl std::fmt::Display for ExitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<StoreError> for ExitError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) | StoreError::Validation(_) | StoreError::SchemaTooNew(..) => {
                ExitError::usage(e.to_string())
            }
            StoreError::Sql(_) | StoreError::Io(_) | StoreError::Serde(_) => {
                ExitError::system(e.to_string())
            }
        }
    }
}

impl From<GraphError> for ExitError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Parse(_) | GraphError::Validation(_) => ExitError::usage(e.to_string()),
            GraphError::System(_) => ExitError::system(e.to_string()),
        }
    }
}

impl From<EngineError> for ExitError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(_)
            | EngineError::Validation(_)
            | EngineError::IllegalState(_)
            | EngineError::SchemaValidation(_)
            | EngineError::Budget(_) => ExitError::usage(e.to_string()),
            EngineError::Dispatch(_) | EngineError::System(_) => ExitError::system(e.to_string()),
            EngineError::Store(inner) => ExitError::from(inner),
            EngineError::Adapter(inner) => ExitError::from(inner),
        }
    }
}

impl From<AdapterError> for ExitError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Validation(_) => ExitError::usage(e.to_string()),
            AdapterError::Dispatch(_) | AdapterError::Io(_) => ExitError::system(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ExitError {
    fn from(e: serde_json::Error) -> Self {
        ExitError::system(e.to_string())
    }
}

impl From<anyhow::Error> for ExitError {
    fn from(e: anyhow::Error) -> Self {
        ExitError::system(e.to_string())
    }
}
