// SPDX-License-Identifier: MIT

//! Graph-crate error taxonomy: the parse/validation slice of the shared vocabulary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("system error: {0}")]
    System(String),
}

impl From<std::io::Error> for GraphError {
    fn from(e: std::io::Error) -> Self {
        GraphError::System(e.to_string())
    }
}
