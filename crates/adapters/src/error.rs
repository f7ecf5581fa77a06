// SPDX-License-Identifier: MIT

//! Adapter-layer error taxonomy. Per the worker adapter contract, `health_check` and
//! `parse_output` never return `Err` — failures there are captured into their result
//! structs' `error` fields instead. This enum is only for the handful of operations
//! that legitimately cannot produce a result at all (building a spawn recipe from
//! malformed adapter configuration, or the registry's process-spawn path).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("dispatch: {0}")]
    Dispatch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
