// SPDX-License-Identifier: MIT

//! The graph file's own schema, deserialized as close to the source document as
//! possible. Task `type` is kept as a raw string here rather than `TaskType`
//! directly — an unrecognized type name is a semantic [`crate::error::GraphError::Validation`]
//! failure, not a syntax error, so it must survive deserialization to be reported
//! through the validation pass instead of failing the `serde` parse itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const SUPPORTED_VERSIONS: &[&str] = &["1", "1.0"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub version: String,
    pub session: SessionDef,
    pub tasks: BTreeMap<String, TaskDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDef {
    pub name: String,
    pub budget_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDef {
    pub name: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub budget_usd: Option<f64>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}
