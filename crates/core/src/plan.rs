// SPDX-License-Identifier: MIT

//! Plan / PlanVersion: ancillary records the external plan-generator writes before the
//! engine runs. Versions are append-only; rollback duplicates an earlier version.

use crate::ids::PlanId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub project: String,
    pub name: String,
    pub current_version: u32,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanVersion {
    pub plan_id: PlanId,
    pub version_number: u32,
    /// The raw graph document (YAML or JSON, as parsed into a `serde_json::Value`).
    pub graph: serde_json::Value,
    pub created_at_ms: u64,
}
