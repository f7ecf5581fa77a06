// SPDX-License-Identifier: MIT

//! Session: the root of one graph execution.

use crate::ids::SessionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Complete,
    Cancelled,
}

crate::simple_display! {
    SessionStatus {
        Active => "active",
        Paused => "paused",
        Complete => "complete",
        Cancelled => "cancelled",
    }
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub graph_source_path: String,
    pub status: SessionStatus,
    pub budget_usd: Option<f64>,
    pub running_cost_usd: f64,
    pub planning_cost_usd: f64,
    pub base_branch: String,
    /// Serialized snapshot of the effective configuration this run started with.
    pub config_snapshot: serde_json::Value,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        graph_source_path: impl Into<String>,
        base_branch: impl Into<String>,
        budget_usd: Option<f64>,
        config_snapshot: serde_json::Value,
        now_ms: u64,
    ) -> Self {
        Self {
            id: SessionId::new(),
            name: name.into(),
            graph_source_path: graph_source_path.into(),
            status: SessionStatus::Active,
            budget_usd,
            running_cost_usd: 0.0,
            planning_cost_usd: 0.0,
            base_branch: base_branch.into(),
            config_snapshot,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Total cost over budget, if a cap is set and exceeded.
    pub fn over_budget_by(&self) -> Option<f64> {
        let cap = self.budget_usd?;
        let total = self.running_cost_usd + self.planning_cost_usd;
        (total > cap).then_some(total - cap)
    }
}
