// SPDX-License-Identifier: MIT

//! CostEntry: per-dispatch cost record, and the views the CLI's `cost` command reads.

use crate::ids::{CostEntryId, SessionId, TaskId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    Subscription,
    Api,
    Free,
}

crate::simple_display! {
    BillingMode {
        Subscription => "subscription",
        Api => "api",
        Free => "free",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    Execution,
    Planning,
}

crate::simple_display! {
    CostCategory {
        Execution => "execution",
        Planning => "planning",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub id: CostEntryId,
    pub session_id: SessionId,
    /// None for planning dispatches not tied to a single task.
    pub task_id: Option<TaskId>,
    pub agent: String,
    pub billing_mode: BillingMode,
    pub category: CostCategory,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub actual_cost_usd: Option<f64>,
    /// Savings vs. API list price, for subscription/free billing modes.
    pub savings_usd: Option<f64>,
    pub model: String,
    pub provider: String,
    pub recorded_at_ms: u64,
}

#[allow(clippy::too_many_arguments)]
impl CostEntry {
    pub fn new(
        session_id: SessionId,
        task_id: Option<TaskId>,
        agent: impl Into<String>,
        billing_mode: BillingMode,
        category: CostCategory,
        input_tokens: u64,
        output_tokens: u64,
        estimated_cost_usd: f64,
        model: impl Into<String>,
        provider: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: CostEntryId::new(),
            session_id,
            task_id,
            agent: agent.into(),
            billing_mode,
            category,
            input_tokens,
            output_tokens,
            estimated_cost_usd,
            actual_cost_usd: None,
            savings_usd: None,
            model: model.into(),
            provider: provider.into(),
            recorded_at_ms: now_ms,
        }
    }
}

/// Aggregated totals for the `cost` CLI command's default view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostTotals {
    pub total_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub entry_count: u64,
}
