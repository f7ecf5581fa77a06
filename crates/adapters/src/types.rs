// SPDX-License-Identifier: MIT

//! Data shapes that cross the worker adapter contract boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What an adapter reports about itself, used by the registry and by dispatch-time
/// capability checks (e.g. "does this adapter support streaming output").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterCapabilities {
    pub structured_output: bool,
    pub raw_text_output: bool,
    pub supports_streaming: bool,
    pub billing_modes: Vec<substrate_core::BillingMode>,
    pub supports_planning: bool,
    pub max_context_tokens: u64,
    pub supported_task_types: Vec<substrate_core::TaskType>,
    pub supported_languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub version: Option<String>,
    pub detected_billing_modes: Vec<substrate_core::BillingMode>,
    pub supports_headless: bool,
    pub cli_path: Option<String>,
    pub error: Option<String>,
}

/// Options threaded into `build_command`/`build_planning_command`: everything the
/// adapter needs beyond the prompt text itself.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub task_type: Option<substrate_core::TaskType>,
    pub model_hint: Option<String>,
    pub working_directory: String,
    pub billing_mode_override: Option<substrate_core::BillingMode>,
}

/// The process spawn recipe an adapter hands back. `unset_env_keys` is applied to the
/// inherited environment BEFORE `env` is overlaid, so an adapter can both strip a
/// parent's nested-session marker and set its own.
#[derive(Debug, Clone)]
pub struct SpawnRecipe {
    pub binary: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub unset_env_keys: Vec<String>,
    pub cwd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// One task parsed out of a planning agent's structured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedPlanTask {
    pub key: String,
    pub name: String,
    pub prompt: String,
    pub task_type: substrate_core::TaskType,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanParseResult {
    pub success: bool,
    pub tasks: Vec<ParsedPlanTask>,
    pub error: Option<String>,
    pub raw_output: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// A planning request, the planning-mode counterpart to a task's prompt.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub project_description: String,
    pub constraints: Vec<String>,
}
