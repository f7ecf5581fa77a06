// SPDX-License-Identifier: MIT

//! The `WorkerAdapter` trait: the one seam the engine talks to an external coding
//! agent through. The engine never branches on which adapter is serving a task.

use crate::error::AdapterError;
use crate::types::{
    AdapterCapabilities, DispatchOptions, HealthCheckResult, ParsedPlanTask, PlanParseResult,
    PlanRequest, SpawnRecipe, TaskResult, TokenEstimate,
};
use async_trait::async_trait;
use std::time::Duration;

/// Health checks must complete (or time out) within this window; the caller enforces
/// it with `tokio::time::timeout` around the call rather than trusting the adapter.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait WorkerAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn capabilities(&self) -> AdapterCapabilities;

    /// Probe the underlying CLI (typically `<binary> --version`). Never returns `Err`
    /// — a failed probe is reported via `HealthCheckResult::error`.
    async fn health_check(&self) -> HealthCheckResult;

    fn build_command(
        &self,
        prompt: &str,
        options: &DispatchOptions,
    ) -> Result<SpawnRecipe, AdapterError>;

    fn build_planning_command(
        &self,
        request: &PlanRequest,
        options: &DispatchOptions,
    ) -> Result<SpawnRecipe, AdapterError>;

    /// Extract a `TaskResult` from captured subprocess output. Never returns `Err` —
    /// an unparseable stdout becomes `TaskResult { success: false, .. }`.
    fn parse_output(&self, stdout: &str, stderr: &str, exit_code: Option<i32>) -> TaskResult;

    fn parse_plan_output(&self, stdout: &str, stderr: &str, exit_code: Option<i32>) -> PlanParseResult;

    fn estimate_tokens(&self, prompt: &str) -> TokenEstimate;
}

/// Heuristic token estimate shared by every adapter: roughly one token per three
/// characters, with an output allowance proportional to the input.
pub fn heuristic_token_estimate(prompt: &str) -> TokenEstimate {
    let input = (prompt.len() as u64 / 3).max(1);
    let output = (input / 2).max(1);
    TokenEstimate { input, output, total: input + output }
}

/// Shared plan-output parsing: extract the first balanced fenced YAML or JSON block
/// whose top-level shape matches `{tasks: [...]}}`, falling back gracefully rather
/// than erroring out per the output-contract recovery rules downstream layers rely on.
pub fn extract_fenced_block(stdout: &str) -> Option<&str> {
    let fence_start = stdout.find("```")?;
    let after_open = &stdout[fence_start + 3..];
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let fence_end = body.find("```")?;
    Some(body[..fence_end].trim())
}

pub fn parse_plan_tasks_from_block(block: &str) -> Result<Vec<ParsedPlanTask>, String> {
    #[derive(serde::Deserialize)]
    struct Wrapper {
        tasks: Vec<ParsedPlanTask>,
    }
    serde_yaml::from_str::<Wrapper>(block)
        .or_else(|_| serde_json::from_str::<Wrapper>(block).map_err(|e| e.to_string()))
        .map(|w| w.tasks)
        .map_err(|e| e.to_string())
}
