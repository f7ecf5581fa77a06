// SPDX-License-Identifier: MIT

//! In-memory, scriptable adapter used by engine and orchestrator tests to exercise
//! the worker adapter contract without spawning a real process.

use crate::adapter::{heuristic_token_estimate, WorkerAdapter};
use crate::error::AdapterError;
use crate::types::{
    AdapterCapabilities, DispatchOptions, HealthCheckResult, PlanParseResult, PlanRequest,
    SpawnRecipe, TaskResult, TokenEstimate,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use substrate_core::{BillingMode, TaskType};

/// Scripted response a [`FakeAdapter`] returns for its next `parse_output` call.
#[derive(Debug, Clone)]
pub struct ScriptedResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

pub struct FakeAdapter {
    id: String,
    healthy: bool,
    scripted: Mutex<Vec<ScriptedResult>>,
}

impl FakeAdapter {
    pub fn healthy(id: impl Into<String>) -> Self {
        Self { id: id.into(), healthy: true, scripted: Mutex::new(Vec::new()) }
    }

    pub fn unhealthy(id: impl Into<String>) -> Self {
        Self { id: id.into(), healthy: false, scripted: Mutex::new(Vec::new()) }
    }

    /// Queue a result; `parse_output` pops scripted results FIFO, falling back to a
    /// generic success once the queue is drained.
    pub fn push_result(&self, result: ScriptedResult) {
        self.scripted.lock().push(result);
    }
}

#[async_trait]
impl WorkerAdapter for FakeAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            structured_output: true,
            raw_text_output: true,
            supports_streaming: false,
            billing_modes: vec![BillingMode::Free],
            supports_planning: true,
            max_context_tokens: 200_000,
            supported_task_types: vec![
                TaskType::Coding,
                TaskType::Testing,
                TaskType::Docs,
                TaskType::Debugging,
                TaskType::Refactoring,
            ],
            supported_languages: vec!["any".to_string()],
        }
    }

    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            healthy: self.healthy,
            version: self.healthy.then(|| "0.0.0-fake".to_string()),
            detected_billing_modes: vec![BillingMode::Free],
            supports_headless: true,
            cli_path: self.healthy.then(|| "/bin/true".to_string()),
            error: (!self.healthy).then(|| "fake adapter configured unhealthy".to_string()),
        }
    }

    fn build_command(
        &self,
        prompt: &str,
        options: &DispatchOptions,
    ) -> Result<SpawnRecipe, AdapterError> {
        Ok(SpawnRecipe {
            binary: "/bin/true".to_string(),
            args: vec!["--prompt".to_string(), prompt.to_string()],
            env: HashMap::new(),
            unset_env_keys: Vec::new(),
            cwd: options.working_directory.clone(),
        })
    }

    fn build_planning_command(
        &self,
        request: &PlanRequest,
        options: &DispatchOptions,
    ) -> Result<SpawnRecipe, AdapterError> {
        Ok(SpawnRecipe {
            binary: "/bin/true".to_string(),
            args: vec!["--plan".to_string(), request.project_description.clone()],
            env: HashMap::new(),
            unset_env_keys: Vec::new(),
            cwd: options.working_directory.clone(),
        })
    }

    fn parse_output(&self, stdout: &str, _stderr: &str, exit_code: Option<i32>) -> TaskResult {
        let mut scripted = self.scripted.lock();
        if !scripted.is_empty() {
            let next = scripted.remove(0);
            return TaskResult {
                success: next.success,
                output: next.output,
                error: next.error,
                exit_code,
                metadata: None,
            };
        }
        TaskResult {
            success: exit_code == Some(0),
            output: stdout.to_string(),
            error: None,
            exit_code,
            metadata: None,
        }
    }

    fn parse_plan_output(&self, stdout: &str, _stderr: &str, _exit_code: Option<i32>) -> PlanParseResult {
        PlanParseResult { success: true, tasks: Vec::new(), error: None, raw_output: stdout.to_string() }
    }

    fn estimate_tokens(&self, prompt: &str) -> TokenEstimate {
        heuristic_token_estimate(prompt)
    }
}
