// SPDX-License-Identifier: MIT

//! Generic subprocess adapter: spawns a configured `binary`/`args` pair and parses a
//! fenced YAML or JSON block out of stdout. Not a wrapper for any particular vendor
//! CLI — it demonstrates the contract against anything that speaks the same output
//! convention.

use crate::adapter::{
    extract_fenced_block, heuristic_token_estimate, parse_plan_tasks_from_block, WorkerAdapter,
    HEALTH_CHECK_TIMEOUT,
};
use crate::error::AdapterError;
use crate::types::{
    AdapterCapabilities, DispatchOptions, HealthCheckResult, PlanParseResult, PlanRequest,
    SpawnRecipe, TaskResult, TokenEstimate,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;
use substrate_core::{BillingMode, TaskType};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ShellAdapterConfig {
    pub id: String,
    pub binary: String,
    pub extra_args: Vec<String>,
    pub env: HashMap<String, String>,
    pub unset_env_keys: Vec<String>,
    pub billing_modes: Vec<BillingMode>,
    pub supported_task_types: Vec<TaskType>,
    pub max_context_tokens: u64,
}

pub struct ShellAdapter {
    config: ShellAdapterConfig,
}

impl ShellAdapter {
    pub fn new(config: ShellAdapterConfig) -> Self {
        Self { config }
    }
}

#[derive(Deserialize)]
struct StructuredTaskOutput {
    output: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[async_trait]
impl WorkerAdapter for ShellAdapter {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            structured_output: true,
            raw_text_output: true,
            supports_streaming: false,
            billing_modes: self.config.billing_modes.clone(),
            supports_planning: true,
            max_context_tokens: self.config.max_context_tokens,
            supported_task_types: self.config.supported_task_types.clone(),
            supported_languages: vec!["any".to_string()],
        }
    }

    async fn health_check(&self) -> HealthCheckResult {
        let probe = Command::new(&self.config.binary)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe).await {
            Ok(Ok(output)) if output.status.success() => HealthCheckResult {
                healthy: true,
                version: Some(String::from_utf8_lossy(&output.stdout).trim().to_string()),
                detected_billing_modes: self.config.billing_modes.clone(),
                supports_headless: true,
                cli_path: Some(self.config.binary.clone()),
                error: None,
            },
            Ok(Ok(output)) => HealthCheckResult {
                healthy: false,
                version: None,
                detected_billing_modes: Vec::new(),
                supports_headless: false,
                cli_path: Some(self.config.binary.clone()),
                error: Some(format!("exit status {:?}", output.status.code())),
            },
            Ok(Err(e)) => HealthCheckResult {
                healthy: false,
                version: None,
                detected_billing_modes: Vec::new(),
                supports_headless: false,
                cli_path: Some(self.config.binary.clone()),
                error: Some(e.to_string()),
            },
            Err(_) => HealthCheckResult {
                healthy: false,
                version: None,
                detected_billing_modes: Vec::new(),
                supports_headless: false,
                cli_path: Some(self.config.binary.clone()),
                error: Some("health check timed out after 10s".to_string()),
            },
        }
    }

    fn build_command(
        &self,
        prompt: &str,
        options: &DispatchOptions,
    ) -> Result<SpawnRecipe, AdapterError> {
        if self.config.binary.trim().is_empty() {
            return Err(AdapterError::Validation("adapter binary is empty".to_string()));
        }
        let mut args = self.config.extra_args.clone();
        args.push("--prompt".to_string());
        args.push(prompt.to_string());
        if let Some(model) = &options.model_hint {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        Ok(SpawnRecipe {
            binary: self.config.binary.clone(),
            args,
            env: self.config.env.clone(),
            unset_env_keys: self.config.unset_env_keys.clone(),
            cwd: options.working_directory.clone(),
        })
    }

    fn build_planning_command(
        &self,
        request: &PlanRequest,
        options: &DispatchOptions,
    ) -> Result<SpawnRecipe, AdapterError> {
        if self.config.binary.trim().is_empty() {
            return Err(AdapterError::Validation("adapter binary is empty".to_string()));
        }
        let mut args = self.config.extra_args.clone();
        args.push("--plan".to_string());
        args.push(request.project_description.clone());
        for constraint in &request.constraints {
            args.push("--constraint".to_string());
            args.push(constraint.clone());
        }
        Ok(SpawnRecipe {
            binary: self.config.binary.clone(),
            args,
            env: self.config.env.clone(),
            unset_env_keys: self.config.unset_env_keys.clone(),
            cwd: options.working_directory.clone(),
        })
    }

    fn parse_output(&self, stdout: &str, stderr: &str, exit_code: Option<i32>) -> TaskResult {
        let block = extract_fenced_block(stdout);
        let parsed: Option<StructuredTaskOutput> = block.and_then(|b| {
            serde_yaml::from_str(b).ok().or_else(|| serde_json::from_str(b).ok())
        });

        match parsed {
            Some(structured) => TaskResult {
                success: exit_code == Some(0),
                output: structured.output,
                error: (exit_code != Some(0)).then(|| stderr.to_string()),
                exit_code,
                metadata: structured.metadata,
            },
            None => TaskResult {
                success: exit_code == Some(0) && !stdout.trim().is_empty(),
                output: stdout.to_string(),
                error: (exit_code != Some(0)).then(|| stderr.to_string()),
                exit_code,
                metadata: None,
            },
        }
    }

    fn parse_plan_output(&self, stdout: &str, stderr: &str, _exit_code: Option<i32>) -> PlanParseResult {
        let block = match extract_fenced_block(stdout) {
            Some(b) => b,
            None => {
                return PlanParseResult {
                    success: false,
                    tasks: Vec::new(),
                    error: Some("no fenced output block found".to_string()),
                    raw_output: stdout.to_string(),
                }
            }
        };

        match parse_plan_tasks_from_block(block) {
            Ok(tasks) => PlanParseResult { success: true, tasks, error: None, raw_output: stdout.to_string() },
            Err(e) => PlanParseResult {
                success: false,
                tasks: Vec::new(),
                error: Some(format!("{e}: {stderr}")),
                raw_output: stdout.to_string(),
            },
        }
    }

    fn estimate_tokens(&self, prompt: &str) -> TokenEstimate {
        heuristic_token_estimate(prompt)
    }
}
