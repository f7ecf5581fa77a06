// SPDX-License-Identifier: MIT

//! `adapters list|check`: inspect the registry's always-available default adapter.
//! A configured project with only the shell-backed default adapter still gets a
//! meaningful `check` — it probes `<binary> --version` the same as any other adapter.

use substrate_adapters::shell::{ShellAdapter, ShellAdapterConfig};
use substrate_adapters::AdapterRegistry;
use substrate_core::{BillingMode, TaskType};

use crate::config::SubstrateConfig;
use crate::exit_error::ExitError;
use crate::output::{print_json, print_table, OutputFormat};

pub const DEFAULT_ADAPTER_ID: &str = "default";

pub fn build_registry(config: &SubstrateConfig) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(std::sync::Arc::new(ShellAdapter::new(ShellAdapterConfig {
        id: DEFAULT_ADAPTER_ID.to_string(),
        binary: config.default_adapter_binary.clone(),
        extra_args: config.default_adapter_args.clone(),
        env: std::collections::HashMap::new(),
        unset_env_keys: Vec::new(),
        billing_modes: vec![BillingMode::Api, BillingMode::Subscription, BillingMode::Free],
        supported_task_types: vec![
            TaskType::Coding,
            TaskType::Testing,
            TaskType::Docs,
            TaskType::Debugging,
            TaskType::Refactoring,
        ],
        max_context_tokens: 200_000,
    })));
    registry
}

pub async fn list(config: &SubstrateConfig, format: OutputFormat) -> Result<(), ExitError> {
    let mut registry = build_registry(config);
    registry.discover().await;
    let ids = registry.ids();
    match format {
        OutputFormat::Json => print_json(&ids)?,
        OutputFormat::Text => print_table(&["adapter_id"], &ids.into_iter().map(|id| vec![id]).collect::<Vec<_>>()),
    }
    Ok(())
}

pub async fn check(config: &SubstrateConfig, format: OutputFormat) -> Result<(), ExitError> {
    let mut registry = build_registry(config);
    let report = registry.discover().await;

    match format {
        OutputFormat::Json => print_json(&report.entries)?,
        OutputFormat::Text => {
            let rows: Vec<Vec<String>> = report
                .entries
                .iter()
                .map(|entry| {
                    vec![
                        entry.adapter_id.clone(),
                        entry.result.healthy.to_string(),
                        entry.result.version.clone().unwrap_or_else(|| "-".to_string()),
                        entry.result.error.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            print_table(&["adapter_id", "healthy", "version", "error"], &rows);
        }
    }
    Ok(())
}
