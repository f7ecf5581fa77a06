// SPDX-License-Identifier: MIT

//! Layered configuration: CLI flags override `SUBSTRATE_*` environment variables,
//! which override `.substrate/config.toml`, which override built-in defaults. Each
//! layer is optional; the first one that sets a field wins.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::exit_error::ExitError;

const DEFAULT_MAX_CONCURRENCY: u32 = 5;
const DEFAULT_RETRY_CEILING: u32 = 2;
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 600;
const DEFAULT_USD_PER_1K_TOKENS: f64 = 0.003;
const DEFAULT_ADAPTER_BINARY: &str = "claude";

#[derive(Debug, Clone)]
pub struct SubstrateConfig {
    pub project_root: PathBuf,
    pub max_concurrency: u32,
    pub retry_ceiling: u32,
    pub dispatch_timeout_secs: u64,
    pub base_branch: String,
    /// Dollar rate applied to a dispatch's `token_estimate_total` to derive
    /// `CostEntry.estimated_cost_usd`. A CLI-level pricing policy; the engine itself
    /// only ever receives a pre-computed dollar figure.
    pub usd_per_1k_tokens: f64,
    /// Binary and extra args for the always-registered `"default"` adapter, used by
    /// any task whose graph definition omits `agent`.
    pub default_adapter_binary: String,
    pub default_adapter_args: Vec<String>,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry_ceiling: DEFAULT_RETRY_CEILING,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            base_branch: "main".to_string(),
            usd_per_1k_tokens: DEFAULT_USD_PER_1K_TOKENS,
            default_adapter_binary: DEFAULT_ADAPTER_BINARY.to_string(),
            default_adapter_args: Vec::new(),
        }
    }
}

/// The on-disk shape of `.substrate/config.toml`; every field optional so a project
/// can override just the one setting it cares about.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    max_concurrency: Option<u32>,
    retry_ceiling: Option<u32>,
    dispatch_timeout_secs: Option<u64>,
    base_branch: Option<String>,
    usd_per_1k_tokens: Option<f64>,
    default_adapter_binary: Option<String>,
    default_adapter_args: Option<Vec<String>>,
}

/// CLI-flag overrides, threaded in from `main`'s top-level `--max-concurrency` etc.
/// `None` means "not passed on the command line", not "explicitly unset".
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub max_concurrency: Option<u32>,
    pub base_branch: Option<String>,
}

impl SubstrateConfig {
    pub fn load(project_root: &Path, overrides: ConfigOverrides) -> Result<Self, ExitError> {
        let mut config = SubstrateConfig { project_root: project_root.to_path_buf(), ..Self::default() };

        let file_path = project_root.join(".substrate").join("config.toml");
        if file_path.exists() {
            let raw = std::fs::read_to_string(&file_path)
                .map_err(|e| ExitError::system(format!("reading {}: {e}", file_path.display())))?;
            let file: FileConfig = toml::from_str(&raw)
                .map_err(|e| ExitError::usage(format!("parsing {}: {e}", file_path.display())))?;
            config.apply_file(file);
        }

        config.apply_env()?;

        if let Some(max_concurrency) = overrides.max_concurrency {
            config.max_concurrency = max_concurrency;
        }
        if let Some(base_branch) = overrides.base_branch {
            config.base_branch = base_branch;
        }

        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.max_concurrency {
            self.max_concurrency = v;
        }
        if let Some(v) = file.retry_ceiling {
            self.retry_ceiling = v;
        }
        if let Some(v) = file.dispatch_timeout_secs {
            self.dispatch_timeout_secs = v;
        }
        if let Some(v) = file.base_branch {
            self.base_branch = v;
        }
        if let Some(v) = file.usd_per_1k_tokens {
            self.usd_per_1k_tokens = v;
        }
        if let Some(v) = file.default_adapter_binary {
            self.default_adapter_binary = v;
        }
        if let Some(v) = file.default_adapter_args {
            self.default_adapter_args = v;
        }
    }

    fn apply_env(&mut self) -> Result<(), ExitError> {
        if let Ok(v) = std::env::var("SUBSTRATE_MAX_CONCURRENCY") {
            self.max_concurrency =
                v.parse().map_err(|_| ExitError::usage(format!("SUBSTRATE_MAX_CONCURRENCY: invalid integer {v}")))?;
        }
        if let Ok(v) = std::env::var("SUBSTRATE_RETRY_CEILING") {
            self.retry_ceiling =
                v.parse().map_err(|_| ExitError::usage(format!("SUBSTRATE_RETRY_CEILING: invalid integer {v}")))?;
        }
        if let Ok(v) = std::env::var("SUBSTRATE_DISPATCH_TIMEOUT_SECS") {
            self.dispatch_timeout_secs = v
                .parse()
                .map_err(|_| ExitError::usage(format!("SUBSTRATE_DISPATCH_TIMEOUT_SECS: invalid integer {v}")))?;
        }
        if let Ok(v) = std::env::var("SUBSTRATE_BASE_BRANCH") {
            self.base_branch = v;
        }
        if let Ok(v) = std::env::var("SUBSTRATE_USD_PER_1K_TOKENS") {
            self.usd_per_1k_tokens = v
                .parse()
                .map_err(|_| ExitError::usage(format!("SUBSTRATE_USD_PER_1K_TOKENS: invalid number {v}")))?;
        }
        if let Ok(v) = std::env::var("SUBSTRATE_DEFAULT_ADAPTER_BINARY") {
            self.default_adapter_binary = v;
        }
        Ok(())
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.project_root.join(".substrate").join("state.db")
    }
}
