// SPDX-License-Identifier: MIT

//! Adapter registry: owns every configured adapter and the health-check discovery
//! routine that decides which ones are usable this run.

use crate::adapter::{WorkerAdapter, HEALTH_CHECK_TIMEOUT};
use crate::types::HealthCheckResult;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn WorkerAdapter>>,
}

/// One adapter's outcome from a discovery pass.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryEntry {
    pub adapter_id: String,
    pub result: HealthCheckResult,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub entries: Vec<DiscoveryEntry>,
}

impl DiscoveryReport {
    pub fn healthy_ids(&self) -> Vec<String> {
        self.entries.iter().filter(|e| e.result.healthy).map(|e| e.adapter_id.clone()).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self { adapters: HashMap::new() }
    }

    pub fn register(&mut self, adapter: Arc<dyn WorkerAdapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn WorkerAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Run every registered adapter's health check concurrently, each capped at
    /// [`HEALTH_CHECK_TIMEOUT`]; a timeout or panic inside an adapter surfaces as an
    /// unhealthy result rather than aborting discovery for the rest of the registry.
    /// Adapters that come back unhealthy are dropped from the registry — callers that
    /// ran `discover` keep using the same registry to look up adapters afterward, so
    /// this is the one place that enforces "only the healthy ones get registered".
    pub async fn discover(&mut self) -> DiscoveryReport {
        let checks = self.adapters.iter().map(|(id, adapter)| {
            let id = id.clone();
            let adapter = Arc::clone(adapter);
            async move {
                let result = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, adapter.health_check())
                    .await
                {
                    Ok(result) => result,
                    Err(_) => HealthCheckResult {
                        healthy: false,
                        version: None,
                        detected_billing_modes: Vec::new(),
                        supports_headless: false,
                        cli_path: None,
                        error: Some("health check timed out".to_string()),
                    },
                };
                DiscoveryEntry { adapter_id: id, result }
            }
        });
        let entries = futures_util::future::join_all(checks).await;
        let report = DiscoveryReport { entries };
        let healthy = report.healthy_ids();
        self.adapters.retain(|id, _| healthy.contains(id));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeAdapter;

    #[tokio::test]
    async fn discover_reports_healthy_and_unhealthy_adapters() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FakeAdapter::healthy("fake-ok")));
        registry.register(Arc::new(FakeAdapter::unhealthy("fake-down")));

        let report = registry.discover().await;
        let mut healthy = report.healthy_ids();
        healthy.sort();
        assert_eq!(healthy, vec!["fake-ok".to_string()]);
        assert_eq!(report.entries.len(), 2);

        assert!(registry.get("fake-ok").is_some());
        assert!(registry.get("fake-down").is_none());
    }

    #[test]
    fn get_returns_registered_adapter_by_id() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FakeAdapter::healthy("fake-ok")));
        assert!(registry.get("fake-ok").is_some());
        assert!(registry.get("missing").is_none());
    }
}
