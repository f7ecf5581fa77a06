// SPDX-License-Identifier: MIT

//! Append-only intent log (ExecutionLog). Every state change writes one of these
//! rows BEFORE the status update, in the same transaction — the sole crash-safety
//! guarantee the store provides.

use crate::ids::{ExecutionLogId, SessionId, TaskId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    TaskStatusChanged,
    OrchestratorStateChanged,
    StoryStatusChanged,
}

crate::simple_display! {
    LogEventKind {
        TaskStatusChanged => "task_status_changed",
        OrchestratorStateChanged => "orchestrator_state_changed",
        StoryStatusChanged => "story_status_changed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub id: ExecutionLogId,
    pub session_id: SessionId,
    /// Orchestrator-level transitions have no task.
    pub task_id: Option<TaskId>,
    pub event_kind: LogEventKind,
    pub prior_status: Option<String>,
    pub new_status: String,
    pub agent: Option<String>,
    pub cost_delta_usd: Option<f64>,
    /// Free-form payload, masked of secrets before it is ever written.
    pub data: serde_json::Value,
    pub recorded_at_ms: u64,
}

impl ExecutionLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        task_id: Option<TaskId>,
        event_kind: LogEventKind,
        prior_status: Option<String>,
        new_status: impl Into<String>,
        agent: Option<String>,
        cost_delta_usd: Option<f64>,
        data: serde_json::Value,
        now_ms: u64,
    ) -> Self {
        Self {
            id: ExecutionLogId::new(),
            session_id,
            task_id,
            event_kind,
            prior_status,
            new_status: new_status.into(),
            agent,
            cost_delta_usd,
            data: redact::mask(data),
            recorded_at_ms: now_ms,
        }
    }
}

/// Secret redaction shared between the intent log and the tracing layer: any object
/// key matching a known credential-ish suffix is replaced before the value is ever
/// written to disk or emitted to a log line.
pub mod redact {
    const SENSITIVE_SUFFIXES: &[&str] = &["_key", "_token", "_secret", "password"];

    pub fn mask(value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let lower = k.to_lowercase();
                        if SENSITIVE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
                            (k, serde_json::Value::String("***".to_string()))
                        } else {
                            (k, mask(v))
                        }
                    })
                    .collect(),
            ),
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(mask).collect())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::redact::mask;
    use serde_json::json;

    #[test]
    fn masks_nested_key_like_fields() {
        let input = json!({"prompt": "hi", "auth": {"api_key": "sk-abc"}});
        let masked = mask(input);
        assert_eq!(masked["prompt"], "hi");
        assert_eq!(masked["auth"]["api_key"], "***");
    }

    #[test]
    fn leaves_unrelated_fields_alone() {
        let input = json!({"items": [{"token_count": 3}]});
        assert_eq!(mask(input.clone()), input);
    }
}
