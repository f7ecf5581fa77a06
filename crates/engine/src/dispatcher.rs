// SPDX-License-Identifier: MIT

//! The dispatcher: a thin composition of an adapter and the worker pool into one
//! `dispatch` call. It owns none of the scheduling or persistence decisions — it just
//! runs a task to completion (or timeout) and hands back everything the caller needs
//! to record the outcome.

use std::time::{Duration, Instant};

use serde_json::Value;
use substrate_adapters::types::DispatchOptions;
use substrate_adapters::WorkerAdapter;
use substrate_core::TaskId;

use crate::error::EngineError;
use crate::pool::WorkerPool;

/// What the caller asked the dispatcher to run.
pub struct DispatchRequest {
    pub task_id: TaskId,
    pub prompt: String,
    pub task_type: Option<substrate_core::TaskType>,
    pub working_directory: String,
    pub timeout: Duration,
    /// When present, a JSON Schema-lite object: only `{"required": [...]}` at the top
    /// level is honored, matching the narrow contract the spec calls for. Anything
    /// richer is out of scope for this engine.
    pub output_schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Completed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    pub exit_code: Option<i32>,
    pub output: String,
    pub parsed: Option<Value>,
    pub parse_error: Option<String>,
    pub duration_ms: u64,
    pub token_estimate_total: u64,
}

/// Run `request` against `adapter`, via `pool`. Never returns `Err` for a task-level
/// failure (non-zero exit, timeout, unparseable output) — those all come back as a
/// `DispatchOutcome` with an appropriate `status`. `Err` is reserved for conditions
/// the caller cannot recover a task from, such as a malformed spawn recipe or the
/// subprocess never starting at all.
pub async fn dispatch(
    pool: &WorkerPool,
    adapter: &dyn WorkerAdapter,
    request: DispatchRequest,
) -> Result<DispatchOutcome, EngineError> {
    let options = DispatchOptions {
        task_type: request.task_type,
        model_hint: None,
        working_directory: request.working_directory,
        billing_mode_override: None,
    };
    let recipe = adapter.build_command(&request.prompt, &options)?;
    let token_estimate = adapter.estimate_tokens(&request.prompt);

    let started = Instant::now();
    let (worker_id, child) = pool.spawn(request.task_id, &recipe)?;

    let outcome = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            pool.release(&worker_id);
            let duration_ms = started.elapsed().as_millis() as u64;
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code();
            let parsed_task = adapter.parse_output(&stdout, &stderr, exit_code);

            let (parsed, parse_error) = validate_schema(&parsed_task.metadata, request.output_schema.as_ref());
            let status = if !parsed_task.success {
                DispatchStatus::Failed
            } else if parse_error.is_some() {
                DispatchStatus::Failed
            } else {
                DispatchStatus::Completed
            };

            DispatchOutcome {
                status,
                exit_code,
                output: parsed_task.output,
                parsed,
                parse_error,
                duration_ms,
                token_estimate_total: token_estimate.total,
            }
        }
        Ok(Err(io_err)) => {
            pool.release(&worker_id);
            return Err(EngineError::from(io_err));
        }
        Err(_elapsed) => {
            pool.terminate_all("task_timeout").await;
            DispatchOutcome {
                status: DispatchStatus::TimedOut,
                exit_code: None,
                output: String::new(),
                parsed: None,
                parse_error: Some(format!("dispatch exceeded {}s timeout", request.timeout.as_secs())),
                duration_ms: started.elapsed().as_millis() as u64,
                token_estimate_total: token_estimate.total,
            }
        }
    };

    Ok(outcome)
}

/// Validate `metadata` against the narrow `{"required": [...]}` schema shape. A
/// missing schema always passes. A failed validation is reported as a `parse_error`
/// string, never as an `Err` — per the output-contract recovery rule, bad structured
/// output degrades the task result rather than aborting dispatch.
fn validate_schema(metadata: &Option<Value>, schema: Option<&Value>) -> (Option<Value>, Option<String>) {
    let Some(schema) = schema else {
        return (metadata.clone(), None);
    };
    let required = schema.get("required").and_then(Value::as_array).cloned().unwrap_or_default();
    let Some(Value::Object(map)) = metadata else {
        return (None, Some("output schema requires structured metadata but none was produced".to_string()));
    };
    let missing: Vec<String> = required
        .iter()
        .filter_map(Value::as_str)
        .filter(|key| !map.contains_key(*key))
        .map(String::from)
        .collect();
    if missing.is_empty() {
        (metadata.clone(), None)
    } else {
        (None, Some(format!("output missing required field(s): {}", missing.join(", "))))
    }
}
