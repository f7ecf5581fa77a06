// SPDX-License-Identifier: MIT

//! `start`: load a graph file, materialize and persist it, then drive a
//! [`GraphEngine`] and [`SignalPoller`] to completion. This command owns the tokio
//! runtime for the whole lifetime of a session — it subscribes to the event bus,
//! dispatches every `task:ready` through the configured adapter, records the cost
//! of each completed dispatch, and exits once `graph:complete` or `graph:cancelled`
//! comes back.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use substrate_adapters::AdapterRegistry;
use substrate_core::{BillingMode, Clock, CostCategory, CostEntry, Event, SignalKind, SystemClock, TaskId};
use substrate_engine::{dispatch, DispatchRequest, DispatchStatus, EventBus, GraphEngine, SignalPoller, WorkerPool};
use substrate_graph::{load_graph_file, materialize, GraphDocument};
use substrate_storage::{cost, dependencies, sessions, tasks, Store};

use crate::commands::adapters::{build_registry, DEFAULT_ADAPTER_ID};
use crate::config::SubstrateConfig;
use crate::exit_error::ExitError;
use crate::output::{emit_event, OutputFormat};

pub struct StartArgs {
    pub graph_file: PathBuf,
    pub format: OutputFormat,
}

/// Topics this command's own event loop reacts to, either to print them or to act
/// on them (dispatch a newly ready task, apply a signal, notice completion).
const WATCHED_TOPICS: &[&str] = &[
    "graph:loaded",
    "task:ready",
    "task:complete",
    "task:failed",
    "worker:spawned",
    "worker:terminated",
    "graph:paused",
    "graph:resumed",
    "graph:cancelled",
    "graph:complete",
    "session:pause:requested",
    "session:resume:requested",
    "session:cancel:requested",
];

pub async fn run(config: &SubstrateConfig, args: StartArgs) -> Result<(), ExitError> {
    let doc = load_graph_file(&args.graph_file)?;
    let mut registry = build_registry(config);
    registry.discover().await;
    let registry = Arc::new(registry);
    validate_adapters(&doc, &registry)?;

    let now_ms = SystemClock.now_ms();
    let graph_source = args.graph_file.display().to_string();
    let materialized = materialize(&doc, &graph_source, &config.base_branch, now_ms)?;
    let session_id = materialized.session.id.clone();

    let db_path = config.state_db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ExitError::system(format!("creating {}: {e}", parent.display())))?;
    }
    let mut store = Store::open(db_path)?;
    store.with_transaction(|tx| {
        sessions::insert(tx, &materialized.session)?;
        for task in &materialized.tasks {
            let mut task = task.clone();
            task.retry_ceiling = config.retry_ceiling;
            tasks::insert(tx, &task)?;
        }
        for dep in &materialized.dependencies {
            dependencies::insert(tx, &dep.session_id, &dep.task_id, &dep.depends_on)?;
        }
        Ok(())
    })?;

    let store = Arc::new(parking_lot::Mutex::new(store));
    let bus = Arc::new(EventBus::new());
    let pool = Arc::new(WorkerPool::new(bus.clone()));
    let engine = Arc::new(tokio::sync::Mutex::new(GraphEngine::new(
        store.clone(),
        bus.clone(),
        pool.clone(),
        session_id.clone(),
        config.max_concurrency,
    )));

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    for topic in WATCHED_TOPICS.iter().copied() {
        let event_tx = event_tx.clone();
        bus.subscribe(topic, Arc::new(move |event: &Event| {
            let _ = event_tx.send(event.clone());
        }));
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poller = SignalPoller::new(store.clone(), session_id.clone(), bus.clone());
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));

    {
        let mut engine = engine.lock().await;
        engine.recover_from_crash(now_ms)?;
        engine.start_execution(SystemClock.now_ms())?;
    }

    let mut failed_tasks = 0usize;
    while let Some(event) = event_rx.recv().await {
        emit_event(&event, args.format, SystemClock.now_ms());
        match &event {
            Event::TaskReady { task_id } => {
                spawn_dispatch(
                    task_id.clone(),
                    store.clone(),
                    pool.clone(),
                    registry.clone(),
                    engine.clone(),
                    config.project_root.clone(),
                    Duration::from_secs(config.dispatch_timeout_secs),
                    config.usd_per_1k_tokens,
                );
            }
            Event::SessionPauseRequested { .. } => {
                let mut engine = engine.lock().await;
                engine.apply_non_cancel_signal(SignalKind::Pause, SystemClock.now_ms())?;
            }
            Event::SessionResumeRequested { .. } => {
                let mut engine = engine.lock().await;
                engine.apply_non_cancel_signal(SignalKind::Resume, SystemClock.now_ms())?;
            }
            Event::SessionCancelRequested { .. } => {
                let mut engine = engine.lock().await;
                engine.cancel_all(SystemClock.now_ms()).await?;
            }
            Event::GraphComplete { failed_tasks: count, .. } => {
                failed_tasks = *count;
                break;
            }
            Event::GraphCancelled { .. } => break,
            _ => {}
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = poller_handle.await;

    if failed_tasks > 0 {
        tracing::warn!(failed_tasks, "session completed with terminal task failures");
    }
    Ok(())
}

/// Check every task's requested adapter id against the registry before this graph
/// is persisted or executed at all. A task with no `agent` field falls back to the
/// default adapter at dispatch time and needs no check here.
fn validate_adapters(doc: &GraphDocument, registry: &AdapterRegistry) -> Result<(), ExitError> {
    for (key, task) in &doc.tasks {
        if let Some(agent) = &task.agent {
            if registry.get(agent).is_none() {
                return Err(ExitError::usage(format!("task {key}: unknown adapter {agent}")));
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn spawn_dispatch(
    task_id: TaskId,
    store: Arc<parking_lot::Mutex<Store>>,
    pool: Arc<WorkerPool>,
    registry: Arc<AdapterRegistry>,
    engine: Arc<tokio::sync::Mutex<GraphEngine>>,
    project_root: PathBuf,
    timeout: Duration,
    usd_per_1k_tokens: f64,
) {
    tokio::spawn(async move {
        if let Err(e) =
            run_one_dispatch(&task_id, &store, &pool, &registry, &engine, &project_root, timeout, usd_per_1k_tokens)
                .await
        {
            tracing::error!(task_id = %task_id, error = %e, "dispatch bookkeeping failed");
        }
    });
}

async fn run_one_dispatch(
    task_id: &TaskId,
    store: &Arc<parking_lot::Mutex<Store>>,
    pool: &Arc<WorkerPool>,
    registry: &Arc<AdapterRegistry>,
    engine: &Arc<tokio::sync::Mutex<GraphEngine>>,
    project_root: &std::path::Path,
    timeout: Duration,
    usd_per_1k_tokens: f64,
) -> Result<(), substrate_engine::EngineError> {
    let task = {
        let store = store.lock();
        tasks::get(store.conn(), task_id)?
    };

    {
        let mut engine = engine.lock().await;
        let now_ms = SystemClock.now_ms();
        engine.mark_task_queued(task_id, now_ms)?;
        engine.mark_task_running(task_id, now_ms)?;
    }

    let adapter_id = task.adapter_id.clone().unwrap_or_else(|| DEFAULT_ADAPTER_ID.to_string());
    let adapter = match registry.get(&adapter_id) {
        Some(adapter) => adapter,
        None => {
            let mut engine = engine.lock().await;
            return engine.mark_task_failed(
                task_id,
                &format!("no such adapter: {adapter_id}"),
                None,
                SystemClock.now_ms(),
            );
        }
    };

    let request = DispatchRequest {
        task_id: task_id.clone(),
        prompt: task.prompt.clone(),
        task_type: Some(task.task_type),
        working_directory: project_root.display().to_string(),
        timeout,
        output_schema: None,
    };

    let outcome = dispatch(pool, adapter.as_ref(), request).await;
    let mut engine = engine.lock().await;
    let now_ms = SystemClock.now_ms();

    match outcome {
        Ok(outcome) => match outcome.status {
            DispatchStatus::Completed => {
                let cost_usd = outcome.token_estimate_total as f64 / 1000.0 * usd_per_1k_tokens;
                record_cost(store, &task, &adapter_id, &outcome, cost_usd, now_ms);
                engine.mark_task_complete(task_id, outcome.parsed.as_ref(), cost_usd, now_ms)
            }
            DispatchStatus::Failed | DispatchStatus::TimedOut => engine.mark_task_failed(
                task_id,
                outcome.parse_error.as_deref().unwrap_or("dispatch failed"),
                outcome.exit_code,
                now_ms,
            ),
        },
        Err(e) => engine.mark_task_failed(task_id, &e.to_string(), None, now_ms),
    }
}

fn record_cost(
    store: &Arc<parking_lot::Mutex<Store>>,
    task: &substrate_core::Task,
    adapter_id: &str,
    outcome: &substrate_engine::DispatchOutcome,
    cost_usd: f64,
    now_ms: u64,
) {
    let entry = CostEntry::new(
        task.session_id.clone(),
        Some(task.id.clone()),
        adapter_id,
        billing_mode_from_env(),
        CostCategory::Execution,
        outcome.token_estimate_total,
        0,
        cost_usd,
        task.model_hint.clone().unwrap_or_else(|| "unknown".to_string()),
        adapter_id,
        now_ms,
    );
    let store = store.lock();
    if let Err(e) = cost::insert(store.conn(), &entry) {
        tracing::warn!(error = %e, "failed to record cost entry");
    }
}

/// `ADT_BILLING_MODE` override, per the environment contract adapters read from.
/// Falls back to API billing when unset or unrecognized.
fn billing_mode_from_env() -> BillingMode {
    match std::env::var("ADT_BILLING_MODE").as_deref() {
        Ok("subscription") => BillingMode::Subscription,
        Ok("free") => BillingMode::Free,
        _ => BillingMode::Api,
    }
}
