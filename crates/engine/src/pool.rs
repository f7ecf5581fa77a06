// SPDX-License-Identifier: MIT

//! Worker Pool Manager: owns every live subprocess, applies the
//! `unsetEnvKeys`-before-`env` overlay from a [`SpawnRecipe`], and provides best-effort
//! graceful shutdown (SIGTERM, wait, SIGKILL survivors) for pause/cancel.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use substrate_adapters::types::SpawnRecipe;
use substrate_core::{Event, TaskId, WorkerId};
use tokio::process::{Child, Command};

use crate::bus::EventBus;
use crate::error::EngineError;

/// Grace period between SIGTERM and SIGKILL during [`WorkerPool::terminate_all`].
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

struct ActiveWorker {
    task_id: TaskId,
    pid: Option<i32>,
}

/// Snapshot of one live worker, returned by [`WorkerPool::active_workers`].
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub worker_id: WorkerId,
    pub task_id: TaskId,
    pub pid: Option<i32>,
}

pub struct WorkerPool {
    active: Mutex<HashMap<WorkerId, ActiveWorker>>,
    bus: Arc<EventBus>,
}

impl WorkerPool {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { active: Mutex::new(HashMap::new()), bus }
    }

    /// Launch `recipe` for `task_id` and register it in the active set. Environment
    /// construction follows the recipe's own invariant: every key in
    /// `unset_env_keys` is removed from the inherited environment before `env` is
    /// overlaid, so an adapter can strip a parent's marker and still set its own.
    pub fn spawn(&self, task_id: TaskId, recipe: &SpawnRecipe) -> Result<(WorkerId, Child), EngineError> {
        let mut command = Command::new(&recipe.binary);
        command
            .args(&recipe.args)
            .current_dir(&recipe.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for key in &recipe.unset_env_keys {
            command.env_remove(key);
        }
        command.envs(&recipe.env);

        let child = command.spawn()?;
        let pid = child.id().map(|p| p as i32);
        let worker_id = WorkerId::new();
        self.active.lock().insert(worker_id.clone(), ActiveWorker { task_id: task_id.clone(), pid });
        self.bus.emit(Event::WorkerSpawned { worker_id: worker_id.clone(), task_id });
        Ok((worker_id, child))
    }

    /// Drop a completed or cancelled worker from the active set. The caller is
    /// responsible for having already consumed the child's output.
    pub fn release(&self, worker_id: &WorkerId) {
        self.active.lock().remove(worker_id);
    }

    pub fn worker_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn get(&self, worker_id: &WorkerId) -> Option<TaskId> {
        self.active.lock().get(worker_id).map(|w| w.task_id.clone())
    }

    pub fn active_workers(&self) -> Vec<WorkerSnapshot> {
        self.active
            .lock()
            .iter()
            .map(|(id, w)| WorkerSnapshot { worker_id: id.clone(), task_id: w.task_id.clone(), pid: w.pid })
            .collect()
    }

    /// Send SIGTERM to every active worker, wait up to [`TERMINATE_GRACE`], then
    /// SIGKILL anything still alive. Emits `worker:terminated` for each worker
    /// regardless of which signal actually stopped it, then drops it from the active
    /// set. A worker with no known pid (the child already exited) is reported
    /// terminated without signaling anything.
    pub async fn terminate_all(&self, reason: &str) {
        self.terminate_all_with_grace(reason, TERMINATE_GRACE).await
    }

    async fn terminate_all_with_grace(&self, reason: &str, grace: Duration) {
        let workers: Vec<(WorkerId, Option<i32>)> =
            self.active.lock().iter().map(|(id, w)| (id.clone(), w.pid)).collect();
        if workers.is_empty() {
            return;
        }

        for (_, pid) in &workers {
            if let Some(pid) = pid {
                let _ = signal::kill(Pid::from_raw(*pid), Signal::SIGTERM);
            }
        }

        tokio::time::sleep(grace).await;

        for (_, pid) in &workers {
            if let Some(pid) = pid {
                // A successful signal-0 probe means the process is still alive.
                if signal::kill(Pid::from_raw(*pid), None).is_ok() {
                    let _ = signal::kill(Pid::from_raw(*pid), Signal::SIGKILL);
                }
            }
        }

        for (worker_id, _) in workers {
            self.bus.emit(Event::WorkerTerminated { worker_id: worker_id.clone(), reason: reason.to_string() });
            self.active.lock().remove(&worker_id);
        }
    }
}
