// SPDX-License-Identifier: MIT

//! Git-worktree manager: gives each task its own working copy under
//! `<project>/.substrate/worktrees/<task-id>` so concurrent tasks never step on each
//! other's uncommitted changes. Mirrors the teacher's workspace-provisioning adapter:
//! a thin wrapper around `git worktree add`/`remove`, best-effort on teardown.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::error::EngineError;

/// `git worktree add`/`remove` are expected to complete in well under this; a repo on
/// a slow or wedged filesystem shouldn't be able to hang a scheduling pass forever.
const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(30);

/// Directory, relative to the project root, that holds every task's worktree.
pub const WORKTREES_DIR: &str = ".substrate/worktrees";

pub fn worktree_path(project_root: &Path, task_id: &str) -> PathBuf {
    project_root.join(WORKTREES_DIR).join(task_id)
}

pub fn branch_name(task_id: &str) -> String {
    format!("substrate/{task_id}")
}

/// Create a worktree for `task_id`, branched off `base_branch`, at
/// `<project_root>/.substrate/worktrees/<task_id>`. Returns the absolute path the
/// caller should pass to the adapter as the task's working directory.
pub async fn create_worktree(
    project_root: &Path,
    task_id: &str,
    base_branch: &str,
) -> Result<PathBuf, EngineError> {
    let path = worktree_path(project_root, task_id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut command = Command::new("git");
    command
        .arg("-C")
        .arg(project_root)
        .args(["worktree", "add", "-b", &branch_name(task_id)])
        .arg(&path)
        .arg(base_branch)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");

    let output = run_with_timeout(command).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::System(format!("git worktree add failed: {}", stderr.trim())));
    }
    Ok(path)
}

/// Tear down a task's worktree and its branch. Best-effort: a worktree whose
/// directory is already gone (an operator cleaned it up, or a prior attempt partly
/// succeeded) is treated as already-destroyed rather than an error.
pub async fn destroy_worktree(project_root: &Path, task_id: &str) {
    let path = worktree_path(project_root, task_id);
    if tokio::fs::symlink_metadata(&path).await.is_err() {
        return;
    }

    let mut remove = Command::new("git");
    remove.arg("-C").arg(project_root).args(["worktree", "remove", "--force"]).arg(&path);
    if let Err(e) = run_with_timeout(remove).await {
        tracing::warn!(task_id, error = %e, "git worktree remove failed, will still attempt directory cleanup");
    }

    let mut branch_delete = Command::new("git");
    branch_delete
        .arg("-C")
        .arg(project_root)
        .args(["branch", "-D", &branch_name(task_id)])
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");
    let _ = run_with_timeout(branch_delete).await;

    if tokio::fs::symlink_metadata(&path).await.is_ok() {
        if let Err(e) = tokio::fs::remove_dir_all(&path).await {
            tracing::warn!(task_id, path = %path.display(), error = %e, "failed to remove worktree directory");
        }
    }
}

async fn run_with_timeout(mut command: Command) -> Result<std::process::Output, EngineError> {
    command.stdout(std::process::Stdio::piped()).stderr(std::process::Stdio::piped());
    let child = command.spawn()?;
    match tokio::time::timeout(GIT_WORKTREE_TIMEOUT, child.wait_with_output()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(EngineError::System("git command timed out".to_string())),
    }
}
