// SPDX-License-Identifier: MIT

//! Test fixtures shared by every crate's test suite. Gated behind `test-support` so
//! production builds never pull this in.

use crate::ids::SessionId;
use crate::session::Session;
use crate::task::{Task, TaskType};

pub fn fake_session(now_ms: u64) -> Session {
    Session::new("test-session", "graph.yaml", "main", None, serde_json::json!({}), now_ms)
}

pub fn fake_task(session_id: SessionId, key: &str, now_ms: u64) -> Task {
    Task::new(
        session_id,
        key,
        format!("Task {key}"),
        format!("do the thing for {key}"),
        TaskType::Coding,
        2,
        None,
        None,
        None,
        now_ms,
    )
}
