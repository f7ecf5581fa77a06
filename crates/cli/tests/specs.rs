// SPDX-License-Identifier: MIT

//! End-to-end scenarios driven against the assembled `substrate` binary: a graph file
//! on disk in, NDJSON events and exit status out. Each test owns a fresh temp project
//! directory so `.substrate/state.db` never leaks between scenarios.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

fn substrate_cmd() -> Command {
    Command::cargo_bin("substrate").unwrap()
}

fn project(graph_yaml: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let graph_path = dir.path().join("graph.yaml");
    std::fs::write(&graph_path, graph_yaml).unwrap();
    (dir, graph_path)
}

/// Write a tiny shell adapter that sleeps for the duration given as its `--prompt`
/// argument and then prints something, so dispatches built by `ShellAdapter` (whose
/// `build_command` always prepends `--prompt <value>`) can't be handed straight to
/// `/bin/sleep`, which would reject that flag outright. Returns the script's path.
fn write_sleeper_adapter(project_root: &Path) -> String {
    let path = project_root.join("sleeper.sh");
    std::fs::write(&path, "#!/bin/sh\nsleep \"$2\"\necho slept\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_str().unwrap().to_string()
}

fn write_config(project_root: &Path, extra: &str) {
    let substrate_dir = project_root.join(".substrate");
    std::fs::create_dir_all(&substrate_dir).unwrap();
    std::fs::write(
        substrate_dir.join("config.toml"),
        format!("default_adapter_binary = \"/bin/echo\"\n{extra}"),
    )
    .unwrap();
}

/// Parse every NDJSON line from a completed `start` run into its `event` field.
fn event_names(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|v| v.get("event").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn graph_complete_data(stdout: &[u8]) -> Value {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find(|v| v.get("event").and_then(Value::as_str) == Some("graph:complete"))
        .expect("no graph:complete event in output")["data"]
        .clone()
}

/// S1: a linear chain `a -> b -> c` runs every task to completion in order.
#[test]
fn s1_linear_chain_completes_every_task() {
    let (dir, graph) = project(
        r#"
version: "1"
session:
  name: s1-linear
tasks:
  a:
    name: A
    prompt: do A
    type: coding
  b:
    name: B
    prompt: do B
    type: coding
    depends_on: [a]
  c:
    name: C
    prompt: do C
    type: coding
    depends_on: [b]
"#,
    );
    write_config(dir.path(), "");

    let output = substrate_cmd()
        .args(["--project", dir.path().to_str().unwrap(), "start", graph.to_str().unwrap(), "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let data = graph_complete_data(&output.stdout);
    similar_asserts::assert_eq!(
        serde_json::json!({
            "total_tasks": data["total_tasks"],
            "completed_tasks": data["completed_tasks"],
            "failed_tasks": data["failed_tasks"],
        }),
        serde_json::json!({"total_tasks": 3, "completed_tasks": 3, "failed_tasks": 0}),
    );
}

/// S2: a diamond join `a; b<-a; c<-a; d<-b,c` only admits d once both branches finish.
#[test]
fn s2_diamond_join_completes_every_task() {
    let (dir, graph) = project(
        r#"
version: "1"
session:
  name: s2-diamond
tasks:
  a:
    name: A
    prompt: do A
    type: coding
  b:
    name: B
    prompt: do B
    type: coding
    depends_on: [a]
  c:
    name: C
    prompt: do C
    type: coding
    depends_on: [a]
  d:
    name: D
    prompt: do D
    type: coding
    depends_on: [b, c]
"#,
    );
    write_config(dir.path(), "");

    let output = substrate_cmd()
        .args(["--project", dir.path().to_str().unwrap(), "start", graph.to_str().unwrap(), "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let data = graph_complete_data(&output.stdout);
    assert_eq!(data["total_tasks"], 4);
    assert_eq!(data["completed_tasks"], 4);

    let events = event_names(&output.stdout);
    assert_eq!(events.iter().filter(|e| e.as_str() == "task:ready").count(), 4);
}

/// S3: four independent tasks under `--max-concurrency 2`, each dispatched through a
/// real sleeping subprocess, take at least two rounds -- a cap of 4 would finish in
/// about one.
#[test]
fn s3_concurrency_cap_serializes_into_rounds() {
    let (dir, graph) = project(
        r#"
version: "1"
session:
  name: s3-concurrency
tasks:
  a: { name: A, prompt: "0.3", type: coding }
  b: { name: B, prompt: "0.3", type: coding }
  c: { name: C, prompt: "0.3", type: coding }
  d: { name: D, prompt: "0.3", type: coding }
"#,
    );
    std::fs::create_dir_all(dir.path().join(".substrate")).unwrap();
    let sleeper = write_sleeper_adapter(dir.path());
    std::fs::write(
        dir.path().join(".substrate").join("config.toml"),
        format!("default_adapter_binary = \"{sleeper}\"\ndispatch_timeout_secs = 10\nretry_ceiling = 0\n"),
    )
    .unwrap();

    let started = Instant::now();
    let output = substrate_cmd()
        .args([
            "--project",
            dir.path().to_str().unwrap(),
            "--max-concurrency",
            "2",
            "start",
            graph.to_str().unwrap(),
            "--output-format",
            "json",
        ])
        .output()
        .unwrap();
    let elapsed = started.elapsed();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let data = graph_complete_data(&output.stdout);
    assert_eq!(data["total_tasks"], 4);
    assert_eq!(data["completed_tasks"], 4);
    assert!(elapsed >= Duration::from_millis(550), "4 tasks at cap 2 should take >= 2 rounds, took {elapsed:?}");
}

/// S4: a task whose adapter always exits non-zero retries up to `retry_ceiling` times
/// before terminally failing.
#[test]
fn s4_retry_ceiling_bounds_retries() {
    let (dir, graph) = project(
        r#"
version: "1"
session:
  name: s4-retry
tasks:
  a:
    name: A
    prompt: do A
    type: coding
"#,
    );
    write_config(dir.path(), "");
    std::fs::write(
        dir.path().join(".substrate").join("config.toml"),
        "default_adapter_binary = \"/bin/false\"\nretry_ceiling = 2\n",
    )
    .unwrap();

    let output = substrate_cmd()
        .args(["--project", dir.path().to_str().unwrap(), "start", graph.to_str().unwrap(), "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let failures: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|v| v.get("event").and_then(Value::as_str) == Some("task:failed"))
        .collect();

    // retry_ceiling = 2 means 2 retries after the first failure: 3 task:failed events
    // total, the last one terminal (will_retry = false).
    assert_eq!(failures.len(), 3, "expected 3 task:failed events, got {failures:?}");
    assert_eq!(failures[0]["data"]["will_retry"], true);
    assert_eq!(failures[1]["data"]["will_retry"], true);
    assert_eq!(failures[2]["data"]["will_retry"], false);

    let data = graph_complete_data(&output.stdout);
    assert_eq!(data["failed_tasks"], 1);
}

/// Spawn `substrate start` as a background child, returning it with its session id
/// once `graph:loaded` has been observed on stdout.
fn spawn_start_and_read_session_id(
    project_root: &Path,
    graph: &Path,
) -> (std::process::Child, BufReader<std::process::ChildStdout>, String) {
    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("substrate"))
        .args([
            "--project",
            project_root.to_str().unwrap(),
            "start",
            graph.to_str().unwrap(),
            "--output-format",
            "json",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let stdout = child.stdout.take().unwrap();
    let mut reader = BufReader::new(stdout);

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).unwrap();
        assert!(n > 0, "child exited before emitting graph:loaded");
        if let Ok(v) = serde_json::from_str::<Value>(&line) {
            if v.get("event").and_then(Value::as_str) == Some("graph:loaded") {
                let session_id = v["data"]["session_id"].as_str().unwrap().to_string();
                return (child, reader, session_id);
            }
        }
    }
}

fn drain_remaining_events(mut reader: BufReader<std::process::ChildStdout>) -> Vec<String> {
    let mut events = Vec::new();
    let mut line = String::new();
    while reader.read_line(&mut line).unwrap() > 0 {
        if let Ok(v) = serde_json::from_str::<Value>(&line) {
            if let Some(e) = v.get("event").and_then(Value::as_str) {
                events.push(e.to_string());
            }
        }
        line.clear();
    }
    events
}

/// S5: pause a running session, then resume it; both signals are observed as bus
/// events before the session reaches graph:complete.
#[test]
fn s5_pause_then_resume_round_trips() {
    let (dir, graph) = project(
        r#"
version: "1"
session:
  name: s5-pause
tasks:
  a:
    name: A
    prompt: "2"
    type: coding
"#,
    );
    std::fs::create_dir_all(dir.path().join(".substrate")).unwrap();
    let sleeper = write_sleeper_adapter(dir.path());
    std::fs::write(
        dir.path().join(".substrate").join("config.toml"),
        format!("default_adapter_binary = \"{sleeper}\"\ndispatch_timeout_secs = 30\n"),
    )
    .unwrap();

    let (mut child, reader, session_id) = spawn_start_and_read_session_id(dir.path(), &graph);

    substrate_cmd()
        .args(["--project", dir.path().to_str().unwrap(), "pause", &session_id])
        .assert()
        .success();
    std::thread::sleep(Duration::from_millis(700));
    substrate_cmd()
        .args(["--project", dir.path().to_str().unwrap(), "resume", &session_id])
        .assert()
        .success();

    let status = child.wait().unwrap();
    assert!(status.success());

    let events = drain_remaining_events(reader);
    assert!(events.contains(&"graph:paused".to_string()), "events: {events:?}");
    assert!(events.contains(&"graph:resumed".to_string()), "events: {events:?}");
    assert!(events.contains(&"graph:complete".to_string()), "events: {events:?}");
}

/// S6: cancelling a session with tasks already running tears down every worker and
/// reports graph:cancelled instead of graph:complete.
#[test]
fn s6_cancel_with_running_tasks_tears_down_cleanly() {
    let (dir, graph) = project(
        r#"
version: "1"
session:
  name: s6-cancel
tasks:
  a: { name: A, prompt: "5", type: coding }
  b: { name: B, prompt: "5", type: coding }
"#,
    );
    std::fs::create_dir_all(dir.path().join(".substrate")).unwrap();
    let sleeper = write_sleeper_adapter(dir.path());
    std::fs::write(
        dir.path().join(".substrate").join("config.toml"),
        format!("default_adapter_binary = \"{sleeper}\"\ndispatch_timeout_secs = 30\n"),
    )
    .unwrap();

    let (mut child, reader, session_id) = spawn_start_and_read_session_id(dir.path(), &graph);
    std::thread::sleep(Duration::from_millis(300));

    substrate_cmd()
        .args(["--project", dir.path().to_str().unwrap(), "cancel", &session_id])
        .assert()
        .success();

    let status = child.wait().unwrap();
    assert!(status.success());

    let events = drain_remaining_events(reader);
    assert!(events.contains(&"graph:cancelled".to_string()), "events: {events:?}");
    assert!(!events.contains(&"graph:complete".to_string()), "events: {events:?}");
}

/// S7: a session killed mid-dispatch leaves its own state.db behind, but a brand new
/// `start` invocation against the same project still runs cleanly -- recover_from_crash
/// only reconciles the session it is called for, so a fresh session never trips over a
/// previous one's stale `running` row.
#[test]
fn s7_restart_after_a_killed_session_still_succeeds() {
    let (dir, graph) = project(
        r#"
version: "1"
session:
  name: s7-crash
tasks:
  a: { name: A, prompt: "5", type: coding }
"#,
    );
    std::fs::create_dir_all(dir.path().join(".substrate")).unwrap();
    let sleeper = write_sleeper_adapter(dir.path());
    std::fs::write(
        dir.path().join(".substrate").join("config.toml"),
        format!("default_adapter_binary = \"{sleeper}\"\ndispatch_timeout_secs = 30\n"),
    )
    .unwrap();

    let (mut child, _reader, _session_id) = spawn_start_and_read_session_id(dir.path(), &graph);
    std::thread::sleep(Duration::from_millis(200));
    child.kill().unwrap();
    let _ = child.wait();

    // second graph, same project and database file, short-lived task.
    let graph2 = dir.path().join("graph2.yaml");
    std::fs::write(
        &graph2,
        r#"
version: "1"
session:
  name: s7-crash-retry
tasks:
  a: { name: A, prompt: p, type: coding }
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join(".substrate").join("config.toml"),
        "default_adapter_binary = \"/bin/echo\"\n",
    )
    .unwrap();

    let output = substrate_cmd()
        .args(["--project", dir.path().to_str().unwrap(), "start", graph2.to_str().unwrap(), "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let data = graph_complete_data(&output.stdout);
    assert_eq!(data["completed_tasks"], 1);
}

/// `plan validate` reuses the graph loader: a malformed graph file is rejected with a
/// usage exit code.
#[test]
fn plan_validate_rejects_a_cyclic_graph() {
    let (dir, _graph) = project("");
    let cyclic = dir.path().join("cyclic.yaml");
    std::fs::write(
        &cyclic,
        r#"
version: "1"
session:
  name: cyclic
tasks:
  a: { name: A, prompt: p, type: coding, depends_on: [b] }
  b: { name: B, prompt: p, type: coding, depends_on: [a] }
"#,
    )
    .unwrap();

    substrate_cmd().args(["plan", "validate", cyclic.to_str().unwrap()]).assert().failure().code(2);
}

/// A task naming an adapter the registry doesn't recognize fails fast, before any
/// database row is written.
#[test]
fn start_rejects_an_unknown_adapter_before_materializing() {
    let (dir, graph) = project(
        r#"
version: "1"
session:
  name: unknown-adapter
tasks:
  a:
    name: A
    prompt: p
    type: coding
    agent: nonexistent
"#,
    );
    write_config(dir.path(), "");

    substrate_cmd()
        .args(["--project", dir.path().to_str().unwrap(), "start", graph.to_str().unwrap()])
        .assert()
        .failure()
        .code(2);

    assert!(!dir.path().join(".substrate").join("state.db").exists());
}
