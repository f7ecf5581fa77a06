// SPDX-License-Identifier: MIT

//! `plan validate|list|show|diff`: read-only views over the `plans`/`plan_versions`
//! tables an external plan generator writes into, plus graph-file validation reused
//! straight from `substrate-graph` so a plan document never needs its own parser.

use std::path::Path;

use substrate_core::PlanId;
use substrate_storage::{plans, Store};

use crate::config::SubstrateConfig;
use crate::exit_error::ExitError;
use crate::output::{print_json, print_table, OutputFormat};

pub fn validate(path: &Path) -> Result<(), ExitError> {
    substrate_graph::load_graph_file(path)?;
    println!("{}: valid", path.display());
    Ok(())
}

pub fn list(config: &SubstrateConfig, format: OutputFormat) -> Result<(), ExitError> {
    let store = Store::open(config.state_db_path())?;
    let all = plans::list(store.conn())?;
    match format {
        OutputFormat::Json => print_json(&all)?,
        OutputFormat::Text => {
            let rows: Vec<Vec<String>> = all
                .iter()
                .map(|p| vec![p.id.to_string(), p.project.clone(), p.name.clone(), p.current_version.to_string()])
                .collect();
            print_table(&["id", "project", "name", "current_version"], &rows);
        }
    }
    Ok(())
}

pub fn show(
    config: &SubstrateConfig,
    plan_id: &str,
    version: Option<u32>,
    format: OutputFormat,
) -> Result<(), ExitError> {
    let store = Store::open(config.state_db_path())?;
    let plan_id = PlanId::from(plan_id);
    let plan = plans::get(store.conn(), &plan_id)?;
    let version_number = version.unwrap_or(plan.current_version);
    let version = plans::get_version(store.conn(), &plan_id, version_number)?;

    match format {
        OutputFormat::Json => print_json(&version)?,
        OutputFormat::Text => {
            println!("plan {} ({}/{}) version {}", plan_id, plan.project, plan.name, version_number);
            println!("{}", serde_json::to_string_pretty(&version.graph).unwrap_or_default());
        }
    }
    Ok(())
}

pub fn diff(
    config: &SubstrateConfig,
    plan_id: &str,
    from_version: u32,
    to_version: u32,
) -> Result<(), ExitError> {
    let store = Store::open(config.state_db_path())?;
    let plan_id = PlanId::from(plan_id);
    let from = plans::get_version(store.conn(), &plan_id, from_version)?;
    let to = plans::get_version(store.conn(), &plan_id, to_version)?;

    let from_tasks = task_keys(&from.graph);
    let to_tasks = task_keys(&to.graph);

    let added: Vec<&String> = to_tasks.iter().filter(|k| !from_tasks.contains(*k)).collect();
    let removed: Vec<&String> = from_tasks.iter().filter(|k| !to_tasks.contains(*k)).collect();
    let changed: Vec<&String> = to_tasks
        .iter()
        .filter(|k| from_tasks.contains(*k))
        .filter(|k| from.graph["tasks"][k.as_str()] != to.graph["tasks"][k.as_str()])
        .collect();

    if added.is_empty() && removed.is_empty() && changed.is_empty() {
        println!("no differences between version {from_version} and version {to_version}");
        return Ok(());
    }
    for key in &added {
        println!("+ {key}");
    }
    for key in &removed {
        println!("- {key}");
    }
    for key in &changed {
        println!("~ {key}");
    }
    Ok(())
}

/// Task keys present in a plan version's graph document, in no particular order —
/// only set membership matters for `diff`.
fn task_keys(graph: &serde_json::Value) -> std::collections::BTreeSet<String> {
    graph
        .get("tasks")
        .and_then(serde_json::Value::as_object)
        .map(|tasks| tasks.keys().cloned().collect())
        .unwrap_or_default()
}
