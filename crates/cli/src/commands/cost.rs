// SPDX-License-Identifier: MIT

//! `cost`: aggregate spend for one session, or across every session when `--session`
//! is omitted. `--by-task`/`--by-agent`/`--by-billing` switch the grouping;
//! `--include-planning` folds planning-category spend into the total.

use std::collections::BTreeMap;

use substrate_core::{CostCategory, Session, SessionId};
use substrate_storage::{cost, sessions, Store};

use crate::config::SubstrateConfig;
use crate::exit_error::ExitError;
use crate::output::{print_csv, print_json, print_table, CostOutputFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupBy {
    None,
    Task,
    Agent,
    Billing,
}

pub struct CostArgs {
    pub session: Option<String>,
    pub group_by: GroupBy,
    pub include_planning: bool,
    pub format: CostOutputFormat,
}

pub fn run(config: &SubstrateConfig, args: CostArgs) -> Result<(), ExitError> {
    let store = Store::open(config.state_db_path())?;
    let sessions = resolve_sessions(&store, args.session.as_deref())?;

    let category = if args.include_planning { None } else { Some(CostCategory::Execution) };
    let mut rows: Vec<Vec<String>> = Vec::new();
    for session in &sessions {
        let entries = cost::list_for_session(store.conn(), &session.id)?;
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|e| category.map_or(true, |c| e.category == c))
            .collect();
        rows.extend(group_rows(session, &entries, args.group_by));
    }

    let headers = headers_for(args.group_by);
    match args.format {
        CostOutputFormat::Json => {
            let objects: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    serde_json::Value::Object(
                        headers.iter().zip(row).map(|(h, c)| (h.to_string(), serde_json::Value::String(c.clone()))).collect(),
                    )
                })
                .collect();
            print_json(&objects)?
        }
        CostOutputFormat::Table => print_table(&headers, &rows),
        CostOutputFormat::Csv => print_csv(&headers, &rows),
    }
    Ok(())
}

fn resolve_sessions(store: &Store, session: Option<&str>) -> Result<Vec<Session>, ExitError> {
    match session {
        Some(id) => Ok(vec![sessions::get(store.conn(), &SessionId::from(id))?]),
        None => Ok(sessions::list_all(store.conn())?),
    }
}

fn headers_for(group_by: GroupBy) -> Vec<&'static str> {
    match group_by {
        GroupBy::None => vec!["session", "entries", "input_tokens", "output_tokens", "cost_usd"],
        GroupBy::Task => vec!["session", "task_id", "entries", "cost_usd"],
        GroupBy::Agent => vec!["session", "agent", "entries", "cost_usd"],
        GroupBy::Billing => vec!["session", "billing_mode", "entries", "cost_usd"],
    }
}

fn group_rows(
    session: &Session,
    entries: &[substrate_core::CostEntry],
    group_by: GroupBy,
) -> Vec<Vec<String>> {
    match group_by {
        GroupBy::None => {
            let cost_usd: f64 = entries.iter().map(effective_cost).sum();
            let input: u64 = entries.iter().map(|e| e.input_tokens).sum();
            let output: u64 = entries.iter().map(|e| e.output_tokens).sum();
            vec![vec![
                session.id.to_string(),
                entries.len().to_string(),
                input.to_string(),
                output.to_string(),
                format!("{cost_usd:.4}"),
            ]]
        }
        GroupBy::Task => {
            let mut buckets: BTreeMap<String, (u64, f64)> = BTreeMap::new();
            for entry in entries {
                let key = entry.task_id.as_ref().map(|t| t.to_string()).unwrap_or_else(|| "-".to_string());
                let bucket = buckets.entry(key).or_default();
                bucket.0 += 1;
                bucket.1 += effective_cost(entry);
            }
            buckets
                .into_iter()
                .map(|(task_id, (count, cost_usd))| {
                    vec![session.id.to_string(), task_id, count.to_string(), format!("{cost_usd:.4}")]
                })
                .collect()
        }
        GroupBy::Agent => {
            let mut buckets: BTreeMap<String, (u64, f64)> = BTreeMap::new();
            for entry in entries {
                let bucket = buckets.entry(entry.agent.clone()).or_default();
                bucket.0 += 1;
                bucket.1 += effective_cost(entry);
            }
            buckets
                .into_iter()
                .map(|(agent, (count, cost_usd))| {
                    vec![session.id.to_string(), agent, count.to_string(), format!("{cost_usd:.4}")]
                })
                .collect()
        }
        GroupBy::Billing => {
            let mut buckets: BTreeMap<String, (u64, f64)> = BTreeMap::new();
            for entry in entries {
                let bucket = buckets.entry(entry.billing_mode.to_string()).or_default();
                bucket.0 += 1;
                bucket.1 += effective_cost(entry);
            }
            buckets
                .into_iter()
                .map(|(mode, (count, cost_usd))| {
                    vec![session.id.to_string(), mode, count.to_string(), format!("{cost_usd:.4}")]
                })
                .collect()
        }
    }
}

fn effective_cost(entry: &substrate_core::CostEntry) -> f64 {
    entry.actual_cost_usd.unwrap_or(entry.estimated_cost_usd)
}
