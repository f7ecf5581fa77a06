// SPDX-License-Identifier: MIT

//! Output formatting shared by every command: the `--output-format` flag itself, the
//! NDJSON event envelope `start` streams while the engine runs, and the table/JSON/CSV
//! renderers `cost` and `adapters` use for their listings.

use clap::ValueEnum;
use serde::Serialize;
use substrate_core::Event;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CostOutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Serialize)]
struct EventEnvelope<'a> {
    event: &'a str,
    timestamp: u64,
    data: &'a Event,
}

/// One line per bus event while `start` runs. `--output-format json` emits the
/// NDJSON envelope `{event, timestamp, data}`; text mode prints a terse human line.
pub fn emit_event(event: &Event, format: OutputFormat, now_ms: u64) {
    match format {
        OutputFormat::Json => {
            let envelope = EventEnvelope { event: event.topic(), timestamp: now_ms, data: event };
            if let Ok(line) = serde_json::to_string(&envelope) {
                println!("{line}");
            }
        }
        OutputFormat::Text => println!("{}", event.topic()),
    }
}

/// A single-envelope error report for `--output-format json`: `event:
/// "<command>:error"`, with the failure in `data.error`.
pub fn emit_json_error(command: &str, message: &str, now_ms: u64) {
    let envelope = serde_json::json!({
        "event": format!("{command}:error"),
        "timestamp": now_ms,
        "data": { "error": message },
    });
    println!("{envelope}");
}

/// Render rows as a fixed-width table. `headers.len()` must equal each row's length.
/// Column widths are the max of the header and every cell in that column, matching
/// the simple per-column max-width convention used throughout this CLI's listings.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        println!("(none)");
        return;
    }
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    let header_line: Vec<String> =
        headers.iter().zip(&widths).map(|(h, w)| format!("{:<width$}", h, width = w)).collect();
    println!("{}", header_line.join("  "));
    for row in rows {
        let line: Vec<String> =
            row.iter().zip(&widths).map(|(c, w)| format!("{:<width$}", c, width = w)).collect();
        println!("{}", line.join("  "));
    }
}

pub fn print_csv(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", headers.join(","));
    for row in rows {
        println!("{}", row.iter().map(|c| csv_escape(c)).collect::<Vec<_>>().join(","));
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
