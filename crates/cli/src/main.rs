// SPDX-License-Identifier: MIT

//! Entry point: parses arguments, resolves layered configuration, dispatches to a
//! command module, and turns the result into a process exit code. Every command
//! returns [`exit_error::ExitError`] instead of calling `std::process::exit` itself,
//! so this is the one place that owns process termination.

mod commands;
mod config;
mod exit_error;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use substrate_core::SignalKind;

use commands::cost::GroupBy;
use config::{ConfigOverrides, SubstrateConfig};
use exit_error::ExitError;
use output::{CostOutputFormat, OutputFormat};

#[derive(Parser)]
#[command(name = "substrate", version, about = "Multi-agent task-graph orchestration engine")]
struct Cli {
    /// Project root containing `.substrate/`. Defaults to the current directory.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[arg(long, global = true)]
    max_concurrency: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a graph file, run it to completion.
    Start {
        graph_file: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
    /// Queue a pause signal for a running session.
    Pause {
        session: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
    /// Queue a resume signal for a paused session.
    Resume {
        session: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
    /// Queue a cancel signal for a running session.
    Cancel {
        session: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
    /// Report aggregated spend for one session, or every session.
    Cost {
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        by_task: bool,
        #[arg(long)]
        by_agent: bool,
        #[arg(long)]
        by_billing: bool,
        #[arg(long)]
        include_planning: bool,
        #[arg(long, value_enum, default_value_t = CostOutputFormat::Table)]
        output_format: CostOutputFormat,
    },
    /// Inspect configured worker adapters.
    Adapters {
        #[command(subcommand)]
        command: AdaptersCommand,
    },
    /// Work with persisted plan documents.
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
}

#[derive(Subcommand)]
enum AdaptersCommand {
    /// List every configured adapter id.
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
    /// Run each adapter's health check.
    Check {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Validate a graph file without persisting anything.
    Validate { graph_file: PathBuf },
    /// List every known plan.
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
    /// Show one plan's graph document, latest version unless `--version` is given.
    Show {
        plan_id: String,
        #[arg(long)]
        version: Option<u32>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
    /// Diff two versions of the same plan.
    Diff { plan_id: String, from_version: u32, to_version: u32 },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let (command_name, wants_json) = describe(&cli.command);
    if let Err(e) = run(cli).await {
        if wants_json {
            output::emit_json_error(command_name, &e.message, now_ms());
        } else {
            eprintln!("error: {e}");
        }
        std::process::exit(e.code);
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `(command name, whether its own --output-format flag asked for JSON)`, used
/// only to pick the right error-reporting shape once `run` fails — spec.md's JSON
/// mode wants a single `{event: "<command>:error", ...}` envelope, not a bare
/// stderr line.
fn describe(command: &Command) -> (&'static str, bool) {
    match command {
        Command::Start { output_format, .. } => ("start", *output_format == OutputFormat::Json),
        Command::Pause { output_format, .. } => ("pause", *output_format == OutputFormat::Json),
        Command::Resume { output_format, .. } => ("resume", *output_format == OutputFormat::Json),
        Command::Cancel { output_format, .. } => ("cancel", *output_format == OutputFormat::Json),
        Command::Cost { output_format, .. } => ("cost", *output_format == CostOutputFormat::Json),
        Command::Adapters { command } => (
            "adapters",
            match command {
                AdaptersCommand::List { output_format } | AdaptersCommand::Check { output_format } => {
                    *output_format == OutputFormat::Json
                }
            },
        ),
        Command::Plan { command } => (
            "plan",
            matches!(
                command,
                PlanCommand::List { output_format } | PlanCommand::Show { output_format, .. }
                    if *output_format == OutputFormat::Json
            ),
        ),
    }
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    let project_root = cli.project.unwrap_or_else(|| PathBuf::from("."));
    let overrides = ConfigOverrides { max_concurrency: cli.max_concurrency, base_branch: None };
    let config = SubstrateConfig::load(&project_root, overrides)?;

    match cli.command {
        Command::Start { graph_file, output_format } => {
            commands::start::run(&config, commands::start::StartArgs { graph_file, format: output_format }).await
        }
        Command::Pause { session, output_format } => {
            commands::signal::run(&config, &session, SignalKind::Pause, output_format)
        }
        Command::Resume { session, output_format } => {
            commands::signal::run(&config, &session, SignalKind::Resume, output_format)
        }
        Command::Cancel { session, output_format } => {
            commands::signal::run(&config, &session, SignalKind::Cancel, output_format)
        }
        Command::Cost { session, by_task, by_agent, by_billing, include_planning, output_format } => {
            let group_by = match (by_task, by_agent, by_billing) {
                (true, false, false) => GroupBy::Task,
                (false, true, false) => GroupBy::Agent,
                (false, false, true) => GroupBy::Billing,
                (false, false, false) => GroupBy::None,
                _ => return Err(ExitError::usage("--by-task, --by-agent, --by-billing are mutually exclusive")),
            };
            commands::cost::run(&config, commands::cost::CostArgs { session, group_by, include_planning, format: output_format })
        }
        Command::Adapters { command } => match command {
            AdaptersCommand::List { output_format } => commands::adapters::list(&config, output_format).await,
            AdaptersCommand::Check { output_format } => commands::adapters::check(&config, output_format).await,
        },
        Command::Plan { command } => match command {
            PlanCommand::Validate { graph_file } => commands::plan::validate(&graph_file),
            PlanCommand::List { output_format } => commands::plan::list(&config, output_format),
            PlanCommand::Show { plan_id, version, output_format } => {
                commands::plan::show(&config, &plan_id, version, output_format)
            }
            PlanCommand::Diff { plan_id, from_version, to_version } => {
                commands::plan::diff(&config, &plan_id, from_version, to_version)
            }
        },
    }
}
