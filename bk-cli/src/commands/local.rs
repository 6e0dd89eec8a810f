//! Local run command handlers
//!
//! Runs a pipeline file or a single command through the build agent on this
//! machine.

use anyhow::{Result, bail};
use bk_core::domain::job::JobState;
use bk_local::{LocalRunner, RunConfig, RunSummary};
use clap::{Args, Subcommand};
use colored::*;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Pipeline uploaded when neither a file nor a command is given
const DEFAULT_PIPELINE_FILE: &str = ".buildkite/pipeline.yml";

/// Local subcommands
#[derive(Subcommand)]
pub enum LocalCommands {
    /// Run a pipeline locally
    Run(RunArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline file to upload (default: .buildkite/pipeline.yml)
    #[arg(conflicts_with = "command")]
    pipeline_file: Option<PathBuf>,

    /// Run a single command instead of uploading a pipeline
    #[arg(short, long)]
    command: Option<String>,

    /// Environment for the seed job (format: KEY=value, repeatable)
    #[arg(short = 'E', long = "env", value_parser = parse_key_val)]
    env: Vec<(String, String)>,

    /// Print uploaded steps instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Confirm each uploaded step before it runs
    #[arg(long)]
    prompt: bool,

    /// Only run uploaded steps whose label matches this regex
    #[arg(long)]
    step_filter: Option<String>,

    #[arg(long)]
    branch: Option<String>,

    #[arg(long)]
    commit: Option<String>,

    /// Build message
    #[arg(short, long)]
    message: Option<String>,

    /// Label of the seed job
    #[arg(long)]
    label: Option<String>,

    #[arg(long)]
    repository: Option<String>,

    #[arg(long)]
    tag: Option<String>,

    /// Agent binary to launch (overrides BK_LOCAL_AGENT_BINARY)
    #[arg(long)]
    agent_binary: Option<String>,

    /// Keep serving the agent after all jobs finish, until interrupted
    #[arg(long)]
    keep_running: bool,
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Handle local commands
pub async fn handle_local_command(command: LocalCommands) -> Result<()> {
    match command {
        LocalCommands::Run(args) => run(args).await,
    }
}

/// Builds the run configuration from the environment and `args`
fn build_config(args: RunArgs) -> RunConfig {
    let mut config = RunConfig::from_env();

    match (args.command, args.pipeline_file) {
        (Some(command), _) => config = config.with_command(command),
        (None, Some(file)) => config = config.with_pipeline_file(file),
        (None, None) => config = config.with_pipeline_file(DEFAULT_PIPELINE_FILE),
    }

    for (key, value) in args.env {
        config = config.with_env(format!("{}={}", key, value));
    }
    if let Some(filter) = args.step_filter {
        config = config.with_step_filter(filter);
    }

    config.dry_run = args.dry_run;
    config.prompt = args.prompt;
    config.exit_when_idle = !args.keep_running;
    config.label = args.label;

    if let Some(branch) = args.branch {
        config.branch = branch;
    }
    if let Some(commit) = args.commit {
        config.commit = commit;
    }
    if let Some(message) = args.message {
        config.message = message;
    }
    if let Some(repository) = args.repository {
        config.repository = repository;
    }
    if let Some(tag) = args.tag {
        config.tag = tag;
    }
    if let Some(binary) = args.agent_binary {
        config.agent_binary = binary;
    }

    config
}

/// Run a pipeline until it finishes or Ctrl-C is pressed
async fn run(args: RunArgs) -> Result<()> {
    let config = build_config(args);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping the build");
            on_interrupt.cancel();
        }
    });

    let summary = LocalRunner::new(config).run(cancel).await?;
    print_summary(&summary);

    if summary.failed() {
        bail!("{} job(s) failed", summary.failed_jobs().count());
    }

    Ok(())
}

/// Print the build summary to stderr
fn print_summary(summary: &RunSummary) {
    eprintln!();
    eprintln!(
        "{}",
        format!(
            "Build #{} finished with {} job(s):",
            summary.build.number,
            summary.jobs.len()
        )
        .bold()
    );
    for job in &summary.jobs {
        let exit = match job.exit_status {
            Some(0) => "exit 0".green(),
            Some(code) => format!("exit {}", code).red(),
            None => "no exit status".dimmed(),
        };
        eprintln!(
            "  {} {:<30} {} {}",
            "▸".cyan(),
            job.label.bold(),
            colorize_state(job.state),
            exit
        );
    }
}

/// Colorize job state for display
fn colorize_state(state: JobState) -> colored::ColoredString {
    let state_str = state.to_string();
    match state {
        JobState::Empty => state_str.dimmed(),
        JobState::Scheduled => state_str.yellow(),
        JobState::Accepted | JobState::Started => state_str.cyan(),
        JobState::Finished => state_str.green(),
    }
}
