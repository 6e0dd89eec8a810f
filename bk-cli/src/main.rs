//! bk CLI
//!
//! Runs pipelines locally against the build agent.

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bk")]
#[command(about = "Run Buildkite pipelines on your machine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Job output owns stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bk=info,bk_local=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    handle_command(cli.command).await
}
