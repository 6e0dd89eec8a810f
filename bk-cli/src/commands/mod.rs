//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod local;

pub use local::LocalCommands;

use anyhow::Result;
use clap::Subcommand;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run pipelines on this machine
    Local {
        #[command(subcommand)]
        command: LocalCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Local { command } => local::handle_local_command(command).await,
    }
}
