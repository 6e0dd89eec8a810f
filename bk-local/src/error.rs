//! Runner errors
//!
//! Process-level failures. Each variant names the phase that failed, which
//! is what the user sees when a run aborts.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to bind control-plane listener: {0}")]
    Listener(#[source] io::Error),

    #[error("failed to launch agent `{binary}`: {source}")]
    Subprocess {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("agent exited unexpectedly ({0})")]
    AgentExited(String),

    #[error("control-plane server failed: {0}")]
    Server(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
