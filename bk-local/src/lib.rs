//! bk-local
//!
//! Runs a pipeline on the local machine against the unmodified build agent.
//!
//! Architecture:
//! - Service: in-memory agent pool, scheduler, step queue, log sink and
//!   meta-data store
//! - API: the control-plane HTTP endpoints the agent talks to
//! - Agent: launching the build agent subprocess
//! - Runner: the main loop that seeds the build, expands pipeline uploads
//!   into jobs and tears everything down on cancellation

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod prompt;
pub mod runner;
pub mod service;

pub use agent::{AgentLauncher, AgentProcess, AgentSpec, SubprocessLauncher};
pub use config::RunConfig;
pub use error::{Result, RunnerError};
pub use prompt::{FixedPrompter, Prompter, StdinPrompter};
pub use runner::{JobSummary, LocalRunner, RunSummary};
