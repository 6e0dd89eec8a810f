//! Build agent launching
//!
//! The runner starts the real build agent as a subprocess pointed at the
//! local control plane. The launcher is a trait so that the agent can be
//! replaced by an in-process stand-in.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::error::{Result, RunnerError};

/// Everything an agent needs to reach the control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    /// Base URL of the control plane, e.g. `http://127.0.0.1:53211`
    pub endpoint: String,

    /// Registration token
    pub token: String,

    /// Name the agent registers with
    pub name: String,

    /// Checkout directory for jobs
    pub build_path: Option<PathBuf>,
}

impl AgentSpec {
    /// Environment variables handed to the agent
    pub fn env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("BUILDKITE_AGENT_ENDPOINT", self.endpoint.clone()),
            ("BUILDKITE_AGENT_TOKEN", self.token.clone()),
            ("BUILDKITE_AGENT_NAME", self.name.clone()),
        ];
        if let Some(path) = &self.build_path {
            env.push(("BUILDKITE_BUILD_PATH", path.display().to_string()));
        }
        env
    }
}

/// Starts build agents
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Launches an agent for `spec`
    ///
    /// # Returns
    /// A handle to the running agent
    async fn launch(&self, spec: &AgentSpec) -> Result<Box<dyn AgentProcess>>;
}

/// A running agent
#[async_trait]
pub trait AgentProcess: Send {
    /// Waits for the agent to exit, returning a description of how it exited
    async fn wait(&mut self) -> io::Result<String>;

    /// Stops the agent and waits for it to exit
    async fn terminate(&mut self) -> io::Result<()>;
}

/// Launches the agent binary as a child process
///
/// The agent inherits the parent's environment plus the variables of
/// [`AgentSpec::env`]. Its output is discarded; job output arrives through
/// the log chunk endpoint instead.
#[derive(Debug, Clone)]
pub struct SubprocessLauncher {
    binary: String,
}

impl SubprocessLauncher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl AgentLauncher for SubprocessLauncher {
    async fn launch(&self, spec: &AgentSpec) -> Result<Box<dyn AgentProcess>> {
        tracing::info!("Launching {} start ({})", self.binary, spec.endpoint);

        let child = Command::new(&self.binary)
            .arg("start")
            .envs(spec.env())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Subprocess {
                binary: self.binary.clone(),
                source,
            })?;

        tracing::debug!("Agent process id: {:?}", child.id());
        Ok(Box::new(ChildAgent { child }))
    }
}

struct ChildAgent {
    child: Child,
}

#[async_trait]
impl AgentProcess for ChildAgent {
    async fn wait(&mut self) -> io::Result<String> {
        let status = self.child.wait().await?;
        Ok(status.to_string())
    }

    async fn terminate(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await
    }
}
