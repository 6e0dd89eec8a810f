//! Run configuration
//!
//! Defines every input of a local run: what the seed job runs, the build
//! context it reports, how the agent is launched, and main loop tuning.

use bk_core::domain::build::BuildContext;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RunnerError};

/// Configuration for one local run
///
/// Exactly one of `pipeline_file` and `command` must be set.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Pipeline file uploaded by the seed job
    pub pipeline_file: Option<PathBuf>,

    /// Command run by the seed job
    pub command: Option<String>,

    /// Extra `KEY=VALUE` environment for the seed job
    pub env: Vec<String>,

    /// Print uploaded command steps instead of running them
    pub dry_run: bool,

    /// Confirm each uploaded step before it runs
    pub prompt: bool,

    /// Regex that uploaded command steps must match to run
    pub step_filter: Option<String>,

    pub branch: String,
    pub commit: String,
    pub message: String,
    pub repository: String,
    pub organization_slug: String,
    pub pipeline_slug: String,
    pub tag: String,

    /// Seed job label; derived from the seed kind when unset
    pub label: Option<String>,

    pub creator_name: String,
    pub creator_email: String,

    /// Agent binary, looked up on PATH
    pub agent_binary: String,

    /// Name the agent registers with
    pub agent_name: String,

    /// Checkout directory handed to the agent
    pub build_path: Option<PathBuf>,

    /// How often the main loop drains the step queue
    pub tick_interval: Duration,

    /// Capacity of the pipeline upload channel
    pub upload_buffer: usize,

    /// Return once all work is finished instead of waiting for cancellation
    pub exit_when_idle: bool,
}

impl RunConfig {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            pipeline_file: None,
            command: None,
            env: Vec::new(),
            dry_run: false,
            prompt: false,
            step_filter: None,
            branch: "master".to_string(),
            commit: "HEAD".to_string(),
            message: "Local build".to_string(),
            repository: String::new(),
            organization_slug: "local".to_string(),
            pipeline_slug: "local".to_string(),
            tag: String::new(),
            label: None,
            creator_name: String::new(),
            creator_email: String::new(),
            agent_binary: "buildkite-agent".to_string(),
            agent_name: "bk-local".to_string(),
            build_path: None,
            tick_interval: Duration::from_secs(1),
            upload_buffer: 16,
            exit_when_idle: true,
        }
    }

    /// Creates a configuration from defaults and environment variables
    ///
    /// Recognised environment variables:
    /// - BUILDKITE_BUILD_CREATOR
    /// - BUILDKITE_BUILD_CREATOR_EMAIL
    /// - BK_LOCAL_AGENT_BINARY (default: buildkite-agent)
    /// - BK_LOCAL_AGENT_NAME (default: bk-local)
    /// - BK_LOCAL_BUILD_PATH
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Ok(name) = std::env::var("BUILDKITE_BUILD_CREATOR") {
            config.creator_name = name;
        }
        if let Ok(email) = std::env::var("BUILDKITE_BUILD_CREATOR_EMAIL") {
            config.creator_email = email;
        }
        if let Some(binary) = non_empty_var("BK_LOCAL_AGENT_BINARY") {
            config.agent_binary = binary;
        }
        if let Some(name) = non_empty_var("BK_LOCAL_AGENT_NAME") {
            config.agent_name = name;
        }
        config.build_path = non_empty_var("BK_LOCAL_BUILD_PATH").map(PathBuf::from);

        config
    }

    /// Seeds the run with a pipeline upload of `file`
    pub fn with_pipeline_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.pipeline_file = Some(file.into());
        self
    }

    /// Seeds the run with a single command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_env(mut self, entry: impl Into<String>) -> Self {
        self.env.push(entry.into());
        self
    }

    pub fn with_step_filter(mut self, filter: impl Into<String>) -> Self {
        self.step_filter = Some(filter.into());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        match (&self.pipeline_file, &self.command) {
            (Some(_), Some(_)) => {
                return Err(RunnerError::Config(
                    "a pipeline file and a command are mutually exclusive".to_string(),
                ));
            }
            (None, None) => {
                return Err(RunnerError::Config(
                    "either a pipeline file or a command is required".to_string(),
                ));
            }
            _ => {}
        }

        if self.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(RunnerError::Config("command cannot be empty".to_string()));
        }

        self.compiled_step_filter()?;

        if let Some(entry) = self.env.iter().find(|entry| !entry.contains('=')) {
            return Err(RunnerError::Config(format!(
                "env entry `{}` must be KEY=VALUE",
                entry
            )));
        }

        if self.agent_binary.is_empty() {
            return Err(RunnerError::Config("agent_binary cannot be empty".to_string()));
        }

        if self.tick_interval.is_zero() {
            return Err(RunnerError::Config(
                "tick_interval must be greater than 0".to_string(),
            ));
        }

        if self.upload_buffer == 0 {
            return Err(RunnerError::Config(
                "upload_buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The step filter as a regex, if one is set
    pub fn compiled_step_filter(&self) -> Result<Option<Regex>> {
        self.step_filter
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    RunnerError::Config(format!("invalid step filter `{}`: {}", pattern, e))
                })
            })
            .transpose()
    }

    /// The command the seed job runs
    pub fn seed_command(&self) -> String {
        match (&self.pipeline_file, &self.command) {
            (Some(file), _) => format!("buildkite-agent pipeline upload \"{}\"", file.display()),
            (None, Some(command)) => command.clone(),
            (None, None) => String::new(),
        }
    }

    pub fn seed_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None if self.pipeline_file.is_some() => ":pipeline:".to_string(),
            None => ":bash:".to_string(),
        }
    }

    /// Build context shared by every job of the run
    pub fn build_context(&self) -> BuildContext {
        BuildContext {
            commit: self.commit.clone(),
            branch: self.branch.clone(),
            tag: self.tag.clone(),
            message: self.message.clone(),
            repository: self.repository.clone(),
            organization_slug: self.organization_slug.clone(),
            pipeline_slug: self.pipeline_slug.clone(),
            creator_name: self.creator_name.clone(),
            creator_email: self.creator_email.clone(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
