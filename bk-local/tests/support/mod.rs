//! Simulated build agent for end-to-end runs
//!
//! Speaks the control-plane protocol through `bk-client` and "executes" a
//! tiny command language instead of a shell:
//! - `buildkite-agent pipeline upload "<file>"` uploads the file
//! - `echo <text>` prints `<text>`
//! - `exit <n>` exits with status `n`

#![allow(dead_code)]

use async_trait::async_trait;
use bk_client::AgentClient;
use bk_core::domain::pipeline::{PipelineDocument, PipelineUpload};
use bk_core::dto::job::AcceptedJob;
use bk_local::error::Result;
use bk_local::{AgentLauncher, AgentProcess, AgentSpec};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Launches a [`SimulatedAgent`] task instead of a subprocess
#[derive(Clone, Default)]
pub struct SimulatedLauncher {
    accepted: Arc<Mutex<Vec<AcceptedJob>>>,
    specs: Arc<Mutex<Vec<AgentSpec>>>,
}

impl SimulatedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job the agent accepted, in order
    pub fn accepted(&self) -> Vec<AcceptedJob> {
        self.accepted.lock().unwrap().clone()
    }

    /// The spec of every launch
    pub fn specs(&self) -> Vec<AgentSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentLauncher for SimulatedLauncher {
    async fn launch(&self, spec: &AgentSpec) -> Result<Box<dyn AgentProcess>> {
        self.specs.lock().unwrap().push(spec.clone());
        let agent = SimulatedAgent {
            client: AgentClient::new(spec.endpoint.clone()),
            name: spec.name.clone(),
            accepted: Arc::clone(&self.accepted),
        };
        let task = tokio::spawn(async move {
            if let Err(e) = agent.run().await {
                eprintln!("simulated agent failed: {}", e);
            }
        });
        Ok(Box::new(SimulatedProcess { task }))
    }
}

struct SimulatedProcess {
    task: JoinHandle<()>,
}

#[async_trait]
impl AgentProcess for SimulatedProcess {
    async fn wait(&mut self) -> io::Result<String> {
        match (&mut self.task).await {
            Ok(()) => Ok("simulated agent stopped".to_string()),
            Err(e) => Ok(format!("simulated agent ended: {}", e)),
        }
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.task.abort();
        Ok(())
    }
}

struct SimulatedAgent {
    client: AgentClient,
    name: String,
    accepted: Arc<Mutex<Vec<AcceptedJob>>>,
}

impl SimulatedAgent {
    async fn run(self) -> bk_client::Result<()> {
        let registration = self.client.register(&self.name).await?;
        let client = self.client.clone().with_token(registration.access_token);
        client.connect().await?;

        loop {
            match client.ping().await?.job {
                Some(job) => self.run_job(&client, job.id).await?,
                None => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    async fn run_job(&self, client: &AgentClient, job_id: Uuid) -> bk_client::Result<()> {
        let accepted = client.accept_job(job_id).await?;
        self.accepted.lock().unwrap().push(accepted.clone());
        client.start_job(job_id).await?;

        // In-job commands authenticate with the job token
        let job_client = AgentClient::new(accepted.endpoint.clone()).with_token(accepted.token);
        let command = accepted.env.get("BUILDKITE_COMMAND").cloned().unwrap_or_default();

        let mut output = String::new();
        let mut exit_status = 0;
        for line in command.lines() {
            if let Some(file) = line.strip_prefix("buildkite-agent pipeline upload ") {
                let file = file.trim().trim_matches('"');
                let bytes = std::fs::read(file).map_err(|e| {
                    bk_client::ClientError::ParseError(format!("cannot read {}: {}", file, e))
                })?;
                let pipeline = PipelineDocument::parse(&bytes)
                    .map_err(|e| bk_client::ClientError::ParseError(e.to_string()))?;
                let upload = PipelineUpload {
                    pipeline,
                    replace: false,
                };
                job_client.upload_pipeline(job_id, &upload).await?;
                output.push_str(&format!("uploaded {}\n", file));
            } else if let Some(text) = line.strip_prefix("echo ") {
                output.push_str(text);
                output.push('\n');
            } else if let Some(code) = line.strip_prefix("exit ") {
                exit_status = code.trim().parse().unwrap_or(1);
                break;
            }
        }

        client.header_times(job_id).await?;
        if !output.is_empty() {
            client.upload_chunk(job_id, 1, 0, output.as_bytes()).await?;
        }
        client.finish_job(job_id, exit_status).await?;
        Ok(())
    }
}
