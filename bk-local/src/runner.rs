//! Local runner
//!
//! Serves the control plane on a loopback port, launches the build agent
//! against it and turns uploaded command steps into jobs until the run is
//! cancelled or, with `exit_when_idle`, every job has finished.

use bk_core::domain::build::{Build, BuildContext};
use bk_core::domain::job::{Job, JobState};
use bk_core::domain::pipeline::{CommandStep, Step};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{AgentLauncher, AgentProcess, AgentSpec, SubprocessLauncher};
use crate::api::{self, AppState};
use crate::config::RunConfig;
use crate::error::{Result, RunnerError};
use crate::prompt::{Prompter, StdinPrompter};
use crate::service::{
    AgentPool, LogSink, MetaDataStore, Scheduler, StdoutLogSink, StepEntry, StepQueue,
    UploadIngester,
};

/// Token the agent registers with; `/register` accepts any token
pub const REGISTRATION_TOKEN: &str = "bk-local-registration-token";

/// How long the server may take to drain connections on shutdown
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Final state of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub id: Uuid,
    pub label: String,
    pub state: JobState,
    pub exit_status: Option<i32>,
    /// Finished with a non-zero exit status
    pub failed: bool,
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub build: Build,
    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    /// Jobs that finished with a non-zero exit status
    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobSummary> {
        self.jobs.iter().filter(|job| job.failed)
    }

    /// True when any job finished with a non-zero exit status
    pub fn failed(&self) -> bool {
        self.failed_jobs().next().is_some()
    }
}

/// Runs a pipeline locally
pub struct LocalRunner {
    config: RunConfig,
    launcher: Arc<dyn AgentLauncher>,
    log_sink: Arc<dyn LogSink>,
    prompter: Arc<dyn Prompter>,
    agents: Arc<AgentPool>,
    scheduler: Arc<Scheduler>,
    queue: Arc<StepQueue>,
    meta_data: Arc<MetaDataStore>,
}

impl LocalRunner {
    /// Creates a runner that launches the configured agent binary
    pub fn new(config: RunConfig) -> Self {
        let launcher = Arc::new(SubprocessLauncher::new(config.agent_binary.clone()));
        Self {
            config,
            launcher,
            log_sink: Arc::new(StdoutLogSink),
            prompter: Arc::new(StdinPrompter),
            agents: Arc::new(AgentPool::new()),
            scheduler: Arc::new(Scheduler::new()),
            queue: Arc::new(StepQueue::new()),
            meta_data: Arc::new(MetaDataStore::new()),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn AgentLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// The job store of this run
    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Runs until `cancel` fires or, with `exit_when_idle`, all work is done
    ///
    /// The listener and the agent are released on every exit path.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunSummary> {
        self.config.validate()?;
        let step_filter = self.config.compiled_step_filter()?;

        // 1. Control-plane listener on an ephemeral loopback port
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .map_err(RunnerError::Listener)?;
        let addr = listener.local_addr().map_err(RunnerError::Listener)?;
        let endpoint = format!("http://{}", addr);
        info!("Control plane listening on {}", endpoint);

        // 2. Seed job
        let build = Build::new(&endpoint, 1);
        let context = self.config.build_context();
        let mut seed = Job::new(
            build.clone(),
            &context,
            self.config.seed_label(),
            self.config.seed_command(),
        );
        seed.env = self.config.env.clone();
        self.scheduler.schedule(seed);

        // 3. Upload ingestion and the server
        let in_flight = Arc::new(AtomicUsize::new(0));
        let (uploads, upload_rx) = mpsc::channel(self.config.upload_buffer);
        let ingest = tokio::spawn(
            UploadIngester::new(Arc::clone(&self.queue), step_filter, Arc::clone(&in_flight))
                .run(upload_rx),
        );

        let state = AppState {
            agents: Arc::clone(&self.agents),
            scheduler: Arc::clone(&self.scheduler),
            meta_data: Arc::clone(&self.meta_data),
            log_sink: Arc::clone(&self.log_sink),
            uploads,
            uploads_in_flight: Arc::clone(&in_flight),
            endpoint: endpoint.clone(),
        };
        let shutdown = CancellationToken::new();
        let mut server = spawn_server(listener, state, shutdown.clone());

        // 4. The agent
        let spec = AgentSpec {
            endpoint,
            token: REGISTRATION_TOKEN.to_string(),
            name: self.config.agent_name.clone(),
            build_path: self.config.build_path.clone(),
        };
        let outcome = match self.launcher.launch(&spec).await {
            Ok(mut agent) => {
                let outcome = self
                    .drive(&build, &context, &in_flight, agent.as_mut(), &cancel)
                    .await;
                if let Err(e) = agent.terminate().await {
                    warn!("Failed to stop agent: {}", e);
                }
                outcome
            }
            Err(e) => Err(e),
        };

        // 5. Teardown
        shutdown.cancel();
        let server_result = match time::timeout(SERVER_SHUTDOWN_TIMEOUT, &mut server).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("Server task failed: {}", e);
                Ok(())
            }
            Err(_) => {
                warn!("Server did not shut down within {:?}", SERVER_SHUTDOWN_TIMEOUT);
                server.abort();
                Ok(())
            }
        };
        ingest.abort();

        outcome?;
        server_result?;

        Ok(self.summary(build))
    }

    /// The main loop
    async fn drive(
        &self,
        build: &Build,
        context: &BuildContext,
        in_flight: &AtomicUsize,
        agent: &mut dyn AgentProcess,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutting down runner");
                    return Ok(());
                }
                exit = agent.wait() => {
                    let status = match exit {
                        Ok(status) => status,
                        Err(e) => e.to_string(),
                    };
                    return Err(RunnerError::AgentExited(status));
                }
                _ = ticker.tick() => {
                    if !self.drain_steps(build, context, cancel).await {
                        info!("shutting down runner");
                        return Ok(());
                    }

                    if self.config.exit_when_idle && self.is_idle(in_flight) {
                        info!("All jobs finished");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Turns every pending step into jobs
    ///
    /// Returns false when `cancel` fired while a prompt was pending.
    async fn drain_steps(
        &self,
        build: &Build,
        context: &BuildContext,
        cancel: &CancellationToken,
    ) -> bool {
        while let Some(entry) = self.queue.next() {
            match &entry.step {
                Step::Command(step) => {
                    if !self.command_step(build, context, &entry, step, cancel).await {
                        return false;
                    }
                }
                Step::Wait(_) => info!("wait step reached"),
                Step::Block(block) => {
                    info!("block step reached: {}", block.label);
                    if self.config.prompt {
                        let question = match &block.prompt {
                            Some(prompt) => format!("{} {}. Continue?", block.label, prompt),
                            None => format!("{}. Continue?", block.label),
                        };
                        match self.confirm(&question, cancel).await {
                            Some(true) => {}
                            Some(false) => {
                                let dropped = self.queue.clear();
                                info!(
                                    "Build blocked at {}; dropped {} pending steps",
                                    block.label, dropped
                                );
                            }
                            None => return false,
                        }
                    }
                }
                Step::Trigger(trigger) => {
                    warn!(
                        "trigger step for pipeline {} is not supported locally",
                        trigger.pipeline
                    );
                }
            }
        }
        true
    }

    /// Schedules one command step; false when cancelled at the prompt
    async fn command_step(
        &self,
        build: &Build,
        context: &BuildContext,
        entry: &StepEntry,
        step: &CommandStep,
        cancel: &CancellationToken,
    ) -> bool {
        let job = job_from_step(build, context, &entry.inherited_env, step);

        if self.config.dry_run {
            println!("[dry-run] {}: {}", job.label, job.command);
            return true;
        }

        if self.config.prompt {
            let question = format!("Run step {}?", job.label);
            match self.confirm(&question, cancel).await {
                Some(true) => {}
                Some(false) => {
                    info!("Skipping step {} (declined)", job.label);
                    return true;
                }
                None => return false,
            }
        }

        self.scheduler.schedule(job);
        true
    }

    /// Asks the prompter; `None` when the run is cancelled first
    async fn confirm(&self, question: &str, cancel: &CancellationToken) -> Option<bool> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            answer = self.prompter.confirm(question) => Some(answer),
        }
    }

    /// True when no job can still produce or consume work
    ///
    /// Jobs upload before they finish and the ingester applies an upload
    /// before decrementing `in_flight`, so the reads must happen in this
    /// order for an empty queue to mean nothing is pending.
    fn is_idle(&self, in_flight: &AtomicUsize) -> bool {
        let idle = self.scheduler.all_finished()
            && in_flight.load(Ordering::SeqCst) == 0
            && self.queue.is_empty();
        debug!("Idle check: {}", idle);
        idle
    }

    fn summary(&self, build: Build) -> RunSummary {
        let jobs = self
            .scheduler
            .jobs()
            .into_iter()
            .map(|job| JobSummary {
                failed: job.failed(),
                id: job.id,
                label: job.label,
                state: job.state,
                exit_status: job.exit_status,
            })
            .collect();
        RunSummary { build, jobs }
    }
}

/// Serves the control plane until `shutdown` fires
fn spawn_server(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> JoinHandle<Result<()>> {
    let router = api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
            .await
            .map_err(RunnerError::Server)
    })
}

/// Builds the job for an uploaded command step
///
/// The job env is the pipeline env followed by the step's own env, so step
/// values win on conflicts.
pub fn job_from_step(
    build: &Build,
    context: &BuildContext,
    inherited_env: &[String],
    step: &CommandStep,
) -> Job {
    let mut job = Job::new(build.clone(), context, step.display_label(), step.script());

    job.env = inherited_env
        .iter()
        .chain(step.env.iter())
        .cloned()
        .collect();
    job.artifact_paths = step.artifact_paths.join(";");
    job.timeout = step.timeout_in_minutes;
    if !step.plugins.is_empty() {
        match serde_json::to_string(&step.plugins) {
            Ok(json) => job.plugin_json = Some(json),
            Err(e) => warn!("Failed to encode plugins for {}: {}", job.label, e),
        }
    }

    job
}
