//! Scheduler
//!
//! Owns every job of the invocation and enforces the lifecycle
//! `empty -> scheduled -> accepted -> started -> finished`.

use bk_core::domain::job::{Job, JobState};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use super::lock;

/// Scheduler error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("job {0} not found")]
    UnknownJob(Uuid),

    #[error("job {id} state is {actual}, expected {expected}")]
    WrongState {
        id: Uuid,
        actual: JobState,
        expected: JobState,
    },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// In-memory job queue
///
/// Jobs are kept in insertion order and `next_job` hands out the oldest
/// empty job first, so no empty job waits behind one scheduled later.
#[derive(Debug, Default)]
pub struct Scheduler {
    jobs: Mutex<Vec<Job>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job in state `empty`
    pub fn schedule(&self, mut job: Job) {
        job.state = JobState::Empty;
        tracing::info!("Scheduled job {} ({})", job.id, job.label);
        lock(&self.jobs).push(job);
    }

    /// Takes the oldest empty job and marks it `scheduled`
    pub fn next_job(&self) -> Option<Job> {
        let mut jobs = lock(&self.jobs);
        let job = jobs.iter_mut().find(|job| job.state == JobState::Empty)?;
        job.state = JobState::Scheduled;
        tracing::debug!("Job {} is now scheduled", job.id);
        Some(job.clone())
    }

    /// Moves a job from `from` to `to`, returning the updated job
    pub fn change_job_state(&self, id: Uuid, from: JobState, to: JobState) -> Result<Job> {
        self.transition(id, from, to, |_| {})
    }

    /// Moves a job from `started` to `finished` and records its exit status
    pub fn finish_job(&self, id: Uuid, exit_status: Option<i32>) -> Result<Job> {
        self.transition(id, JobState::Started, JobState::Finished, |job| {
            job.exit_status = exit_status;
        })
    }

    pub fn get_job(&self, id: Uuid) -> Result<Job> {
        lock(&self.jobs)
            .iter()
            .find(|job| job.id == id)
            .cloned()
            .ok_or(SchedulerError::UnknownJob(id))
    }

    /// Snapshot of every job in scheduling order
    pub fn jobs(&self) -> Vec<Job> {
        lock(&self.jobs).clone()
    }

    /// True when at least one job exists and all of them are finished
    pub fn all_finished(&self) -> bool {
        let jobs = lock(&self.jobs);
        !jobs.is_empty() && jobs.iter().all(|job| job.state.is_terminal())
    }

    fn transition(
        &self,
        id: Uuid,
        from: JobState,
        to: JobState,
        update: impl FnOnce(&mut Job),
    ) -> Result<Job> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or(SchedulerError::UnknownJob(id))?;

        if job.state != from {
            tracing::warn!(
                "Rejected transition of job {} to {}: state is {}",
                id,
                to,
                job.state
            );
            return Err(SchedulerError::WrongState {
                id,
                actual: job.state,
                expected: from,
            });
        }

        job.state = to;
        update(job);
        tracing::info!("Job {} ({}) is now {}", job.id, job.label, to);
        Ok(job.clone())
    }
}
