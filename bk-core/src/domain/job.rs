//! Job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::build::{Build, BuildContext};

/// A unit of work handed to the build agent
///
/// Jobs are created by the runner (the seed job, or the expansion of an
/// uploaded command step) and owned by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub build: Build,
    pub state: JobState,
    pub command: String,
    pub label: String,
    pub commit: String,
    pub branch: String,
    pub tag: String,
    pub message: String,
    pub repository: String,
    pub organization_slug: String,
    pub pipeline_slug: String,
    pub artifact_paths: String,
    pub plugin_json: Option<String>,
    pub retry_count: u32,
    /// Timeout in minutes
    pub timeout: Option<u64>,
    pub creator_name: String,
    pub creator_email: String,
    /// Extra `KEY=VALUE` environment for the job
    pub env: Vec<String>,
    /// Exit status reported by the agent on finish
    pub exit_status: Option<i32>,
}

impl Job {
    /// Creates an empty job for `build` running `command`
    pub fn new(
        build: Build,
        context: &BuildContext,
        label: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            build,
            state: JobState::Empty,
            command: command.into(),
            label: label.into(),
            commit: context.commit.clone(),
            branch: context.branch.clone(),
            tag: context.tag.clone(),
            message: context.message.clone(),
            repository: context.repository.clone(),
            organization_slug: context.organization_slug.clone(),
            pipeline_slug: context.pipeline_slug.clone(),
            artifact_paths: String::new(),
            plugin_json: None,
            retry_count: 0,
            timeout: None,
            creator_name: context.creator_name.clone(),
            creator_email: context.creator_email.clone(),
            env: Vec::new(),
            exit_status: None,
        }
    }

    /// True once the agent finished the job with a non-zero exit status
    pub fn failed(&self) -> bool {
        self.state == JobState::Finished && self.exit_status.is_some_and(|code| code != 0)
    }
}

/// Job lifecycle state
///
/// Transitions are strictly `empty -> scheduled -> accepted -> started -> finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Empty,
    Scheduled,
    Accepted,
    Started,
    Finished,
}

impl JobState {
    /// The state a job must be in to move into `self`
    pub fn predecessor(self) -> Option<JobState> {
        match self {
            JobState::Empty => None,
            JobState::Scheduled => Some(JobState::Empty),
            JobState::Accepted => Some(JobState::Scheduled),
            JobState::Started => Some(JobState::Accepted),
            JobState::Finished => Some(JobState::Started),
        }
    }

    pub fn is_terminal(self) -> bool {
        self == JobState::Finished
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Empty => write!(f, "empty"),
            JobState::Scheduled => write!(f, "scheduled"),
            JobState::Accepted => write!(f, "accepted"),
            JobState::Started => write!(f, "started"),
            JobState::Finished => write!(f, "finished"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_copies_build_context() {
        let build = Build::new("http://127.0.0.1:9000", 1);
        let context = BuildContext {
            commit: "c1".to_string(),
            branch: "x".to_string(),
            message: "hello".to_string(),
            ..Default::default()
        };

        let job = Job::new(build.clone(), &context, ":bash:", "echo hi");

        assert_eq!(job.state, JobState::Empty);
        assert_eq!(job.build, build);
        assert_eq!(job.commit, "c1");
        assert_eq!(job.branch, "x");
        assert_eq!(job.message, "hello");
        assert_eq!(job.command, "echo hi");
        assert!(job.plugin_json.is_none());
    }

    #[test]
    fn test_predecessors_form_a_single_chain() {
        assert_eq!(JobState::Empty.predecessor(), None);
        assert_eq!(JobState::Scheduled.predecessor(), Some(JobState::Empty));
        assert_eq!(JobState::Accepted.predecessor(), Some(JobState::Scheduled));
        assert_eq!(JobState::Started.predecessor(), Some(JobState::Accepted));
        assert_eq!(JobState::Finished.predecessor(), Some(JobState::Started));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobState::Scheduled).unwrap(),
            "\"scheduled\""
        );
        assert_eq!(JobState::Started.to_string(), "started");
    }

    #[test]
    fn test_failed_requires_finished_with_nonzero_exit() {
        let mut job = Job::new(
            Build::new("http://localhost", 1),
            &BuildContext::default(),
            "",
            "false",
        );
        job.exit_status = Some(1);
        assert!(!job.failed());

        job.state = JobState::Finished;
        assert!(job.failed());

        job.exit_status = Some(0);
        assert!(!job.failed());
    }
}
