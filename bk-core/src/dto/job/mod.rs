//! Job DTOs
//!
//! Bodies for the job lifecycle endpoints and log chunk uploads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::agent::Agent;
use crate::domain::job::{Job, JobState};

/// Largest log chunk the agent may send, in bytes
pub const CHUNKS_MAX_SIZE_BYTES: u64 = 102_400;

/// Response to `GET /jobs/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStateResponse {
    pub state: JobState,
}

/// Response to `PUT /jobs/{id}/accept`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedJob {
    pub id: Uuid,
    pub endpoint: String,
    pub state: JobState,
    pub env: BTreeMap<String, String>,
    /// Access token the job uses for in-job agent commands
    pub token: String,
    pub chunks_max_size_bytes: u64,
}

impl AcceptedJob {
    pub fn new(job: &Job, agent: &Agent, endpoint: String) -> Self {
        Self {
            id: job.id,
            endpoint,
            state: job.state,
            env: job_env(job, agent),
            token: agent.access_token.clone(),
            chunks_max_size_bytes: CHUNKS_MAX_SIZE_BYTES,
        }
    }
}

/// Builds the environment a job runs with
///
/// The job's own `KEY=VALUE` entries come first; protocol keys override them.
pub fn job_env(job: &Job, agent: &Agent) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = job
        .env
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    let timeout = job
        .timeout
        .map(|minutes| minutes.to_string())
        .unwrap_or_else(|| "false".to_string());
    let plugins = job.plugin_json.clone().unwrap_or_else(|| "[]".to_string());

    let protocol = [
        ("CI", "true".to_string()),
        ("BUILDKITE", "true".to_string()),
        ("BUILDKITE_SOURCE", "local".to_string()),
        ("BUILDKITE_AGENT_NAME", agent.name.clone()),
        ("BUILDKITE_AGENT_ID", agent.id.clone()),
        ("BUILDKITE_AGENT_META_DATA_QUEUE", "default".to_string()),
        ("BUILDKITE_BUILD_ID", job.build.id.to_string()),
        ("BUILDKITE_BUILD_NUMBER", job.build.number.to_string()),
        ("BUILDKITE_BUILD_URL", job.build.url.clone()),
        ("BUILDKITE_JOB_ID", job.id.to_string()),
        ("BUILDKITE_COMMAND", job.command.clone()),
        ("BUILDKITE_LABEL", job.label.clone()),
        ("BUILDKITE_MESSAGE", job.message.clone()),
        ("BUILDKITE_COMMIT", job.commit.clone()),
        ("BUILDKITE_BRANCH", job.branch.clone()),
        ("BUILDKITE_TAG", job.tag.clone()),
        ("BUILDKITE_REPO", job.repository.clone()),
        ("BUILDKITE_ORGANIZATION_SLUG", job.organization_slug.clone()),
        ("BUILDKITE_PIPELINE_SLUG", job.pipeline_slug.clone()),
        ("BUILDKITE_PIPELINE_DEFAULT_BRANCH", "master".to_string()),
        ("BUILDKITE_PIPELINE_PROVIDER", "local".to_string()),
        ("BUILDKITE_PROJECT_PROVIDER", "local".to_string()),
        ("BUILDKITE_TIMEOUT", timeout),
        ("BUILDKITE_RETRY_COUNT", job.retry_count.to_string()),
        ("BUILDKITE_ARTIFACT_PATHS", job.artifact_paths.clone()),
        ("BUILDKITE_BUILD_CREATOR", job.creator_name.clone()),
        ("BUILDKITE_BUILD_CREATOR_EMAIL", job.creator_email.clone()),
        ("BUILDKITE_PLUGINS", plugins),
        ("BUILDKITE_PULL_REQUEST", "false".to_string()),
        ("BUILDKITE_PULL_REQUEST_BASE_BRANCH", String::new()),
        ("BUILDKITE_PULL_REQUEST_REPO", String::new()),
        ("BUILDKITE_REBUILT_FROM_BUILD_ID", String::new()),
        ("BUILDKITE_REBUILT_FROM_BUILD_NUMBER", String::new()),
        ("BUILDKITE_TRIGGERED_FROM_BUILD_ID", String::new()),
        ("BUILDKITE_SCRIPT_PATH", String::new()),
    ];

    for (key, value) in protocol {
        env.insert(key.to_string(), value);
    }
    env
}

/// Body of `PUT /jobs/{id}/start`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartJobRequest {
    pub started_at: Option<String>,
}

/// Body of `PUT /jobs/{id}/finish`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinishJobRequest {
    /// The agent sends this as a string; numbers are accepted too
    pub exit_status: Option<Value>,
    pub finished_at: Option<String>,
    pub chunks_failed_count: Option<u64>,
}

impl FinishJobRequest {
    pub fn exit_code(&self) -> Option<i32> {
        match self.exit_status.as_ref()? {
            Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Response to the start and finish transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTransitionResponse {
    pub id: Uuid,
    pub state: JobState,
}

/// Query string of `POST /jobs/{id}/chunks`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkParams {
    pub sequence: Option<u64>,
    pub offset: Option<u64>,
    pub size: Option<u64>,
}

/// Response to `POST /jobs/{id}/chunks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::build::{Build, BuildContext};
    use serde_json::json;

    fn sample_job() -> Job {
        let context = BuildContext {
            commit: "c1".to_string(),
            branch: "x".to_string(),
            organization_slug: "local".to_string(),
            pipeline_slug: "local".to_string(),
            ..Default::default()
        };
        Job::new(
            Build::new("http://127.0.0.1:4000", 1),
            &context,
            ":bash:",
            "echo hi",
        )
    }

    #[test]
    fn test_job_env_contains_protocol_keys() {
        let job = sample_job();
        let agent = Agent::mint("local-agent");
        let env = job_env(&job, &agent);

        assert_eq!(env["CI"], "true");
        assert_eq!(env["BUILDKITE_SOURCE"], "local");
        assert_eq!(env["BUILDKITE_COMMAND"], "echo hi");
        assert_eq!(env["BUILDKITE_BRANCH"], "x");
        assert_eq!(env["BUILDKITE_COMMIT"], "c1");
        assert_eq!(env["BUILDKITE_AGENT_NAME"], "local-agent");
        assert_eq!(env["BUILDKITE_AGENT_ID"], agent.id);
        assert_eq!(env["BUILDKITE_JOB_ID"], job.id.to_string());
        assert_eq!(env["BUILDKITE_BUILD_NUMBER"], "1");
        assert_eq!(env["BUILDKITE_BUILD_URL"], "http://127.0.0.1:4000/builds/1");
        assert_eq!(env["BUILDKITE_PLUGINS"], "[]");
        assert_eq!(env["BUILDKITE_TIMEOUT"], "false");
        assert_eq!(env["BUILDKITE_PULL_REQUEST"], "false");
        assert_eq!(env["BUILDKITE_REBUILT_FROM_BUILD_ID"], "");
    }

    #[test]
    fn test_protocol_keys_override_job_env() {
        let mut job = sample_job();
        job.env = vec![
            "FOO=bar=baz".to_string(),
            "BUILDKITE_COMMAND=rm -rf /".to_string(),
        ];
        job.timeout = Some(15);
        job.plugin_json = Some(r#"[{"docker#v5":{}}]"#.to_string());

        let env = job_env(&job, &Agent::mint("a"));
        assert_eq!(env["FOO"], "bar=baz");
        assert_eq!(env["BUILDKITE_COMMAND"], "echo hi");
        assert_eq!(env["BUILDKITE_TIMEOUT"], "15");
        assert_eq!(env["BUILDKITE_PLUGINS"], r#"[{"docker#v5":{}}]"#);
    }

    #[test]
    fn test_accepted_job_carries_token_and_chunk_size() {
        let job = sample_job();
        let agent = Agent::mint("a");
        let accepted = AcceptedJob::new(&job, &agent, "http://127.0.0.1:4000".to_string());
        assert_eq!(accepted.token, agent.access_token);
        assert_eq!(accepted.chunks_max_size_bytes, 102_400);
    }

    #[test]
    fn test_finish_exit_code_from_string_or_number() {
        let req: FinishJobRequest = serde_json::from_value(json!({"exit_status": "2"})).unwrap();
        assert_eq!(req.exit_code(), Some(2));

        let req: FinishJobRequest = serde_json::from_value(json!({"exit_status": 0})).unwrap();
        assert_eq!(req.exit_code(), Some(0));

        let req: FinishJobRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.exit_code(), None);
    }
}
