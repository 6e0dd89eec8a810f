//! Job API Handlers
//!
//! HTTP endpoints for the job lifecycle and log chunk uploads.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
};
use bk_core::domain::job::JobState;
use bk_core::dto::job::{
    AcceptedJob, ChunkParams, ChunkResponse, FinishJobRequest, JobStateResponse,
    JobTransitionResponse, StartJobRequest,
};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{AppState, parse_job_id, parse_optional_json};
use crate::api::auth::AuthenticatedAgent;
use crate::api::error::{ApiError, ApiResult};
use crate::service::log_sink;

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStateResponse>> {
    let id = parse_job_id(&id)?;
    let job = state.scheduler.get_job(id)?;

    Ok(Json(JobStateResponse { state: job.state }))
}

/// PUT /jobs/{id}/accept
/// Hand the job's environment to the accepting agent
pub async fn accept_job(
    State(state): State<AppState>,
    Extension(AuthenticatedAgent(agent_id)): Extension<AuthenticatedAgent>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<AcceptedJob>> {
    let id = parse_job_id(&id)?;
    let agent = state.agents.get(&agent_id)?;
    let job = state
        .scheduler
        .change_job_state(id, JobState::Scheduled, JobState::Accepted)?;

    let endpoint = headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .map(|host| format!("http://{}", host))
        .unwrap_or_else(|| state.endpoint.clone());

    Ok(Json(AcceptedJob::new(&job, &agent, endpoint)))
}

/// PUT /jobs/{id}/start
pub async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<JobTransitionResponse>> {
    let id = parse_job_id(&id)?;
    let req: StartJobRequest = parse_optional_json(&body)?;
    let job = state
        .scheduler
        .change_job_state(id, JobState::Accepted, JobState::Started)?;

    if let Some(started_at) = req.started_at {
        tracing::debug!("Job {} started at {}", id, started_at);
    }

    Ok(Json(JobTransitionResponse {
        id: job.id,
        state: job.state,
    }))
}

/// PUT /jobs/{id}/finish
pub async fn finish_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<JobTransitionResponse>> {
    let id = parse_job_id(&id)?;
    let req: FinishJobRequest = parse_optional_json(&body)?;
    let job = state.scheduler.finish_job(id, req.exit_code())?;

    match job.exit_status {
        Some(code) => tracing::info!("Job {} exited with status {}", id, code),
        None => tracing::info!("Job {} finished without an exit status", id),
    }
    if let Some(failed) = req.chunks_failed_count.filter(|count| *count > 0) {
        tracing::warn!("Agent failed to upload {} log chunks for job {}", failed, id);
    }

    Ok(Json(JobTransitionResponse {
        id: job.id,
        state: job.state,
    }))
}

// =============================================================================
// Log Endpoints
// =============================================================================

/// POST /jobs/{id}/chunks
/// Decompress a gzipped log chunk and write it to the log sink
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ChunkParams>,
    body: Bytes,
) -> ApiResult<Json<ChunkResponse>> {
    let id = parse_job_id(&id)?;
    tracing::debug!(
        "Log chunk for job {}: sequence={:?} offset={:?} size={:?}",
        id,
        params.sequence,
        params.offset,
        params.size
    );

    let output = log_sink::gunzip(&body)
        .map_err(|e| ApiError::BadRequest(format!("failed to decompress chunk: {}", e)))?;
    state
        .log_sink
        .write_chunk(id, &output)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to write log output: {}", e)))?;

    Ok(Json(ChunkResponse { id: Uuid::new_v4() }))
}

/// POST /jobs/{id}/header_times
pub async fn header_times(Path(id): Path<String>) -> ApiResult<Json<Value>> {
    parse_job_id(&id)?;
    Ok(Json(json!({})))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{TestServer, sample_job};
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use bk_core::domain::job::{Job, JobState};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Registers an agent and hands it a scheduled job
    async fn scheduled_job(server: &TestServer) -> (String, Job) {
        let token = server.register().await;
        let job = sample_job();
        server.state.scheduler.schedule(job.clone());
        server.state.scheduler.next_job().unwrap();
        (token, job)
    }

    #[tokio::test]
    async fn test_accept_returns_env_and_endpoint() {
        let server = TestServer::new();
        let (token, job) = scheduled_job(&server).await;

        let (status, body) = server
            .send(
                Method::PUT,
                &format!("/jobs/{}/accept", job.id),
                Some(&token),
                Body::empty(),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "accepted");
        assert_eq!(body["endpoint"], "http://127.0.0.1:4000");
        assert_eq!(body["chunks_max_size_bytes"], 102_400);
        assert_eq!(body["token"], token);
        assert_eq!(body["env"]["BUILDKITE_COMMAND"], "echo hi");
        assert_eq!(body["env"]["BUILDKITE_BRANCH"], "x");
        assert_eq!(body["env"]["BUILDKITE_COMMIT"], "c1");
        assert_eq!(body["env"]["BUILDKITE_AGENT_NAME"], "test-agent");
    }

    #[tokio::test]
    async fn test_full_lifecycle_over_http() {
        let server = TestServer::new();
        let (token, job) = scheduled_job(&server).await;
        let base = format!("/jobs/{}", job.id);

        for (path, body) in [("accept", "{}"), ("start", r#"{"started_at":"now"}"#)] {
            let (status, _) = server
                .send(Method::PUT, &format!("{}/{}", base, path), Some(&token), body)
                .await;
            assert_eq!(status, StatusCode::OK, "{}", path);
        }

        let (status, body) = server
            .send(
                Method::PUT,
                &format!("{}/finish", base),
                Some(&token),
                r#"{"exit_status":"0","chunks_failed_count":0}"#,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "finished");

        let (_, body) = server.send(Method::GET, &base, Some(&token), Body::empty()).await;
        assert_eq!(body["state"], "finished");
        assert_eq!(
            server.state.scheduler.get_job(job.id).unwrap().exit_status,
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_finish_on_scheduled_job_is_500() {
        let server = TestServer::new();
        let (token, job) = scheduled_job(&server).await;

        let (status, body) = server
            .send(
                Method::PUT,
                &format!("/jobs/{}/finish", job.id),
                Some(&token),
                r#"{"exit_status":"0"}"#,
            )
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("state is scheduled, expected started")
        );
        assert_eq!(
            server.state.scheduler.get_job(job.id).unwrap().state,
            JobState::Scheduled
        );
    }

    #[tokio::test]
    async fn test_unknown_job_is_500() {
        let server = TestServer::new();
        let token = server.register().await;

        let (status, _) = server
            .send(
                Method::PUT,
                &format!("/jobs/{}/accept", uuid::Uuid::new_v4()),
                Some(&token),
                Body::empty(),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_malformed_finish_body_is_400() {
        let server = TestServer::new();
        let (token, job) = scheduled_job(&server).await;

        let (status, _) = server
            .send(
                Method::PUT,
                &format!("/jobs/{}/finish", job.id),
                Some(&token),
                "exit_status=0",
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chunk_is_decompressed_into_sink() {
        let server = TestServer::new();
        let (token, job) = scheduled_job(&server).await;

        let (status, body) = server
            .send(
                Method::POST,
                &format!("/jobs/{}/chunks?sequence=1&offset=0&size=3", job.id),
                Some(&token),
                gzip(b"hi\n"),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert!(uuid::Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());
        assert_eq!(server.logs.job_output(job.id), "hi\n");
    }

    #[tokio::test]
    async fn test_corrupt_chunk_is_400() {
        let server = TestServer::new();
        let (token, job) = scheduled_job(&server).await;

        let (status, body) = server
            .send(
                Method::POST,
                &format!("/jobs/{}/chunks", job.id),
                Some(&token),
                "plain text",
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("decompress"));
        assert!(server.logs.contents().is_empty());
    }

    #[tokio::test]
    async fn test_header_times_is_empty_object() {
        let server = TestServer::new();
        let (token, job) = scheduled_job(&server).await;

        let (status, body) = server
            .send(
                Method::POST,
                &format!("/jobs/{}/header_times", job.id),
                Some(&token),
                "{}",
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({}));
    }
}
