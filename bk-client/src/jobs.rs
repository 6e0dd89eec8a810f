//! Job lifecycle and log endpoints

use crate::AgentClient;
use crate::error::Result;
use bk_core::domain::job::JobState;
use bk_core::dto::job::{
    AcceptedJob, ChunkParams, ChunkResponse, FinishJobRequest, JobStateResponse,
    JobTransitionResponse, StartJobRequest,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use uuid::Uuid;

impl AgentClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Get the current state of a job
    pub async fn job_state(&self, job_id: Uuid) -> Result<JobState> {
        let request = self.authorize(self.client.get(self.url(&format!("/jobs/{}", job_id))))?;
        let response = request.send().await?;

        let body: JobStateResponse = self.handle_response(response).await?;
        Ok(body.state)
    }

    /// Accept an offered job
    ///
    /// # Returns
    /// The job's environment and the token for in-job agent commands
    pub async fn accept_job(&self, job_id: Uuid) -> Result<AcceptedJob> {
        let url = self.url(&format!("/jobs/{}/accept", job_id));
        let request = self.authorize(self.client.put(url))?;
        let response = request.json(&serde_json::json!({})).send().await?;

        self.handle_response(response).await
    }

    pub async fn start_job(&self, job_id: Uuid) -> Result<JobTransitionResponse> {
        let url = self.url(&format!("/jobs/{}/start", job_id));
        let request = self.authorize(self.client.put(url))?;
        let response = request.json(&StartJobRequest::default()).send().await?;

        self.handle_response(response).await
    }

    /// Finish a job with the exit status of its command
    pub async fn finish_job(&self, job_id: Uuid, exit_status: i32) -> Result<JobTransitionResponse> {
        let url = self.url(&format!("/jobs/{}/finish", job_id));
        let request = self.authorize(self.client.put(url))?;
        let body = FinishJobRequest {
            exit_status: Some(serde_json::Value::String(exit_status.to_string())),
            finished_at: None,
            chunks_failed_count: Some(0),
        };
        let response = request.json(&body).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Logs
    // =============================================================================

    /// Upload a segment of job output
    ///
    /// The output is gzip-compressed before sending.
    ///
    /// # Arguments
    /// * `job_id` - The job the output belongs to
    /// * `sequence` - 1-based chunk number
    /// * `offset` - Byte offset of this chunk in the job's output
    /// * `output` - Uncompressed output
    pub async fn upload_chunk(
        &self,
        job_id: Uuid,
        sequence: u64,
        offset: u64,
        output: &[u8],
    ) -> Result<ChunkResponse> {
        let params = ChunkParams {
            sequence: Some(sequence),
            offset: Some(offset),
            size: Some(output.len() as u64),
        };
        let url = self.url(&format!("/jobs/{}/chunks", job_id));
        let request = self.authorize(self.client.post(url))?;
        let response = request
            .query(&params)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(gzip(output)?)
            .send()
            .await?;

        tracing::debug!("Uploaded chunk {} for job {}", sequence, job_id);
        self.handle_response(response).await
    }

    pub async fn header_times(&self, job_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/jobs/{}/header_times", job_id));
        let request = self.authorize(self.client.post(url))?;
        let response = request.json(&serde_json::json!({})).send().await?;

        self.handle_empty_response(response).await
    }
}

/// Gzip-compresses a log chunk
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
