//! Pipeline upload endpoint

use crate::AgentClient;
use crate::error::{ClientError, Result};
use bk_core::domain::pipeline::PipelineUpload;
use uuid::Uuid;

impl AgentClient {
    /// Upload a pipeline from a running job
    ///
    /// # Arguments
    /// * `job_id` - The job performing the upload
    /// * `upload` - The parsed pipeline and its replace flag
    pub async fn upload_pipeline(&self, job_id: Uuid, upload: &PipelineUpload) -> Result<()> {
        let body = serde_json::to_value(upload)
            .map_err(|e| ClientError::ParseError(format!("Failed to encode pipeline: {}", e)))?;

        self.upload_pipeline_json(job_id, &body).await
    }

    /// Upload a raw pipeline request body
    ///
    /// The body is sent as is, in the shape `{"pipeline": ..., "replace": bool}`.
    pub async fn upload_pipeline_json(&self, job_id: Uuid, body: &serde_json::Value) -> Result<()> {
        let url = self.url(&format!("/jobs/{}/pipelines", job_id));
        let request = self.authorize(self.client.post(url))?;
        let response = request.json(body).send().await?;

        self.handle_empty_response(response).await
    }
}
