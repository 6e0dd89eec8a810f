//! Pipeline API Handlers
//!
//! Pipeline uploads from running jobs. Uploads are parsed here and handed
//! to the ingestion task over the upload channel.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use bk_core::domain::pipeline::PipelineUpload;
use serde_json::{Value, json};
use std::sync::atomic::Ordering;

use super::{AppState, parse_job_id};
use crate::api::error::{ApiError, ApiResult};

/// POST /jobs/{id}/pipelines
pub async fn upload_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let id = parse_job_id(&id)?;
    let upload = PipelineUpload::parse(&body)?;
    tracing::info!(
        "Job {} uploaded a pipeline with {} steps",
        id,
        upload.pipeline.steps.len()
    );

    state.uploads_in_flight.fetch_add(1, Ordering::SeqCst);
    if state.uploads.send(upload).await.is_err() {
        state.uploads_in_flight.fetch_sub(1, Ordering::SeqCst);
        return Err(ApiError::Internal(
            "pipeline upload channel is closed".to_string(),
        ));
    }

    Ok(Json(json!({})))
}
