//! API Module
//!
//! Control-plane HTTP API spoken by the build agent.
//! Each submodule handles endpoints for a specific part of the protocol.

pub mod agent;
pub mod auth;
pub mod error;
pub mod job;
pub mod meta_data;
pub mod pipeline;

use axum::{
    Router,
    body::Bytes,
    http::Uri,
    middleware,
    routing::{get, post, put},
};
use bk_core::domain::pipeline::PipelineUpload;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::{AgentPool, LogSink, MetaDataStore, Scheduler};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<AgentPool>,
    pub scheduler: Arc<Scheduler>,
    pub meta_data: Arc<MetaDataStore>,
    pub log_sink: Arc<dyn LogSink>,
    /// Sending side of the pipeline upload channel
    pub uploads: mpsc::Sender<PipelineUpload>,
    /// Uploads sent but not yet applied to the step queue
    pub uploads_in_flight: Arc<AtomicUsize>,
    /// Advertised endpoint, used when a request carries no `Host` header
    pub endpoint: String,
}

/// Create the control-plane router with all agent endpoints
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        // Agent endpoints
        .route("/connect", post(agent::connect))
        .route("/disconnect", post(agent::disconnect))
        .route("/heartbeat", post(agent::heartbeat))
        .route("/ping", get(agent::ping))
        // Job endpoints
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/accept", put(job::accept_job))
        .route("/jobs/{id}/start", put(job::start_job))
        .route("/jobs/{id}/finish", put(job::finish_job))
        .route("/jobs/{id}/chunks", post(job::upload_chunk))
        .route("/jobs/{id}/header_times", post(job::header_times))
        // Meta-data endpoints
        .route("/jobs/{id}/data/exists", post(meta_data::exists))
        .route("/jobs/{id}/data/set", post(meta_data::set))
        .route("/jobs/{id}/data/get", post(meta_data::get))
        // Pipeline endpoints
        .route("/jobs/{id}/pipelines", post(pipeline::upload_pipeline))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_agent,
        ));

    Router::new()
        .route("/register", post(agent::register))
        .merge(authenticated)
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}

// =============================================================================
// Request helpers
// =============================================================================

/// Parses a job id path segment; anything but a UUID is an unknown route
pub(crate) fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("no job route for {}", raw)))
}

/// Parses a required JSON body
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("malformed JSON: {}", e)))
}

/// Parses a JSON body that the agent may leave empty
pub(crate) fn parse_optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}
