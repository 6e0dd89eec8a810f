//! Agent API Handlers
//!
//! Registration, connection and polling endpoints.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
};
use bk_core::domain::agent::Agent;
use bk_core::dto::agent::{
    ConnectionResponse, PingJob, PingResponse, RegisterRequest, RegisterResponse,
};
use serde_json::{Value, json};

use super::{AppState, parse_optional_json};
use crate::api::auth::AuthenticatedAgent;
use crate::api::error::ApiResult;

const DEFAULT_AGENT_NAME: &str = "local-agent";

/// POST /register
/// Mint a new agent and its access token
pub async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<RegisterResponse>> {
    let req: RegisterRequest = parse_optional_json(&body)?;
    let name = req
        .name
        .filter(|name| !name.is_empty())
        .or(req.hostname)
        .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string());

    let agent = Agent::mint(name);
    tracing::info!("Registered agent {} ({})", agent.name, agent.id);
    let response = RegisterResponse::for_agent(&agent);
    state.agents.register(agent);

    Ok(Json(response))
}

/// POST /connect
pub async fn connect(
    State(state): State<AppState>,
    Extension(AuthenticatedAgent(id)): Extension<AuthenticatedAgent>,
) -> ApiResult<Json<ConnectionResponse>> {
    let agent = state.agents.connect(&id)?;

    Ok(Json(ConnectionResponse {
        id: agent.id,
        connection_state: agent.state,
    }))
}

/// POST /disconnect
pub async fn disconnect(
    State(state): State<AppState>,
    Extension(AuthenticatedAgent(id)): Extension<AuthenticatedAgent>,
) -> ApiResult<Json<ConnectionResponse>> {
    let agent = state.agents.disconnect(&id)?;

    Ok(Json(ConnectionResponse {
        id: agent.id,
        connection_state: agent.state,
    }))
}

/// POST /heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(AuthenticatedAgent(id)): Extension<AuthenticatedAgent>,
) -> ApiResult<Json<Value>> {
    state.agents.heartbeat(&id)?;
    tracing::debug!("Heartbeat from agent {}", id);

    Ok(Json(json!({})))
}

/// GET /ping
/// Offer the next empty job, marking it scheduled
pub async fn ping(
    State(state): State<AppState>,
    Extension(AuthenticatedAgent(id)): Extension<AuthenticatedAgent>,
) -> ApiResult<Json<PingResponse>> {
    let job = state.scheduler.next_job().map(|job| {
        tracing::info!("Offering job {} to agent {}", job.id, id);
        PingJob { id: job.id }
    });

    Ok(Json(PingResponse { job }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{TestServer, sample_job};
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use bk_core::domain::agent::AgentState;
    use bk_core::domain::job::JobState;

    #[tokio::test]
    async fn test_register_returns_intervals_and_token() {
        let server = TestServer::new();
        let (status, body) = server
            .send(Method::POST, "/register", None, r#"{"name":"laptop"}"#)
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "laptop");
        assert_eq!(body["ping_interval"], 2);
        assert_eq!(body["job_status_interval"], 5);
        assert_eq!(body["heartbeat_interval"], 5);
        assert_eq!(body["meta_data"][0], "queue=default");

        let id = body["id"].as_str().unwrap();
        let agent = server.state.agents.get(id).unwrap();
        assert_eq!(body["access_token"], agent.access_token);
        assert_eq!(agent.state, AgentState::Registered);
    }

    #[tokio::test]
    async fn test_register_accepts_empty_body() {
        let server = TestServer::new();
        let (status, body) = server
            .send(Method::POST, "/register", None, Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "local-agent");
    }

    #[tokio::test]
    async fn test_register_rejects_malformed_json() {
        let server = TestServer::new();
        let (status, body) = server
            .send(Method::POST, "/register", None, "{not json")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("malformed JSON"));
        assert!(server.state.agents.is_empty());
    }

    #[tokio::test]
    async fn test_connect_then_disconnect() {
        let server = TestServer::new();
        let token = server.register().await;

        let (status, body) = server
            .send(Method::POST, "/connect", Some(&token), Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connection_state"], "connected");

        let (status, body) = server
            .send(Method::POST, "/disconnect", Some(&token), Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connection_state"], "disconnected");
    }

    #[tokio::test]
    async fn test_heartbeat_is_empty_object() {
        let server = TestServer::new();
        let token = server.register().await;

        let (status, body) = server
            .send(Method::POST, "/heartbeat", Some(&token), "{}")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_ping_offers_job_once() {
        let server = TestServer::new();
        let token = server.register().await;

        let (_, body) = server
            .send(Method::GET, "/ping", Some(&token), Body::empty())
            .await;
        assert_eq!(body, serde_json::json!({}));

        let job = sample_job();
        server.state.scheduler.schedule(job.clone());

        let (status, body) = server
            .send(Method::GET, "/ping", Some(&token), Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job"]["id"], job.id.to_string());
        assert_eq!(
            server.state.scheduler.get_job(job.id).unwrap().state,
            JobState::Scheduled
        );

        let (_, body) = server
            .send(Method::GET, "/ping", Some(&token), Body::empty())
            .await;
        assert_eq!(body, serde_json::json!({}));
    }
}
