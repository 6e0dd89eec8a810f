//! Agent authentication
//!
//! Every route except `/register` requires `Authorization: Token <token>`
//! carrying an access token minted by `/register`.

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::api::error::ApiError;

/// Id of the agent that authenticated the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAgent(pub String);

pub async fn require_agent(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Token "))
        .map(str::trim);

    let Some(token) = token else {
        return ApiError::Unauthorized(
            "missing or invalid Authorization header. Use: Token <token>".to_string(),
        )
        .into_response();
    };

    match state.agents.authenticate(token) {
        Ok(agent_id) => {
            req.extensions_mut().insert(AuthenticatedAgent(agent_id));
            next.run(req).await
        }
        Err(err) => {
            tracing::warn!("Rejected request to {}: {}", req.uri().path(), err);
            ApiError::from(err).into_response()
        }
    }
}
