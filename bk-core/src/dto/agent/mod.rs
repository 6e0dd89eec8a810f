//! Agent DTOs
//!
//! Registration, connection and polling bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentState};

/// Body of `POST /register`
///
/// Every field is optional; an empty body registers an unnamed agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub meta_data: Vec<String>,
}

/// Response to `POST /register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: String,
    pub name: String,
    pub access_token: String,
    /// Seconds between pings
    pub ping_interval: u64,
    /// Seconds between job state checks
    pub job_status_interval: u64,
    /// Seconds between heartbeats
    pub heartbeat_interval: u64,
    pub meta_data: Vec<String>,
}

impl RegisterResponse {
    /// Registration response for a freshly minted agent
    pub fn for_agent(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            access_token: agent.access_token.clone(),
            ping_interval: 2,
            job_status_interval: 5,
            heartbeat_interval: 5,
            meta_data: vec!["queue=default".to_string()],
        }
    }
}

/// Response to `POST /connect` and `POST /disconnect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    pub id: String,
    pub connection_state: AgentState,
}

/// Response to `GET /ping`
///
/// Serializes to `{}` when there is no work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<PingJob>,
}

/// A job offered to an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingJob {
    pub id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_accepts_empty_object() {
        let req: RegisterRequest = serde_json::from_str("{}").unwrap();
        assert!(req.name.is_none());
        assert!(req.meta_data.is_empty());
    }

    #[test]
    fn test_register_response_intervals() {
        let agent = Agent::mint("local");
        let resp = RegisterResponse::for_agent(&agent);
        assert_eq!(resp.ping_interval, 2);
        assert_eq!(resp.job_status_interval, 5);
        assert_eq!(resp.heartbeat_interval, 5);
        assert_eq!(resp.meta_data, vec!["queue=default"]);
        assert_eq!(resp.access_token, agent.access_token);
    }

    #[test]
    fn test_idle_ping_is_empty_object() {
        assert_eq!(
            serde_json::to_string(&PingResponse::default()).unwrap(),
            "{}"
        );
    }
}
