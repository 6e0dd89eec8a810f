//! Agent domain model
//!
//! Represents a build agent that registered with the local control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use uuid::Uuid;

/// A build agent known to the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Identifier issued on registration
    pub id: String,

    /// Bearer token issued on registration
    pub access_token: String,

    /// Name the agent registered with
    pub name: String,

    /// Current connection state
    pub state: AgentState,

    /// When this agent registered
    pub registered_at: DateTime<Utc>,

    /// Last time this agent sent a heartbeat
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl Agent {
    /// Mints a new agent with a fresh id and access token
    ///
    /// The token is the hex-encoded SHA-1 of the id's UUID bytes.
    pub fn mint(name: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id: id.to_string(),
            access_token: access_token_for(&id),
            name: name.into(),
            state: AgentState::Registered,
            registered_at: Utc::now(),
            last_heartbeat_at: None,
        }
    }
}

/// Derives the access token issued for an agent id
pub fn access_token_for(id: &Uuid) -> String {
    hex::encode(Sha1::digest(id.as_bytes()))
}

/// Connection state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Registered,
    Connected,
    Disconnected,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Registered => write!(f, "registered"),
            AgentState::Connected => write!(f, "connected"),
            AgentState::Disconnected => write!(f, "disconnected"),
        }
    }
}
