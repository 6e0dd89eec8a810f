//! Agent Pool
//!
//! Registry of the agents that registered with this control plane, keyed by
//! issued id. Agents are never removed; disconnecting only changes state.

use bk_core::domain::agent::{Agent, AgentState};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use super::lock;

/// Agent pool error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentPoolError {
    #[error("agent {0} not found")]
    NotFound(String),

    #[error("access token not recognised")]
    UnknownToken,
}

pub type Result<T> = std::result::Result<T, AgentPoolError>;

/// Registry of connected agents
#[derive(Debug, Default)]
pub struct AgentPool {
    agents: Mutex<HashMap<String, Agent>>,
}

impl AgentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an agent, replacing any agent with the same id
    pub fn register(&self, agent: Agent) {
        let mut agents = lock(&self.agents);
        if agents.contains_key(&agent.id) {
            tracing::warn!("Agent id {} registered twice", agent.id);
        }
        agents.insert(agent.id.clone(), agent);
    }

    pub fn get(&self, id: &str) -> Result<Agent> {
        lock(&self.agents)
            .get(id)
            .cloned()
            .ok_or_else(|| AgentPoolError::NotFound(id.to_string()))
    }

    pub fn connect(&self, id: &str) -> Result<Agent> {
        self.set_state(id, AgentState::Connected)
    }

    pub fn disconnect(&self, id: &str) -> Result<Agent> {
        self.set_state(id, AgentState::Disconnected)
    }

    /// Records a heartbeat from an agent
    pub fn heartbeat(&self, id: &str) -> Result<()> {
        let mut agents = lock(&self.agents);
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| AgentPoolError::NotFound(id.to_string()))?;
        agent.last_heartbeat_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Resolves an access token to the agent id it was issued to
    pub fn authenticate(&self, token: &str) -> Result<String> {
        lock(&self.agents)
            .values()
            .find(|agent| agent.access_token == token)
            .map(|agent| agent.id.clone())
            .ok_or(AgentPoolError::UnknownToken)
    }

    pub fn len(&self) -> usize {
        lock(&self.agents).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_state(&self, id: &str, state: AgentState) -> Result<Agent> {
        let mut agents = lock(&self.agents);
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| AgentPoolError::NotFound(id.to_string()))?;
        agent.state = state;
        tracing::info!("Agent {} ({}) is now {}", agent.name, agent.id, state);
        Ok(agent.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let pool = AgentPool::new();
        let agent = Agent::mint("local");
        pool.register(agent.clone());

        assert_eq!(pool.get(&agent.id).unwrap(), agent);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_get_unknown_agent() {
        let pool = AgentPool::new();
        assert_eq!(
            pool.get("missing"),
            Err(AgentPoolError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_connect_and_disconnect_transition_state() {
        let pool = AgentPool::new();
        let agent = Agent::mint("local");
        pool.register(agent.clone());

        assert_eq!(pool.connect(&agent.id).unwrap().state, AgentState::Connected);
        assert_eq!(
            pool.disconnect(&agent.id).unwrap().state,
            AgentState::Disconnected
        );
        assert_eq!(pool.get(&agent.id).unwrap().state, AgentState::Disconnected);
    }

    #[test]
    fn test_connect_and_disconnect_unknown_agent_fail() {
        let pool = AgentPool::new();
        assert!(matches!(
            pool.connect("nope"),
            Err(AgentPoolError::NotFound(_))
        ));
        assert!(matches!(
            pool.disconnect("nope"),
            Err(AgentPoolError::NotFound(_))
        ));
    }

    #[test]
    fn test_authenticate_resolves_only_minted_tokens() {
        let pool = AgentPool::new();
        let a = Agent::mint("a");
        let b = Agent::mint("b");
        pool.register(a.clone());
        pool.register(b.clone());

        assert_eq!(pool.authenticate(&a.access_token).unwrap(), a.id);
        assert_eq!(pool.authenticate(&b.access_token).unwrap(), b.id);
        assert_eq!(
            pool.authenticate("0000"),
            Err(AgentPoolError::UnknownToken)
        );
    }

    #[test]
    fn test_heartbeat_records_time() {
        let pool = AgentPool::new();
        let agent = Agent::mint("a");
        pool.register(agent.clone());

        pool.heartbeat(&agent.id).unwrap();
        assert!(pool.get(&agent.id).unwrap().last_heartbeat_at.is_some());
        assert!(pool.heartbeat("nope").is_err());
    }
}
