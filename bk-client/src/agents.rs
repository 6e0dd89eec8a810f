//! Agent registration and polling endpoints

use crate::AgentClient;
use crate::error::Result;
use bk_core::dto::agent::{ConnectionResponse, PingResponse, RegisterRequest, RegisterResponse};

impl AgentClient {
    // =============================================================================
    // Registration & Connection
    // =============================================================================

    /// Register a new agent
    ///
    /// The returned access token authenticates every other call; pass it to
    /// [`AgentClient::with_token`].
    pub async fn register(&self, name: &str) -> Result<RegisterResponse> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(&RegisterRequest {
                name: Some(name.to_string()),
                hostname: None,
                meta_data: vec!["queue=default".to_string()],
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Mark the agent connected
    pub async fn connect(&self) -> Result<ConnectionResponse> {
        let request = self.authorize(self.client.post(self.url("/connect")))?;
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Mark the agent disconnected
    pub async fn disconnect(&self) -> Result<ConnectionResponse> {
        let request = self.authorize(self.client.post(self.url("/disconnect")))?;
        let response = request.send().await?;

        self.handle_response(response).await
    }

    pub async fn heartbeat(&self) -> Result<()> {
        let request = self.authorize(self.client.post(self.url("/heartbeat")))?;
        let response = request.json(&serde_json::json!({})).send().await?;

        self.handle_empty_response(response).await
    }

    /// Poll for work
    ///
    /// # Returns
    /// A response whose `job` is set when the control plane offers a job
    pub async fn ping(&self) -> Result<PingResponse> {
        let request = self.authorize(self.client.get(self.url("/ping")))?;
        let response = request.send().await?;

        self.handle_response(response).await
    }
}
