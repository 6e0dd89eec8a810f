//! Agent HTTP Client
//!
//! A small, type-safe client for the agent side of the local control-plane
//! protocol: registration, polling, the job lifecycle, log chunks, pipeline
//! uploads and meta-data.
//!
//! # Example
//!
//! ```no_run
//! use bk_client::AgentClient;
//!
//! # async fn example() -> bk_client::Result<()> {
//! let client = AgentClient::new("http://127.0.0.1:4000");
//! let registration = client.register("my-agent").await?;
//! let client = client.with_token(registration.access_token);
//!
//! client.connect().await?;
//! if let Some(job) = client.ping().await?.job {
//!     let accepted = client.accept_job(job.id).await?;
//!     println!("Running {}", accepted.env["BUILDKITE_COMMAND"]);
//! }
//! # Ok(())
//! # }
//! ```

mod agents;
pub mod error;
mod jobs;
mod meta_data;
mod pipelines;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use jobs::gzip;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// HTTP client for the control-plane agent API
#[derive(Debug, Clone)]
pub struct AgentClient {
    /// Base URL of the control plane (e.g., "http://127.0.0.1:4000")
    base_url: String,
    /// Access token issued by `/register`
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl AgentClient {
    /// Create a new client without an access token
    ///
    /// # Arguments
    /// * `base_url` - The control-plane endpoint (e.g., "http://127.0.0.1:4000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Returns a client that authenticates with `token`
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL of the control plane
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Adds the `Authorization: Token <token>` header
    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ClientError::MissingToken)?;
        Ok(request.header(reqwest::header::AUTHORIZATION, format!("Token {}", token)))
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Error bodies of the form `{"message": ...}` are unwrapped into the
    /// returned error.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                error_message(&error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is ignored
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        self.handle_response::<serde_json::Value>(response)
            .await
            .map(|_| ())
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = AgentClient::new("http://127.0.0.1:4000");
        assert_eq!(client.base_url(), "http://127.0.0.1:4000");
        assert_eq!(client.token(), None);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = AgentClient::new("http://127.0.0.1:4000/");
        assert_eq!(client.base_url(), "http://127.0.0.1:4000");
        assert_eq!(client.url("/ping"), "http://127.0.0.1:4000/ping");
    }

    #[test]
    fn test_client_with_token() {
        let client = AgentClient::with_client("http://127.0.0.1:4000", Client::new())
            .with_token("abc");
        assert_eq!(client.token(), Some("abc"));
    }

    #[tokio::test]
    async fn test_authenticated_call_without_token_fails_early() {
        // Nothing listens here; the call must fail before any request is sent
        let client = AgentClient::new("http://127.0.0.1:9");
        assert!(matches!(client.ping().await, Err(ClientError::MissingToken)));
    }

    #[test]
    fn test_error_message_unwraps_json() {
        assert_eq!(error_message(r#"{"message":"boom"}"#), "boom");
        assert_eq!(error_message("plain"), "plain");
    }
}
