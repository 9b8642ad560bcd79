//! Content generation seam
//!
//! This module contains the [`ContentGenerator`] trait that the policy oracle
//! and the model fallback router call into. Transport mechanics (HTTP,
//! streaming, credentials) live behind implementations of this trait.

pub mod retry;

use serde_json::Value;

use crate::types::Content;

pub use retry::{backoff_delay, RetryConfig};

/// Request parameters for a single content generation call
#[derive(Debug, Clone, Default)]
pub struct ContentRequest {
    /// Model identifier to route the request to
    pub model: String,
    /// Optional system instruction
    pub system_instruction: Option<String>,
    /// Conversation contents
    pub contents: Vec<Content>,
    /// JSON schema constraining the response (structured output)
    pub response_schema: Option<Value>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl ContentRequest {
    /// Create a request for a model with a single user prompt
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents: vec![Content::user(prompt)],
            ..Default::default()
        }
    }

    /// Constrain the response to a JSON schema
    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Set the system instruction
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Response from a content generation call
#[derive(Debug, Clone)]
pub struct ContentResponse {
    /// Model that actually served the request
    pub model: String,
    /// Candidate content (first candidate only)
    pub content: Option<Content>,
}

impl ContentResponse {
    /// Create a text response
    pub fn text_response(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: Some(Content::model(text)),
        }
    }

    /// Concatenated text of the response, empty if there is no candidate
    pub fn text(&self) -> String {
        self.content.as_ref().map(Content::text).unwrap_or_default()
    }
}

/// Error types for content generation
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Authentication or authorization failed (expired tokens, invalid credentials, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting or throttling
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Quota exhausted for the current billing period (not recoverable by waiting briefly)
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Network or connectivity issues
    #[error("Network error: {0}")]
    Network(String),

    /// Service unavailable or temporary issues
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The requested model or resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Model-specific errors (content filtered, context too long, etc.)
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration (bad model ID, missing parameters, etc.)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message from the server
        message: String,
    },

    /// The request was aborted by the caller
    #[error("Request cancelled")]
    Cancelled,

    /// Other provider-specific errors that don't fit above categories
    #[error("{0}")]
    Other(String),
}

/// Client that issues content generation requests
///
/// Used identically by the policy oracle and the model fallback router.
#[async_trait::async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Send a request to the model and get a response
    async fn generate_content(
        &self,
        request: ContentRequest,
    ) -> Result<ContentResponse, ProviderError>;
}

#[async_trait::async_trait]
impl ContentGenerator for std::sync::Arc<dyn ContentGenerator> {
    async fn generate_content(
        &self,
        request: ContentRequest,
    ) -> Result<ContentResponse, ProviderError> {
        (**self).generate_content(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = ContentRequest::new("gemini-pro", "hello")
            .with_system_instruction("be brief")
            .with_response_schema(serde_json::json!({"type": "object"}))
            .with_temperature(0.0);

        assert_eq!(req.model, "gemini-pro");
        assert_eq!(req.contents.len(), 1);
        assert_eq!(req.contents[0].text(), "hello");
        assert_eq!(req.system_instruction.as_deref(), Some("be brief"));
        assert!(req.response_schema.is_some());
        assert_eq!(req.temperature, Some(0.0));
    }

    #[test]
    fn test_response_text_empty_without_candidate() {
        let resp = ContentResponse {
            model: "m".into(),
            content: None,
        };
        assert_eq!(resp.text(), "");
        assert_eq!(ContentResponse::text_response("m", "ok").text(), "ok");
    }

    #[test]
    fn test_server_error_display() {
        let err = ProviderError::Server {
            status: 500,
            message: "internal".into(),
        };
        assert_eq!(err.to_string(), "Server error 500: internal");
    }
}
