//! Model delta source.
//!
//! A `ModelClient` turns a chat transcript into a lazy stream of non-empty
//! text fragments. Nothing is sent over the network until the stream is
//! polled, and dropping the stream releases the underlying connection.

pub mod mock;
pub mod openrouter;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openrouter::OpenRouterClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Cannot reach model service at {0}")]
    Connection(String),

    #[error("Model service returned error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Model stream interrupted: {0}")]
    Stream(String),

    #[error("No API key configured for the model service")]
    MissingApiKey,

    #[error("Malformed model response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call overrides. `None` falls back to the client's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelCallConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Ordered text fragments, ending on exhaustion or on the first error.
pub type DeltaStream = BoxStream<'static, Result<String, LlmError>>;

pub trait ModelClient: Send + Sync {
    fn stream_chat(&self, messages: Vec<ChatMessage>, config: ModelCallConfig) -> DeltaStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::system("be brief")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "be brief"}));
        assert_eq!(serde_json::to_value(Role::Assistant).unwrap(), "assistant");
    }

    #[test]
    fn upstream_error_mentions_status() {
        let err = LlmError::Upstream {
            status: 429,
            body: "slow down".into(),
        };
        assert_eq!(
            err.to_string(),
            "Model service returned error (status 429): slow down"
        );
    }
}
