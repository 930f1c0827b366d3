//! Chat-completion provider access

mod client;
mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::api::ChatChunk;

pub use client::DeepSeekClient;
pub use sse::SseDecoder;

/// Provider-driven sequence of streamed completion chunks
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, UpstreamError>>;

/// Validated parameters for one provider call
#[derive(Debug, Clone, PartialEq)]
pub struct ChatParams {
    pub messages: Vec<serde_json::Value>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A chat-completion provider
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Buffered completion; returns the first choice's message content
    async fn complete(&self, params: ChatParams) -> Result<String, UpstreamError>;

    /// Streamed completion
    ///
    /// Errors before the first chunk (connection, auth, bad status) are
    /// returned directly; later failures arrive as `Err` items in the stream.
    async fn stream(&self, params: ChatParams) -> Result<ChunkStream, UpstreamError>;
}

/// Provider call failure. Never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Transport(String),

    /// Non-success status; `message` is the provider's own error text
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Provider response contained no choices")]
    EmptyResponse,

    #[error("Failed to configure provider client: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}
