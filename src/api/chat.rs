//! Browser-facing request shapes and their validation

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ProxyError;

/// Error message for a POST body without a usable `messages` array
pub const INVALID_MESSAGES: &str = "Missing or invalid messages array";

/// Error message for a GET request without `?message=`
pub const MISSING_MESSAGE_PARAM: &str = "Missing message parameter";

/// A validated `POST` chat request
///
/// Messages are kept as raw JSON values: their content is the provider's
/// business, not ours.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<serde_json::Value>,
    pub model: String,
    pub stream: bool,
}

impl ChatRequest {
    /// Parse and validate a raw `POST` body
    ///
    /// `messages` must be a non-empty array. `model` falls back to
    /// `default_model` and `stream` defaults to `true`.
    pub fn from_body(body: &[u8], default_model: &str) -> Result<Self, ProxyError> {
        let json: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ProxyError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

        Self::from_json(json, default_model)
    }

    /// Validate an already-parsed `POST` body
    pub fn from_json(mut json: serde_json::Value, default_model: &str) -> Result<Self, ProxyError> {
        let messages = match json.get_mut("messages").map(serde_json::Value::take) {
            Some(serde_json::Value::Array(messages)) if !messages.is_empty() => messages,
            _ => return Err(ProxyError::InvalidRequest(INVALID_MESSAGES.to_string())),
        };

        let model = json
            .get("model")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(default_model)
            .to_string();

        let stream = json.get("stream").and_then(|s| s.as_bool()).unwrap_or(true);

        Ok(Self {
            messages,
            model,
            stream,
        })
    }
}

/// A validated `GET ?message=...` single-turn request
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleChatRequest {
    pub message: String,
}

impl SimpleChatRequest {
    /// Extract `message` from a raw query string
    pub fn from_query(query: Option<&str>) -> Result<Self, ProxyError> {
        let message = query.and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "message")
                .map(|(_, value)| value.into_owned())
        });

        match message {
            Some(message) if !message.trim().is_empty() => Ok(Self { message }),
            _ => Err(ProxyError::InvalidRequest(MISSING_MESSAGE_PARAM.to_string())),
        }
    }

    /// Whether a raw query string names a `message` parameter, blank or not
    pub fn is_requested(query: Option<&str>) -> bool {
        query.is_some_and(|q| {
            url::form_urlencoded::parse(q.as_bytes()).any(|(key, _)| key == "message")
        })
    }

    /// The one-message conversation sent upstream
    pub fn into_messages(self) -> Vec<serde_json::Value> {
        vec![serde_json::json!(ChatMessage::user(self.message))]
    }
}

/// A `{role, content}` conversation turn
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One provider-emitted increment of a streamed completion
///
/// Opaque: the provider's JSON text is validated once and relayed byte for
/// byte, so key order and number formatting survive.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChatChunk(Box<RawValue>);

impl ChatChunk {
    /// Validate one event payload as JSON
    ///
    /// Line breaks can only appear as insignificant whitespace in JSON text;
    /// they are folded to spaces so a chunk always fits on one `data:` line.
    pub fn from_json_str(data: &str) -> Result<Self, serde_json::Error> {
        let data = data.trim();
        let text = if data.contains(['\n', '\r']) {
            data.replace(['\n', '\r'], " ")
        } else {
            data.to_string()
        };
        RawValue::from_string(text).map(Self)
    }

    /// JSON text of the chunk, as received
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    pub fn to_json(&self) -> String {
        self.as_str().to_string()
    }

    /// Parsed view of the chunk
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(self.as_str())
    }
}

impl PartialEq for ChatChunk {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Buffered response body: `{"content": "..."}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentBody {
    pub content: String,
}

/// Error response body: `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
