//! Request-level error taxonomy

use axum::http::StatusCode;

use crate::upstream::UpstreamError;

/// Failure of a request before any response body has been committed
///
/// Rendered to `{"error": "..."}` by [`crate::proxy::error_response`], which
/// also attaches the request's CORS origin. There is intentionally no
/// `IntoResponse` impl: an error response without the origin header is
/// unreadable by the browser.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Client-supplied shape is wrong
    #[error("{0}")]
    InvalidRequest(String),

    /// Method not served by the chat endpoint
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Provider call failed before streaming began
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Upstream(_) | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) => "InvalidRequest",
            ProxyError::MethodNotAllowed => "MethodNotAllowed",
            ProxyError::Upstream(_) => "UpstreamError",
            ProxyError::Internal(_) => "Internal",
        }
    }

    /// Text placed in the `error` field of the JSON body
    pub fn client_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            "Internal server error".to_string()
        } else {
            message
        }
    }
}
