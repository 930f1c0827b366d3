//! Method-dispatched chat handler

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
};
use http_body_util::LengthLimitError;
use std::time::Instant;
use tracing::Instrument;

use super::relay::{StreamingRelay, DEFAULT_RELAY_CAPACITY};
use super::response::{content_response, error_response, event_stream_response};
use super::server::ProxyState;
use crate::api::{ChatRequest, SimpleChatRequest};
use crate::cors::{CorsDecision, Negotiation};
use crate::error::ProxyError;
use crate::stats::{format_request_log, format_simple_request_log};
use crate::upstream::ChatParams;

/// Largest request body accepted
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Chat request handler
pub struct ChatHandler {
    state: ProxyState,
}

impl ChatHandler {
    pub fn new(state: ProxyState) -> Self {
        Self { state }
    }

    /// Handle an incoming request
    ///
    /// CORS runs first; preflight never reaches dispatch. Every other
    /// outcome, success or error, carries the negotiated origin.
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "chat_request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        async move {
            let cors = match self.state.cors.negotiate(req.method(), req.headers()) {
                Negotiation::Preflight(response) => {
                    tracing::debug!("Answered CORS preflight");
                    return response;
                }
                Negotiation::Proceed(decision) => decision,
            };

            match self.dispatch(req, &cors).await {
                Ok(response) => response,
                Err(err) => {
                    match &err {
                        ProxyError::Upstream(_) | ProxyError::Internal(_) => {
                            tracing::error!(kind = err.kind(), error = %err, "Request failed")
                        }
                        _ => tracing::debug!(kind = err.kind(), error = %err, "Request rejected"),
                    }
                    error_response(&err, &cors)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, req: Request<Body>, cors: &CorsDecision) -> Result<Response, ProxyError> {
        let routes = &self.state.config.routes;
        let method = req.method().clone();

        if method == Method::POST && routes.chat_post {
            self.handle_chat(req, cors).await
        } else if method == Method::GET && routes.simple_get {
            self.handle_simple(req, cors).await
        } else {
            Err(ProxyError::MethodNotAllowed)
        }
    }

    /// `POST {messages, model?, stream?}`
    async fn handle_chat(&self, req: Request<Body>, cors: &CorsDecision) -> Result<Response, ProxyError> {
        let start = Instant::now();
        let body = to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(body_read_error)?;

        let chat = ChatRequest::from_body(&body, &self.state.config.chat.default_model)?;
        tracing::info!("{}", format_request_log(&chat));

        let chat_config = &self.state.config.chat;
        let params = ChatParams {
            messages: chat.messages,
            model: chat.model,
            temperature: Some(chat_config.temperature),
            max_tokens: Some(chat_config.max_tokens),
        };

        if chat.stream {
            let upstream = self.state.provider.stream(params).await?;
            // Detached: the relay task owns the provider stream from here on
            let (body, _relay) = StreamingRelay::spawn(upstream, DEFAULT_RELAY_CAPACITY);
            tracing::debug!(
                setup_ms = start.elapsed().as_millis() as u64,
                "Streaming response started"
            );

            return Ok(event_stream_response(body.into_body(), cors));
        }

        let content = self.state.provider.complete(params).await?;
        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            content_len = content.len(),
            "Buffered completion finished"
        );
        Ok(content_response(content, cors))
    }

    /// `GET ?message=...`
    async fn handle_simple(&self, req: Request<Body>, cors: &CorsDecision) -> Result<Response, ProxyError> {
        let simple = SimpleChatRequest::from_query(req.uri().query())?;
        let model = self.state.config.chat.default_model.clone();
        tracing::info!("{}", format_simple_request_log(&model, &simple.message));

        let params = ChatParams {
            messages: simple.into_messages(),
            model,
            temperature: None,
            max_tokens: None,
        };

        let content = self.state.provider.complete(params).await?;
        Ok(content_response(content, cors))
    }
}

/// Oversized bodies are the client's fault; any other read failure is ours
fn body_read_error(err: axum::Error) -> ProxyError {
    let inner = err.into_inner();
    let too_large = std::iter::successors(
        Some(&*inner as &(dyn std::error::Error + 'static)),
        |e| e.source(),
    )
    .any(|e| e.is::<LengthLimitError>());

    if too_large {
        ProxyError::InvalidRequest(format!("Request body exceeds {} bytes", MAX_BODY_BYTES))
    } else {
        ProxyError::Internal(format!("Failed to read request body: {}", inner))
    }
}
