//! DeepSeek chat-completion client

use async_trait::async_trait;
use axum::http::header;
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;

use super::{ChatParams, ChatProvider, ChunkStream, SseDecoder, UpstreamError};
use crate::api::{ApiErrorBody, ChatChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::config::UpstreamConfig;

const DONE_MARKER: &str = "[DONE]";

/// `ChatProvider` backed by the DeepSeek HTTP API
#[derive(Clone)]
pub struct DeepSeekClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for DeepSeekClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepSeekClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl DeepSeekClient {
    /// Build a client from configuration; the API key must already be resolved
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| UpstreamError::Setup("API key is not configured".to_string()))?;

        let http_client = build_http_client(config)?;

        Ok(Self::new(http_client, config.base_url(), api_key))
    }

    pub fn new(http_client: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// POST the completion request and reject non-success statuses
    async fn send(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, UpstreamError> {
        let url = self.completions_url();
        tracing::debug!(
            url = %url,
            model = %body.model,
            stream = body.stream,
            messages = body.messages.len(),
            "Sending chat completion request"
        );

        let mut request = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body);
        if body.stream {
            request = request.header(header::ACCEPT, "text/event-stream");
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to provider");
            UpstreamError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body_text = response.text().await.unwrap_or_default();
        let message = provider_error_message(status, &body_text);
        tracing::error!(
            status = %status,
            error_body = %body_text,
            "Provider returned error response"
        );
        Err(UpstreamError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatProvider for DeepSeekClient {
    async fn complete(&self, params: ChatParams) -> Result<String, UpstreamError> {
        let body = completion_request(params, false);
        let response = self.send(&body).await?;

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse provider completion");
            UpstreamError::Decode(e.to_string())
        })?;

        completion.first_content().ok_or(UpstreamError::EmptyResponse)
    }

    async fn stream(&self, params: ChatParams) -> Result<ChunkStream, UpstreamError> {
        let body = completion_request(params, true);
        let response = self.send(&body).await?;

        Ok(chunk_stream(response.bytes_stream().boxed()))
    }
}

fn completion_request(params: ChatParams, stream: bool) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: params.model,
        messages: params.messages,
        stream,
        temperature: params.temperature,
        max_tokens: params.max_tokens,
    }
}

/// Prefer the provider's `error.message`, falling back to status + raw body
fn provider_error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return parsed.error.message;
    }
    let body = body.trim();
    if body.is_empty() {
        format!("Provider returned {}", status)
    } else {
        format!("Provider returned {}: {}", status, body)
    }
}

/// Build an HTTP client with timeout and TLS configuration
fn build_http_client(config: &UpstreamConfig) -> Result<reqwest::Client, UpstreamError> {
    let mut client_builder = reqwest::Client::builder().pool_max_idle_per_host(10);

    if let Some(secs) = config.timeout_seconds {
        client_builder = client_builder.timeout(Duration::from_secs(secs));
    }

    if let Some(ref tls) = config.tls {
        if tls.accept_invalid_certs {
            client_builder = client_builder.danger_accept_invalid_certs(true);
            tracing::warn!("TLS: Accepting invalid certificates (use only for development/testing)");
        }

        if let Some(ref ca_path) = tls.ca_cert_path {
            let ca_cert = std::fs::read(ca_path)
                .map_err(|e| UpstreamError::Setup(format!("reading CA certificate {}: {}", ca_path, e)))?;
            let ca_cert = reqwest::Certificate::from_pem(&ca_cert)
                .map_err(|e| UpstreamError::Setup(format!("parsing CA certificate {}: {}", ca_path, e)))?;
            client_builder = client_builder.add_root_certificate(ca_cert);
            tracing::info!("TLS: Loaded custom CA certificate from {}", ca_path);
        }
    }

    client_builder
        .build()
        .map_err(|e| UpstreamError::Setup(e.to_string()))
}

/// Pull-side state turning raw body bytes into `ChatChunk`s
struct ChunkReader<E> {
    bytes: BoxStream<'static, Result<Bytes, E>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    body_finished: bool,
    done: bool,
}

impl<E> ChunkReader<E>
where
    E: Into<UpstreamError>,
{
    async fn next_chunk(&mut self) -> Option<Result<ChatChunk, UpstreamError>> {
        loop {
            if self.done {
                return None;
            }

            if let Some(data) = self.pending.pop_front() {
                if data.trim() == DONE_MARKER {
                    tracing::trace!("Provider stream completion detected ([DONE] marker)");
                    self.done = true;
                    return None;
                }
                return Some(match ChatChunk::from_json_str(&data) {
                    Ok(chunk) => Ok(chunk),
                    Err(e) => {
                        self.done = true;
                        tracing::warn!(error = %e, data = %data, "Malformed chunk from provider");
                        Err(UpstreamError::Decode(format!("invalid chunk JSON: {}", e)))
                    }
                });
            }

            if self.body_finished {
                self.done = true;
                return None;
            }

            match self.bytes.next().await {
                Some(Ok(bytes)) => {
                    tracing::trace!("Raw SSE bytes from provider ({} bytes)", bytes.len());
                    match self.decoder.feed(&bytes) {
                        Ok(events) => self.pending.extend(events),
                        Err(e) => {
                            self.done = true;
                            tracing::warn!(error = %e, "Provider stream event too large");
                            return Some(Err(e));
                        }
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.body_finished = true;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }
}

/// Adapt a provider SSE body into a lazy `ChunkStream`
///
/// The sequence ends at `[DONE]` or end of body, and after the first error.
pub(crate) fn chunk_stream<E>(bytes: BoxStream<'static, Result<Bytes, E>>) -> ChunkStream
where
    E: Into<UpstreamError> + Send + 'static,
{
    let reader = ChunkReader {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        body_finished: false,
        done: false,
    };

    futures::stream::unfold(reader, |mut reader| async move {
        reader.next_chunk().await.map(|item| (item, reader))
    })
    .boxed()
}
