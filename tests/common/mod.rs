//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use futures::StreamExt;
use http_body_util::BodyExt;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use deepseek_edge_proxy::{
    api::ChatChunk,
    build_router,
    config::AppConfig,
    upstream::{ChatParams, ChatProvider, ChunkStream, UpstreamError},
    ProxyState,
};

/// In-memory provider returning pre-scripted results
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    pub completion: Arc<Mutex<Option<Result<String, UpstreamError>>>>,
    pub stream_items: Arc<Mutex<Option<Result<Vec<Result<ChatChunk, UpstreamError>>, UpstreamError>>>>,
    pub calls: Arc<Mutex<Vec<(ChatParams, bool)>>>,
}

impl ScriptedProvider {
    pub fn completing(content: &str) -> Self {
        let provider = Self::default();
        *provider.completion.lock().unwrap() = Some(Ok(content.to_string()));
        provider
    }

    pub fn failing(err: UpstreamError) -> Self {
        let provider = Self::default();
        *provider.completion.lock().unwrap() = Some(Err(err.clone()));
        *provider.stream_items.lock().unwrap() = Some(Err(err));
        provider
    }

    pub fn streaming(items: Vec<Result<ChatChunk, UpstreamError>>) -> Self {
        let provider = Self::default();
        *provider.stream_items.lock().unwrap() = Some(Ok(items));
        provider
    }

    pub fn calls(&self) -> Vec<(ChatParams, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, params: ChatParams) -> Result<String, UpstreamError> {
        self.calls.lock().unwrap().push((params, false));
        self.completion
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok("scripted".to_string()))
    }

    async fn stream(&self, params: ChatParams) -> Result<ChunkStream, UpstreamError> {
        self.calls.lock().unwrap().push((params, true));
        let items = self
            .stream_items
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))?;
        Ok(futures::stream::iter(items).boxed())
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.api_key = Some("sk-test".to_string());
    config
}

pub fn router_with(provider: ScriptedProvider) -> Router {
    router_with_config(test_config(), provider)
}

pub fn router_with_config(config: AppConfig, provider: ScriptedProvider) -> Router {
    build_router(ProxyState::new(config, Arc::new(provider)))
}

pub async fn send(router: Router, request: Request<Body>) -> Response<Body> {
    router.oneshot(request).await.unwrap()
}

pub fn post_json(body: &str, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json");
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn request(method: &str, uri: &str, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn allow_origin(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("access-control-allow-origin")
        .map(|v| v.to_str().unwrap().to_string())
}

/// Split an event-stream body into its `data:` payloads
pub fn frames(body: &[u8]) -> Vec<String> {
    let text = std::str::from_utf8(body).unwrap();
    assert!(text.is_empty() || text.ends_with("\n\n"), "unterminated frame in {:?}", text);
    text.split("\n\n")
        .filter(|f| !f.is_empty())
        .map(|f| {
            f.strip_prefix("data: ")
                .unwrap_or_else(|| panic!("frame without data prefix: {:?}", f))
                .to_string()
        })
        .collect()
}
