//! Main proxy server implementation

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handler::ChatHandler;
use crate::api::SimpleChatRequest;
use crate::config::AppConfig;
use crate::cors::CorsPolicy;
use crate::upstream::{ChatProvider, DeepSeekClient};

/// Shared state for the proxy
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    pub cors: Arc<CorsPolicy>,
    pub provider: Arc<dyn ChatProvider>,
}

impl ProxyState {
    pub fn new(config: AppConfig, provider: Arc<dyn ChatProvider>) -> Self {
        let cors = CorsPolicy::from_config(&config.cors);
        Self {
            config: Arc::new(config),
            cors: Arc::new(cors),
            provider,
        }
    }
}

/// Build the router: `/health` plus the chat handler on every other path
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/health", get(health_handler).fallback(chat_handler))
        .fallback(chat_handler)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Run the proxy server until Ctrl-C / SIGTERM
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let provider = DeepSeekClient::from_config(&config.upstream)?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    tracing::info!(
        environment = %config.environment,
        chat_post = config.routes.chat_post,
        simple_get = config.routes.simple_get,
        "Routes configured"
    );
    tracing::info!("Proxying to {}", config.upstream.base_url());

    let state = ProxyState::new(config, Arc::new(provider));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("deepseek-edge-proxy listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
///
/// Open event streams keep their connection alive until their relay closes
/// the body, so graceful shutdown waits for in-flight relays.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

/// Health check endpoint
///
/// A `?message=` query is the single-turn chat contract, which is served on
/// every path, so it is handed to the chat handler.
async fn health_handler(State(state): State<ProxyState>, req: axum::extract::Request) -> axum::response::Response {
    if state.config.routes.simple_get && SimpleChatRequest::is_requested(req.uri().query()) {
        return chat_handler(State(state), req).await;
    }

    let origin = req.headers().get(header::ORIGIN).and_then(|o| o.to_str().ok());
    let cors = state.cors.resolve(origin);
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, cors.header_value())],
        "OK",
    )
        .into_response()
}

/// Chat endpoint, method-dispatched
async fn chat_handler(State(state): State<ProxyState>, req: axum::extract::Request) -> axum::response::Response {
    let handler = ChatHandler::new(state);
    handler.handle(req).await
}
