//! deepseek-edge-proxy: browser-facing edge proxy for the DeepSeek chat API
//!
//! Features:
//! - Static allow-list CORS negotiation with preflight short-circuit
//! - Chat request validation (`POST` messages array, `GET ?message=`)
//! - Buffered and server-sent-event streamed completions
//! - A streaming relay that always terminates the event stream cleanly

pub mod api;
pub mod config;
pub mod cors;
pub mod error;
pub mod proxy;
pub mod stats;
pub mod upstream;

pub use config::AppConfig;
pub use error::ProxyError;
pub use proxy::{build_router, run_server, ProxyState};
pub use upstream::{ChatProvider, DeepSeekClient};
