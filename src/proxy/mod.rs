//! HTTP proxy server

mod handler;
pub mod relay;
mod response;
pub mod server;

pub use handler::ChatHandler;
pub use relay::{Frame, RelayOutcome, RelayState, RelayWriteError, StreamingRelay};
pub use response::{content_response, error_response, event_stream_response, json_response};
pub use server::{build_router, run_server, ProxyState};
