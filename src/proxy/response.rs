//! Response assembly
//!
//! All constructors take the request's [`CorsDecision`], so no response path
//! can leave out `Access-Control-Allow-Origin`.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::api::{ContentBody, ErrorBody};
use crate::cors::CorsDecision;
use crate::error::ProxyError;

const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// JSON body with the CORS origin attached
pub fn json_response<T: serde::Serialize>(status: StatusCode, body: T, cors: &CorsDecision) -> Response {
    (
        status,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, cors.header_value())],
        Json(body),
    )
        .into_response()
}

/// `200 {"content": "..."}` for buffered completions
pub fn content_response(content: String, cors: &CorsDecision) -> Response {
    json_response(StatusCode::OK, ContentBody { content }, cors)
}

/// `{"error": "..."}` with the status for the error kind
pub fn error_response(err: &ProxyError, cors: &CorsDecision) -> Response {
    json_response(
        err.status(),
        ErrorBody {
            error: err.client_message(),
        },
        cors,
    )
}

/// Event-stream response around a relay body
pub fn event_stream_response(body: Body, cors: &CorsDecision) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, cors.header_value());
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    response
}
