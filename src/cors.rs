//! Cross-origin negotiation
//!
//! Every request gets exactly one [`CorsDecision`]. Preflight (`OPTIONS`)
//! requests are answered here and never reach the chat handler; every other
//! response path must carry the decision's origin.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
};

use crate::config::CorsConfig;

const WILDCARD: &str = "*";
const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

/// The `Access-Control-Allow-Origin` value chosen for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsDecision {
    allowed_origin: String,
}

impl CorsDecision {
    pub fn wildcard() -> Self {
        Self {
            allowed_origin: WILDCARD.to_string(),
        }
    }

    pub fn allowed_origin(&self) -> &str {
        &self.allowed_origin
    }

    pub fn is_wildcard(&self) -> bool {
        self.allowed_origin == WILDCARD
    }

    /// Header value for the decision, `*` if the origin is not a valid header
    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.allowed_origin)
            .unwrap_or_else(|_| HeaderValue::from_static(WILDCARD))
    }
}

/// Outcome of negotiating an inbound request
#[derive(Debug)]
pub enum Negotiation {
    /// Preflight answered; return this response as-is
    Preflight(Response),
    /// Continue with the pipeline, attaching this decision to the response
    Proceed(CorsDecision),
}

/// Static allow-list policy built from configuration
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    allowed_headers: String,
    max_age_seconds: u64,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        Self {
            allowed_origins: config
                .allowed_origins
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            allowed_headers: config.allowed_headers.join(", "),
            max_age_seconds: config.max_age_seconds,
        }
    }

    /// Exact-match the declared origin against the allow-list
    pub fn resolve(&self, origin: Option<&str>) -> CorsDecision {
        match origin {
            Some(origin) if self.allowed_origins.iter().any(|o| o == origin) => CorsDecision {
                allowed_origin: origin.to_string(),
            },
            _ => CorsDecision::wildcard(),
        }
    }

    /// Decide the origin and short-circuit preflight requests
    pub fn negotiate(&self, method: &Method, headers: &HeaderMap) -> Negotiation {
        let origin = headers.get(header::ORIGIN).and_then(|o| o.to_str().ok());
        let decision = self.resolve(origin);

        tracing::trace!(
            origin = ?origin,
            allowed_origin = %decision.allowed_origin(),
            "CORS decision"
        );

        if method == Method::OPTIONS {
            return Negotiation::Preflight(self.preflight_response(&decision));
        }

        Negotiation::Proceed(decision)
    }

    /// `204` with the preflight headers and no body
    pub fn preflight_response(&self, decision: &CorsDecision) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, decision.header_value());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        if let Ok(value) = HeaderValue::from_str(&self.allowed_headers) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        } else {
            tracing::warn!(allowed_headers = %self.allowed_headers, "Invalid allowed_headers, omitting");
        }
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from(self.max_age_seconds),
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CorsPolicy {
        CorsPolicy::from_config(&CorsConfig::default())
    }

    fn headers_with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn test_resolve_allowed_origin() {
        let decision = policy().resolve(Some("https://yqcly1.shop"));
        assert_eq!(decision.allowed_origin(), "https://yqcly1.shop");
        assert!(!decision.is_wildcard());
    }

    #[test]
    fn test_resolve_unknown_origin_is_wildcard() {
        let policy = policy();
        assert!(policy.resolve(Some("https://evil.example")).is_wildcard());
        assert!(policy.resolve(None).is_wildcard());
        // exact match only
        assert!(policy.resolve(Some("https://yqcly1.shop/")).is_wildcard());
        assert!(policy.resolve(Some("HTTPS://YQCLY1.SHOP")).is_wildcard());
    }

    #[test]
    fn test_allow_list_comes_from_config() {
        let policy = CorsPolicy::from_config(&CorsConfig {
            allowed_origins: vec!["https://chat.example.com".to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            max_age_seconds: 60,
        });

        assert_eq!(
            policy.resolve(Some("https://chat.example.com")).allowed_origin(),
            "https://chat.example.com"
        );
        assert!(policy.resolve(Some("https://yqcly1.shop")).is_wildcard());
    }

    #[test]
    fn test_negotiate_preflight() {
        let negotiation = policy().negotiate(&Method::OPTIONS, &headers_with_origin("https://yqcly1.shop"));

        let Negotiation::Preflight(response) = negotiation else {
            panic!("expected preflight response");
        };
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://yqcly1.shop");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    }

    #[test]
    fn test_negotiate_preflight_without_authorization_header() {
        let policy = CorsPolicy::from_config(&CorsConfig {
            allowed_headers: vec!["Content-Type".to_string()],
            ..CorsConfig::default()
        });

        let Negotiation::Preflight(response) = policy.negotiate(&Method::OPTIONS, &HeaderMap::new()) else {
            panic!("expected preflight response");
        };
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn test_negotiate_proceeds_for_other_methods() {
        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            match policy().negotiate(&method, &headers_with_origin("http://localhost:5173")) {
                Negotiation::Proceed(decision) => {
                    assert_eq!(decision.allowed_origin(), "http://localhost:5173")
                }
                Negotiation::Preflight(_) => panic!("{} must not be treated as preflight", method),
            }
        }
    }
}
