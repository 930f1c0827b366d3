mod loader;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use loader::load_config;

/// Environment variable holding the provider API key
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Environment variable holding the deployment-environment tag
pub const ENVIRONMENT_ENV: &str = "ENVIRONMENT";

/// Main application configuration
///
/// Loaded once at startup and shared read-only (behind an `Arc`) with every
/// request handler. Nothing in here is mutated after `validate()`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    /// Deployment-environment tag (e.g. "production", "development")
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Proxy server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8787
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Chat-completion provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Provider base URL (e.g., "https://api.deepseek.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key for provider authentication. Usually supplied through
    /// `DEEPSEEK_API_KEY` rather than the config file.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Optional request timeout in seconds. No timeout when unset.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// TLS configuration options
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// TLS configuration for provider connections
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Accept invalid certificates (self-signed, expired)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Path to custom CA certificate (PEM format)
    pub ca_cert_path: Option<String>,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: None,
            tls: None,
        }
    }
}

impl UpstreamConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Returns true if the URL uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.base_url.to_lowercase().starts_with("https://")
    }

    /// API key with everything but the last four characters masked
    pub fn redacted_api_key(&self) -> String {
        match self.api_key.as_deref() {
            None => "(not set)".to_string(),
            Some(key) => {
                let len = key.chars().count();
                if len <= 4 {
                    return "****".to_string();
                }
                let tail: String = key.chars().skip(len - 4).collect();
                format!("****{}", tail)
            }
        }
    }
}

/// Sampling parameters sent with chat completions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// Model used when the request omits `model`
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature for the streaming path
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum output tokens for the streaming path
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Cross-origin policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Origins echoed back verbatim. Anything else gets `*`.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Request headers advertised on preflight
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,
    /// Preflight cache lifetime
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "https://yqcly1.shop".to_string(),
        "http://localhost:5173".to_string(),
        "http://localhost:8787".to_string(),
    ]
}

fn default_allowed_headers() -> Vec<String> {
    vec!["Content-Type".to_string(), "Authorization".to_string()]
}

fn default_max_age() -> u64 {
    86400
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            allowed_headers: default_allowed_headers(),
            max_age_seconds: default_max_age(),
        }
    }
}

/// Which request contracts the chat endpoint accepts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutesConfig {
    /// `POST` with a `messages` array, streamed or buffered
    #[serde(default = "default_true")]
    pub chat_post: bool,
    /// `GET ?message=...` single-turn buffered completion
    #[serde(default = "default_true")]
    pub simple_get: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            chat_post: true,
            simple_get: true,
        }
    }
}

fn default_environment() -> String {
    "production".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            chat: ChatConfig::default(),
            cors: CorsConfig::default(),
            routes: RoutesConfig::default(),
            environment: default_environment(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load configuration, falling back to defaults when no file is found
    ///
    /// An explicit path must exist. Without one, the usual locations are
    /// tried and built-in defaults are used if none of them exist.
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::from_file(path),
            None => {
                let default_paths = ["config.yaml", "config.yml", "./config/config.yaml"];
                for p in default_paths {
                    let path = Path::new(p);
                    if path.exists() {
                        return Self::from_file(path);
                    }
                }
                tracing::debug!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply `DEEPSEEK_API_KEY` / `ENVIRONMENT` from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.upstream.api_key = Some(key.trim().to_string());
        }
        if let Some(env) = lookup(ENVIRONMENT_ENV).filter(|e| !e.trim().is_empty()) {
            self.environment = env.trim().to_string();
        }
        self
    }

    /// Check the configuration is usable for serving traffic
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be non-zero".to_string()));
        }

        let parsed = url::Url::parse(self.upstream.base_url()).map_err(|e| {
            ConfigError::Validation(format!(
                "upstream.base_url '{}' is not a valid URL: {}",
                self.upstream.base_url, e
            ))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "upstream.base_url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        match self.upstream.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "no API key configured (set upstream.api_key or {})",
                    API_KEY_ENV
                )))
            }
        }

        if self.chat.default_model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "chat.default_model must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.upstream.api_key = Some("sk-test-key".to_string());
        config
    }

    #[test]
    fn test_defaults_match_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.upstream.base_url(), "https://api.deepseek.com");
        assert_eq!(config.chat.default_model, "deepseek-chat");
        assert_eq!(config.chat.max_tokens, 2048);
        assert!((config.chat.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.cors.max_age_seconds, 86400);
        assert!(config
            .cors
            .allowed_origins
            .contains(&"https://yqcly1.shop".to_string()));
        assert!(config.upstream.timeout_seconds.is_none());
        assert!(config.routes.chat_post);
        assert!(config.routes.simple_get);
    }

    #[test]
    fn test_upstream_base_url_trailing_slash() {
        let config = UpstreamConfig {
            base_url: "https://api.deepseek.com/".to_string(),
            ..UpstreamConfig::default()
        };
        assert_eq!(config.base_url(), "https://api.deepseek.com");
        assert!(config.is_tls());
    }

    #[test]
    fn test_upstream_is_tls() {
        let config = UpstreamConfig {
            base_url: "http://localhost:9000".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(!config.is_tls());
    }

    #[test]
    fn test_redacted_api_key() {
        let mut config = UpstreamConfig::default();
        assert_eq!(config.redacted_api_key(), "(not set)");

        config.api_key = Some("abc".to_string());
        assert_eq!(config.redacted_api_key(), "****");

        config.api_key = Some("sk-1234567890".to_string());
        assert_eq!(config.redacted_api_key(), "****7890");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(API_KEY_ENV, " sk-from-env "), (ENVIRONMENT_ENV, "development")]);

        let config = AppConfig::default()
            .with_overrides_from(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.upstream.api_key.as_deref(), Some("sk-from-env"));
        assert_eq!(config.environment, "development");
    }

    #[test]
    fn test_env_overrides_ignore_blank() {
        let mut config = AppConfig::default();
        config.upstream.api_key = Some("sk-file".to_string());

        let config = config.with_overrides_from(|_| Some("   ".to_string()));

        assert_eq!(config.upstream.api_key.as_deref(), Some("sk-file"));
        assert_eq!(config.environment, "production");
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = valid_config();
        config.upstream.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.upstream.base_url = "ftp://api.deepseek.com".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotFound("test.yaml".to_string());
        assert!(err.to_string().contains("test.yaml"));

        let err = ConfigError::Parse(serde_yaml::from_str::<AppConfig>("- a list").unwrap_err());
        assert!(err.to_string().contains("parse"));

        let err = ConfigError::Validation("invalid URL".to_string());
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn test_load_or_default_with_missing_path() {
        let result = AppConfig::load_or_default(Some(Path::new("/nonexistent/config.yaml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_cors_config_partial_yaml() {
        let config: CorsConfig =
            serde_yaml::from_str("allowed_origins: [\"https://example.com\"]").unwrap();
        assert_eq!(config.allowed_origins, vec!["https://example.com".to_string()]);
        assert_eq!(config.allowed_headers, default_allowed_headers());
        assert_eq!(config.max_age_seconds, 86400);
    }
}
