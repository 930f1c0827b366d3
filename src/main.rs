//! deepseek-edge-proxy: browser-facing edge proxy for the DeepSeek chat API
//!
//! Sits between browser chat clients and the DeepSeek API and provides:
//! - CORS negotiation against a configurable origin allow-list
//! - Buffered JSON and server-sent-event streamed chat completions
//! - API key isolation (the key never leaves the server)

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use deepseek_edge_proxy::{
    config::AppConfig,
    run_server,
    upstream::{ChatParams, ChatProvider, DeepSeekClient},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Parser)]
#[command(name = "deepseek-edge-proxy")]
#[command(version = "0.1.0")]
#[command(about = "Edge proxy for browser chat clients of the DeepSeek API")]
#[command(long_about = "
deepseek-edge-proxy relays browser chat requests to the DeepSeek chat API:
  - POST {messages, model?, stream?} -> event stream or {content}
  - GET ?message=...                  -> {content}
  - OPTIONS                           -> CORS preflight

The API key is read from DEEPSEEK_API_KEY (or upstream.api_key).

Example usage:
  deepseek-edge-proxy run --config config.yaml
  deepseek-edge-proxy check-config
")]
struct Cli {
    /// Path to config file (optional; defaults are used when absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override provider base URL (e.g., "https://api.deepseek.com")
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Validate configuration
    CheckConfig,

    /// Send a one-token completion to the provider
    TestUpstream,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter));
    match cli.log_format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    match cli.command {
        Commands::Run { port, base_url } => {
            run_proxy(cli.config, port, base_url).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config)?;
        }
        Commands::TestUpstream => {
            test_upstream(cli.config).await?;
        }
    }

    Ok(())
}

/// Load config from file (or defaults) and apply environment overrides
fn load_config(config_path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load_or_default(config_path.map(|p| p.as_path()))?;
    Ok(config.with_env_overrides())
}

/// Run the proxy server
async fn run_proxy(
    config_path: Option<PathBuf>,
    port_override: Option<u16>,
    base_url_override: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path.as_ref())?;

    // Apply CLI overrides
    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(url) = base_url_override {
        config.upstream.base_url = url;
    }

    config.validate()?;

    tracing::info!(
        config = ?config_path,
        environment = %config.environment,
        "Configuration loaded"
    );

    run_server(config).await
}

/// Validate configuration and print a summary
fn check_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path.as_ref())?;

    match config.validate() {
        Ok(()) => println!("✓ Configuration is valid\n"),
        Err(e) => println!("✗ Configuration error: {}\n", e),
    }

    println!("Server:");
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Environment: {}", config.environment);
    println!("\nUpstream:");
    println!("  URL: {}", config.upstream.base_url());
    println!("  TLS: {}", if config.upstream.is_tls() { "enabled" } else { "disabled" });
    println!("  API key: {}", config.upstream.redacted_api_key());
    match config.upstream.timeout_seconds {
        Some(secs) => println!("  Timeout: {}s", secs),
        None => println!("  Timeout: none"),
    }
    println!("\nChat:");
    println!("  Default model: {}", config.chat.default_model);
    println!("  Temperature: {}", config.chat.temperature);
    println!("  Max tokens: {}", config.chat.max_tokens);
    println!("\nCORS:");
    for origin in &config.cors.allowed_origins {
        println!("  Origin: {}", origin);
    }
    println!("  Headers: {}", config.cors.allowed_headers.join(", "));
    println!("  Max age: {}s", config.cors.max_age_seconds);
    println!("\nRoutes:");
    println!("  POST chat: {}", config.routes.chat_post);
    println!("  GET ?message=: {}", config.routes.simple_get);

    config.validate()?;
    Ok(())
}

/// Send a minimal buffered completion to the provider
async fn test_upstream(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path.as_ref())?;
    config.validate()?;

    println!("Testing provider: {}", config.upstream.base_url());

    let client: Arc<dyn ChatProvider> = Arc::new(DeepSeekClient::from_config(&config.upstream)?);
    let params = ChatParams {
        messages: vec![serde_json::json!({"role": "user", "content": "ping"})],
        model: config.chat.default_model.clone(),
        temperature: None,
        max_tokens: Some(1),
    };

    match client.complete(params).await {
        Ok(content) => {
            println!("✓ Provider is reachable");
            println!("  Model: {}", config.chat.default_model);
            println!("  Response: {:?}", content);
            Ok(())
        }
        Err(e) => {
            println!("✗ Provider call failed: {}", e);
            std::process::exit(1);
        }
    }
}
