//! Linkproxy - Main entry point
//!
//! Every setting comes from the environment; the same names work as flags.

use anyhow::{Context, Result};
use clap::Parser;
use linkproxy::config::{DEFAULT_HTTP_PORT, DEFAULT_MAX_BODY_BYTES, DEFAULT_TIMEOUT_MS};
use linkproxy::{Brand, ProxyConfig, ProxyServer};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Linkproxy - host-aware redirect proxy for custom short-link domains
#[derive(Parser, Debug)]
#[command(name = "linkproxy")]
#[command(author = "Linkproxy Contributors")]
#[command(version)]
#[command(about = "Host-aware redirect proxy for custom short-link domains")]
struct Args {
    /// Shortener backend origin, e.g. https://backend.internal
    #[arg(long, env = "BACKEND_ORIGIN")]
    backend_origin: String,

    /// Hostnames passed straight through (comma separated)
    #[arg(long, env = "EXEMPT_HOSTS", value_delimiter = ',', default_value = "")]
    exempt_hosts: Vec<String>,

    /// Origin serving exempt hosts (defaults to the backend origin)
    #[arg(long, env = "PASSTHROUGH_ORIGIN")]
    passthrough_origin: Option<String>,

    /// Backend request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    request_timeout_ms: u64,

    /// HTTP port to listen on
    #[arg(long, env = "HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    bind_address: IpAddr,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Brand shown on error pages
    #[arg(long, env = "BRAND_NAME", default_value = "Pebly")]
    brand_name: String,

    /// Link target of the error page button
    #[arg(long, env = "BRAND_URL", default_value = "https://pebly.vercel.app")]
    brand_url: String,

    /// Serve the /_debug request echo
    #[arg(long, env = "ENABLE_DEBUG_ENDPOINT", default_value = "false")]
    enable_debug_endpoint: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<ProxyConfig> {
        let mut config = ProxyConfig::new(&self.backend_origin)?
            .with_listen(self.bind_address, self.http_port)
            .with_exempt_hosts(&self.exempt_hosts)?
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))?
            .with_max_body_bytes(self.max_body_bytes)
            .with_brand(Brand {
                name: self.brand_name,
                home_url: self.brand_url,
            })
            .with_debug_endpoint(self.enable_debug_endpoint);

        if let Some(origin) = self.passthrough_origin.as_deref() {
            config = config.with_passthrough_origin(origin)?;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = args.into_config().context("Invalid configuration")?;

    info!("Starting linkproxy v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend origin: {}", config.backend_origin());
    info!("Request timeout: {:?}", config.request_timeout());

    let mut exempt: Vec<&str> = config.exempt_hosts().collect();
    if !exempt.is_empty() {
        exempt.sort_unstable();
        info!("Exempt hosts: {} -> {}", exempt.join(", "), config.passthrough_origin());
    }

    if config.debug_endpoint() {
        info!("Debug endpoint enabled at /_debug");
    }

    let server = Arc::new(ProxyServer::new(config)?);
    server.run().await
}
