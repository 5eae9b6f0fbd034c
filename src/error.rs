//! Error types for configuration, backend calls and request intake

use hyper::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Startup configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("invalid exempt host '{0}'")]
    InvalidExemptHost(String),

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}

/// Failure talking to the backend before a complete response arrived
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    /// Classify a reqwest failure; `timeout` is the budget the call ran under
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(timeout)
        } else if err.is_connect() {
            UpstreamError::Unreachable(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Failure turning an inbound connection's request into something the proxy can handle
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing Host header")]
    MissingHost,

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("failed to read request body: {0}")]
    Body(String),
}

impl ProxyError {
    /// Status served on the branded page for this failure
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingHost => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }
}
