//! Linkproxy - host-aware redirect proxy for custom short-link domains
//!
//! Customers point their own hostnames at this proxy; it forwards every
//! request to a single shortener backend and:
//! - Passes the customer hostname in `X-Forwarded-Host` / `X-Original-Host`
//! - Re-emits backend redirects with status and `Location` untouched
//! - Adds permissive CORS to successful content responses
//! - Replaces every backend or transport failure with a branded error page
//! - Passes configured primary hostnames straight through

pub mod config;
pub mod error;
pub mod error_page;
pub mod headers;
pub mod outcome;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use config::{Brand, ProxyConfig};
pub use error::{ConfigError, ProxyError, UpstreamError};
pub use outcome::{classify, Outcome};
pub use proxy::RedirectProxy;
pub use request::{BackendRequest, InboundRequest};
pub use response::ProxyResponse;
pub use server::ProxyServer;
pub use upstream::{BackendResponse, HttpUpstream, Upstream};
