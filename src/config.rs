//! Proxy configuration
//! Built once at startup, validated, then shared read-only by every request

use crate::error::ConfigError;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Branding shown on generated pages and headers
#[derive(Debug, Clone)]
pub struct Brand {
    pub name: String,
    pub home_url: String,
}

impl Default for Brand {
    fn default() -> Self {
        Self {
            name: "Pebly".to_string(),
            home_url: "https://pebly.vercel.app".to_string(),
        }
    }
}

/// Immutable proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    bind_address: IpAddr,
    http_port: u16,
    backend_origin: String,
    backend_authority: String,
    passthrough_origin: Option<String>,
    exempt_hosts: HashSet<String>,
    request_timeout: Duration,
    max_body_bytes: usize,
    brand: Brand,
    debug_endpoint: bool,
}

impl ProxyConfig {
    /// Create a configuration for `backend_origin` with every other setting at its default
    pub fn new(backend_origin: &str) -> Result<Self, ConfigError> {
        let (backend_origin, backend_authority) = parse_origin(backend_origin)?;

        Ok(Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: DEFAULT_HTTP_PORT,
            backend_origin,
            backend_authority,
            passthrough_origin: None,
            exempt_hosts: HashSet::new(),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            brand: Brand::default(),
            debug_endpoint: false,
        })
    }

    pub fn with_listen(mut self, bind_address: IpAddr, http_port: u16) -> Self {
        self.bind_address = bind_address;
        self.http_port = http_port;
        self
    }

    /// Hosts answered by the pass-through origin instead of being rewritten
    pub fn with_exempt_hosts<I, S>(mut self, hosts: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            let raw = host.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            if raw.contains(['/', '@', '?', '#']) || raw.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidExemptHost(raw.to_string()));
            }
            self.exempt_hosts.insert(normalize_host(raw));
        }
        Ok(self)
    }

    pub fn with_passthrough_origin(mut self, origin: &str) -> Result<Self, ConfigError> {
        let (origin, _) = parse_origin(origin)?;
        self.passthrough_origin = Some(origin);
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.request_timeout = timeout;
        Ok(self)
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_brand(mut self, brand: Brand) -> Self {
        self.brand = brand;
        self
    }

    pub fn with_debug_endpoint(mut self, enabled: bool) -> Self {
        self.debug_endpoint = enabled;
        self
    }

    pub fn bind_address(&self) -> IpAddr {
        self.bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Backend origin without a trailing slash, e.g. `https://backend.internal`
    pub fn backend_origin(&self) -> &str {
        &self.backend_origin
    }

    /// Value sent as the outbound `Host` header (host plus non-default port)
    pub fn backend_authority(&self) -> &str {
        &self.backend_authority
    }

    /// Origin that receives exempt-host traffic
    pub fn passthrough_origin(&self) -> &str {
        self.passthrough_origin
            .as_deref()
            .unwrap_or(&self.backend_origin)
    }

    pub fn exempt_hosts(&self) -> impl Iterator<Item = &str> {
        self.exempt_hosts.iter().map(String::as_str)
    }

    pub fn is_exempt(&self, host: &str) -> bool {
        self.exempt_hosts.contains(&normalize_host(host))
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn brand(&self) -> &Brand {
        &self.brand
    }

    pub fn debug_endpoint(&self) -> bool {
        self.debug_endpoint
    }
}

/// Lowercase a host and drop any port, keeping IPv6 brackets intact
pub fn normalize_host(raw: &str) -> String {
    let host = raw.trim();
    let host = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Validate an http(s) origin, returning its serialization and authority
fn parse_origin(raw: &str) -> Result<(String, String), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidOrigin {
        origin: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("origin must not carry a path, query or fragment"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("origin must not carry credentials"));
    }

    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    Ok((url.origin().ascii_serialization(), authority))
}
