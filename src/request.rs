//! Inbound request model and the derivation of the backend request from it

use crate::config::ProxyConfig;
use crate::headers::{
    copy_end_to_end, forwardable_request_headers, X_FORWARDED_FOR, X_FORWARDED_HOST,
    X_FORWARDED_PROTO, X_ORIGINAL_HOST,
};
use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderValue, HOST, USER_AGENT};
use hyper::Method;
use std::net::IpAddr;
use tracing::warn;

/// A request as received on a customer-facing hostname
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Normalized hostname: lowercase, no port
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<IpAddr>,
}

impl InboundRequest {
    pub fn new(method: Method, host: impl Into<String>, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path_and_query.to_string(), None),
        };

        Self {
            method,
            host: host.into(),
            path: if path.is_empty() { "/".to_string() } else { path },
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_addr: None,
        }
    }

    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// GET and HEAD never carry a body to the backend
    pub fn carries_body(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }
}

/// A fully derived request for the backend or pass-through origin
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Rewrite an inbound request for the shortener backend
///
/// The URL is the backend origin followed by the untouched path and query.
/// `Host` names the backend; the customer hostname travels in
/// `X-Forwarded-Host` and `X-Original-Host`.
pub fn build_backend_request(req: &InboundRequest, config: &ProxyConfig) -> BackendRequest {
    let mut headers = forwardable_request_headers(&req.headers);

    match HeaderValue::from_str(&req.host) {
        Ok(host) => {
            headers.insert(X_FORWARDED_HOST, host.clone());
            headers.insert(X_ORIGINAL_HOST, host);
        }
        Err(e) => warn!("Host '{}' is not a valid header value: {}", req.host, e),
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));

    if let Ok(authority) = HeaderValue::from_str(config.backend_authority()) {
        headers.insert(HOST, authority);
    }

    if let Some(client) = req.client_addr {
        let forwarded_for = match req.headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, client),
            None => client.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(USER_AGENT) {
        let agent = format!("{}-Proxy/{}", config.brand().name, env!("CARGO_PKG_VERSION"));
        if let Ok(value) = HeaderValue::from_str(&agent) {
            headers.insert(USER_AGENT, value);
        }
    }

    BackendRequest {
        method: req.method.clone(),
        url: format!("{}{}", config.backend_origin(), req.path_and_query()),
        headers,
        body: forwarded_body(req),
    }
}

/// Forward an exempt-host request as received, original `Host` included
pub fn build_passthrough_request(req: &InboundRequest, origin: &str) -> BackendRequest {
    BackendRequest {
        method: req.method.clone(),
        url: format!("{}{}", origin, req.path_and_query()),
        headers: copy_end_to_end(&req.headers),
        body: forwarded_body(req),
    }
}

fn forwarded_body(req: &InboundRequest) -> Option<Bytes> {
    if req.carries_body() {
        Some(req.body.clone())
    } else {
        None
    }
}
