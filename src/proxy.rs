//! Redirect proxy core
//!
//! `RedirectProxy::handle` is the whole request pipeline: preflight, built-in
//! endpoints, exempt-host pass-through, then forwarding to the backend and
//! classifying what comes back. It never sees the server library's types,
//! only `InboundRequest` and `ProxyResponse`.

use crate::config::ProxyConfig;
use crate::outcome::{classify, Outcome};
use crate::request::{build_backend_request, build_passthrough_request, InboundRequest};
use crate::response::ProxyResponse;
use crate::upstream::Upstream;
use chrono::{SecondsFormat, Utc};
use hyper::{Method, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const HEALTH_PATHS: [&str; 2] = ["/health", "/_health"];
const DEBUG_PATH: &str = "/_debug";

#[derive(Serialize)]
struct HealthReport<'a> {
    status: &'static str,
    proxy: &'static str,
    timestamp: String,
    hostname: &'a str,
}

#[derive(Serialize)]
struct DebugReport<'a> {
    timestamp: String,
    hostname: &'a str,
    path: &'a str,
    query: Option<&'a str>,
    method: &'a str,
    headers: BTreeMap<&'a str, Vec<String>>,
    backend_origin: &'a str,
}

pub struct RedirectProxy<U: Upstream> {
    config: Arc<ProxyConfig>,
    upstream: U,
}

impl<U: Upstream> RedirectProxy<U> {
    pub fn new(config: Arc<ProxyConfig>, upstream: U) -> Self {
        Self { config, upstream }
    }

    /// Produce the client response for one request
    pub async fn handle(&self, request: InboundRequest) -> ProxyResponse {
        let brand = self.config.brand();

        if request.method == Method::OPTIONS {
            debug!("Preflight {}{}", request.host, request.path);
            return ProxyResponse::preflight(brand);
        }

        if let Some(response) = self.builtin(&request) {
            return response;
        }

        if self.config.is_exempt(&request.host) {
            return self.pass_through(request).await;
        }

        self.forward(request).await
    }

    /// Health and debug endpoints, answered without a backend call
    fn builtin(&self, request: &InboundRequest) -> Option<ProxyResponse> {
        if request.method != Method::GET && request.method != Method::HEAD {
            return None;
        }

        let brand = self.config.brand();
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        if HEALTH_PATHS.contains(&request.path.as_str()) {
            let report = HealthReport {
                status: "healthy",
                proxy: env!("CARGO_PKG_NAME"),
                timestamp: now,
                hostname: &request.host,
            };
            return Some(ProxyResponse::json(&report, brand, &request.host, &request.path));
        }

        if self.config.debug_endpoint() && request.path == DEBUG_PATH {
            let mut headers: BTreeMap<&str, Vec<String>> = BTreeMap::new();
            for (name, value) in request.headers.iter() {
                headers
                    .entry(name.as_str())
                    .or_default()
                    .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
            }
            let report = DebugReport {
                timestamp: now,
                hostname: &request.host,
                path: &request.path,
                query: request.query.as_deref(),
                method: request.method.as_str(),
                headers,
                backend_origin: self.config.backend_origin(),
            };
            return Some(ProxyResponse::json(&report, brand, &request.host, &request.path));
        }

        None
    }

    /// Exempt hosts reach their origin unmodified and get its answer verbatim
    async fn pass_through(&self, request: InboundRequest) -> ProxyResponse {
        let origin = self.config.passthrough_origin();
        debug!("Pass-through {}{} -> {}", request.host, request.path_and_query(), origin);

        match self
            .upstream
            .send(build_passthrough_request(&request, origin))
            .await
        {
            Ok(response) => ProxyResponse::passthrough(response),
            Err(e) => {
                error!("Pass-through for {} failed: {}", request.host, e);
                ProxyResponse::error_page(
                    self.config.brand(),
                    &request.host,
                    &request.path,
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    }

    async fn forward(&self, request: InboundRequest) -> ProxyResponse {
        let backend_request = build_backend_request(&request, &self.config);
        debug!(
            "Proxy {}{} -> {}",
            request.host,
            request.path_and_query(),
            backend_request.url
        );

        let result = self.upstream.send(backend_request).await;
        if let Err(e) = &result {
            error!("Backend call for {}{} failed: {}", request.host, request.path, e);
        }

        self.respond(&request, classify(result))
    }

    fn respond(&self, request: &InboundRequest, outcome: Outcome) -> ProxyResponse {
        let brand = self.config.brand();

        match outcome {
            Outcome::Redirect {
                status,
                location,
                cache_control,
            } => {
                info!(
                    "Redirect {}{}: {} -> {}",
                    request.host,
                    request.path,
                    status.as_u16(),
                    String::from_utf8_lossy(location.as_bytes())
                );
                ProxyResponse::redirect(status, location, cache_control, brand)
            }
            Outcome::Content(response) => {
                debug!("Content {}{}: {}", request.host, request.path, response.status);
                ProxyResponse::content(response, brand)
            }
            error_outcome => {
                let status = error_outcome.status();
                if let Outcome::NotFound | Outcome::UpstreamStatus(_) = error_outcome {
                    warn!("Backend returned {} for {}{}", status, request.host, request.path);
                }
                ProxyResponse::error_page(brand, &request.host, &request.path, status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::headers::{X_FORWARDED_HOST, X_ORIGINAL_HOST};
    use crate::request::BackendRequest;
    use crate::upstream::BackendResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use hyper::header::{
        HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, HOST,
        LOCATION,
    };
    use std::sync::Mutex;
    use std::time::Duration;

    /// Upstream that records every call and replays one canned result
    struct FakeUpstream {
        calls: Mutex<Vec<BackendRequest>>,
        reply: fn() -> Result<BackendResponse, UpstreamError>,
    }

    impl FakeUpstream {
        fn new(reply: fn() -> Result<BackendResponse, UpstreamError>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply,
            }
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn send(&self, request: BackendRequest) -> Result<BackendResponse, UpstreamError> {
            self.calls.lock().unwrap().push(request);
            (self.reply)()
        }
    }

    fn found() -> Result<BackendResponse, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://real-target.com/page"));
        Ok(BackendResponse {
            status: StatusCode::FOUND,
            headers,
            body: Bytes::new(),
        })
    }

    fn ok_json() -> Result<BackendResponse, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(BackendResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(br#"{"shortCode":"AbC123"}"#),
        })
    }

    fn not_found() -> Result<BackendResponse, UpstreamError> {
        Ok(BackendResponse {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"java.lang.IllegalStateException: stack trace"),
        })
    }

    fn timed_out() -> Result<BackendResponse, UpstreamError> {
        Err(UpstreamError::Timeout(Duration::from_secs(10)))
    }

    fn found_cached() -> Result<BackendResponse, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://real-target.com/page"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("private, max-age=90"));
        Ok(BackendResponse {
            status: StatusCode::MOVED_PERMANENTLY,
            headers,
            body: Bytes::new(),
        })
    }

    fn refused() -> Result<BackendResponse, UpstreamError> {
        Err(UpstreamError::Unreachable("connection refused".to_string()))
    }

    fn proxy(reply: fn() -> Result<BackendResponse, UpstreamError>) -> RedirectProxy<FakeUpstream> {
        let config = ProxyConfig::new("https://backend.internal")
            .unwrap()
            .with_exempt_hosts(["tinyslash.com"])
            .unwrap();
        RedirectProxy::new(Arc::new(config), FakeUpstream::new(reply))
    }

    fn get(host: &str, path_and_query: &str) -> InboundRequest {
        let mut req = InboundRequest::new(Method::GET, host, path_and_query);
        req.headers.insert(HOST, HeaderValue::from_str(host).unwrap());
        req
    }

    fn body_text(response: &ProxyResponse) -> String {
        String::from_utf8_lossy(&response.body).into_owned()
    }

    #[tokio::test]
    async fn test_redirect_round_trip() {
        let proxy = proxy(found);
        let response = proxy.handle(get("go.example.com", "/AbC123")).await;

        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(
            response.headers.get(LOCATION).unwrap(),
            "https://real-target.com/page"
        );

        let calls = proxy.upstream.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://backend.internal/AbC123");
        assert_eq!(calls[0].headers.get(X_FORWARDED_HOST).unwrap(), "go.example.com");
        assert_eq!(calls[0].headers.get(X_ORIGINAL_HOST).unwrap(), "go.example.com");
    }

    #[tokio::test]
    async fn test_options_never_calls_backend() {
        let proxy = proxy(found);
        let req = InboundRequest::new(Method::OPTIONS, "go.example.com", "/AbC123");
        let response = proxy.handle(req).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert!(proxy.upstream.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_content_gets_cors() {
        let proxy = proxy(ok_json);
        let response = proxy.handle(get("go.example.com", "/api/v1/stats")).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(body_text(&response), r#"{"shortCode":"AbC123"}"#);
        assert_eq!(response.headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }

    #[tokio::test]
    async fn test_not_found_hides_backend_body() {
        let proxy = proxy(not_found);
        let response = proxy.handle(get("go.example.com", "/missing")).await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = body_text(&response);
        assert!(body.contains("Link Not Found"));
        assert!(body.contains("go.example.com"));
        assert!(!body.contains("IllegalStateException"));
    }

    #[tokio::test]
    async fn test_timeout_is_500_page() {
        let proxy = proxy(timed_out);
        let response = proxy.handle(get("go.example.com", "/AbC123")).await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(&response).contains("Error"));
    }

    #[tokio::test]
    async fn test_exempt_host_passes_through() {
        let proxy = proxy(ok_json);
        let response = proxy.handle(get("TinySlash.com", "/pricing?plan=pro")).await;

        assert_eq!(response.status, StatusCode::OK);
        assert!(!response.headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));

        let calls = proxy.upstream.calls.lock().unwrap();
        assert_eq!(calls[0].url, "https://backend.internal/pricing?plan=pro");
        assert_eq!(calls[0].headers.get(HOST).unwrap(), "TinySlash.com");
        assert!(!calls[0].headers.contains_key(X_FORWARDED_HOST));
    }

    #[tokio::test]
    async fn test_health_is_local() {
        let proxy = proxy(timed_out);
        let response = proxy.handle(get("go.example.com", "/health")).await;

        assert_eq!(response.status, StatusCode::OK);
        let report: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(report["status"], "healthy");
        assert_eq!(report["hostname"], "go.example.com");
        assert!(proxy.upstream.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_debug_endpoint_disabled_by_default() {
        let proxy = proxy(not_found);
        let response = proxy.handle(get("go.example.com", "/_debug")).await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(proxy.upstream.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_debug_endpoint_echoes_request() {
        let config = ProxyConfig::new("https://backend.internal")
            .unwrap()
            .with_debug_endpoint(true);
        let proxy = RedirectProxy::new(Arc::new(config), FakeUpstream::new(timed_out));

        let response = proxy.handle(get("go.example.com", "/_debug?x=1")).await;

        assert_eq!(response.status, StatusCode::OK);
        let report: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(report["path"], "/_debug");
        assert_eq!(report["query"], "x=1");
        assert_eq!(report["headers"]["host"][0], "go.example.com");
        assert_eq!(report["backend_origin"], "https://backend.internal");
    }

    #[tokio::test]
    async fn test_redirect_keeps_backend_cache_control() {
        let proxy = proxy(found_cached);
        let response = proxy.handle(get("go.example.com", "/AbC123")).await;

        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers.get(CACHE_CONTROL).unwrap(), "private, max-age=90");
        assert_eq!(
            response.headers.get(LOCATION).unwrap(),
            "https://real-target.com/page"
        );
    }

    #[tokio::test]
    async fn test_health_alias_is_local() {
        let proxy = proxy(timed_out);
        let response = proxy.handle(get("go.example.com", "/_health")).await;

        assert_eq!(response.status, StatusCode::OK);
        let report: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(report["status"], "healthy");
        assert!(proxy.upstream.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exempt_host_origin_down_is_500_page() {
        let proxy = proxy(refused);
        let response = proxy.handle(get("tinyslash.com", "/pricing")).await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(&response);
        assert!(body.contains("Server Error"));
        assert!(body.contains("tinyslash.com"));
        assert!(!body.contains("connection refused"));
        assert_eq!(proxy.upstream.calls.lock().unwrap().len(), 1);
    }
}
