//! Outbound HTTP client for the backend
//! A single attempt per request, bounded by the configured timeout

use crate::error::UpstreamError;
use crate::request::BackendRequest;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::StatusCode;
use std::time::Duration;
use tracing::debug;

/// A complete response from the backend
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Something that can answer a backend request
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: BackendRequest) -> Result<BackendResponse, UpstreamError>;
}

/// reqwest-backed upstream with redirects disabled
pub struct HttpUpstream {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(timeout)
            .build()?;

        Ok(Self { client, timeout })
    }

    async fn exchange(&self, request: BackendRequest) -> reqwest::Result<BackendResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(BackendResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: BackendRequest) -> Result<BackendResponse, UpstreamError> {
        debug!("{} {}", request.method, request.url);

        match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(UpstreamError::from_reqwest(e, self.timeout)),
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(method: Method, url: String) -> BackendRequest {
        BackendRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/AbC123"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "https://real-target.com/page"),
            )
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(Duration::from_secs(5)).unwrap();
        let response = upstream
            .send(request(Method::GET, format!("{}/AbC123", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(
            response.headers.get("location").unwrap(),
            "https://real-target.com/page"
        );
    }

    #[tokio::test]
    async fn test_body_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/urls"))
            .and(body_string("payload"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(Duration::from_secs(5)).unwrap();
        let mut req = request(Method::POST, format!("{}/api/v1/urls", server.uri()));
        req.body = Some(Bytes::from_static(b"payload"));

        let response = upstream.send(req).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(&response.body[..], b"created");
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(Duration::from_millis(200)).unwrap();
        let result = upstream
            .send(request(Method::GET, format!("{}/slow", server.uri())))
            .await;

        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let upstream = HttpUpstream::new(Duration::from_secs(2)).unwrap();
        let result = upstream
            .send(request(Method::GET, "http://127.0.0.1:1/AbC123".to_string()))
            .await;

        assert!(matches!(result, Err(UpstreamError::Unreachable(_))));
    }
}
