//! HTTP server front end
//! Translates hyper requests into `InboundRequest`s for the proxy core and back

use crate::config::{normalize_host, ProxyConfig};
use crate::error::ProxyError;
use crate::proxy::RedirectProxy;
use crate::request::InboundRequest;
use crate::response::ProxyResponse;
use crate::upstream::{HttpUpstream, Upstream};
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Pause after a failed accept so fd exhaustion has a chance to clear
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of inbound connections
#[async_trait]
pub trait Acceptor: Send {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Proxy server
pub struct ProxyServer<U: Upstream + 'static = HttpUpstream> {
    config: Arc<ProxyConfig>,
    proxy: Arc<RedirectProxy<U>>,
}

impl ProxyServer<HttpUpstream> {
    /// Create a server that forwards with a reqwest client
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let upstream = HttpUpstream::new(config.request_timeout())
            .context("Failed to build backend HTTP client")?;
        Ok(Self::with_upstream(config, upstream))
    }
}

impl<U: Upstream + 'static> ProxyServer<U> {
    pub fn with_upstream(config: ProxyConfig, upstream: U) -> Self {
        let config = Arc::new(config);
        let proxy = Arc::new(RedirectProxy::new(config.clone(), upstream));
        Self { config, proxy }
    }

    /// Bind the configured address and serve forever; only binding can fail
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = SocketAddr::new(self.config.bind_address(), self.config.http_port());
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("HTTP server listening on {}", addr);

        self.serve(listener).await
    }

    /// Accept loop; a failed accept is logged and retried after a short pause
    pub async fn serve<A: Acceptor>(self: Arc<Self>, mut acceptor: A) -> Result<()> {
        loop {
            let (stream, remote_addr) = match acceptor.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let proxy = self.proxy.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, remote_addr, proxy, config).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single HTTP connection
    async fn handle_connection(
        stream: TcpStream,
        remote_addr: SocketAddr,
        proxy: Arc<RedirectProxy<U>>,
        config: Arc<ProxyConfig>,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .preserve_header_case(true)
            .title_case_headers(false)
            .serve_connection(
                io,
                service_fn(move |req| {
                    let proxy = proxy.clone();
                    let config = config.clone();
                    async move { Self::handle_request(req, remote_addr, proxy, config).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Handle incoming request; every failure becomes a branded page
    async fn handle_request(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        proxy: Arc<RedirectProxy<U>>,
        config: Arc<ProxyConfig>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
        let path = req.uri().path().to_string();
        let raw_host = Self::request_host(&req);

        let response = match Self::read_request(req, remote_addr, config.max_body_bytes()).await {
            Ok(inbound) => proxy.handle(inbound).await,
            Err(e) => {
                error!("Rejected request from {}: {}", remote_addr, e);
                let host = raw_host.as_deref().map(normalize_host).unwrap_or_default();
                ProxyResponse::error_page(config.brand(), &host, &path, e.status())
            }
        };

        Ok(Self::into_hyper(response))
    }

    /// Host from the `Host` header, falling back to an absolute-form URI
    fn request_host<T>(req: &Request<T>) -> Option<String> {
        req.headers()
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| req.uri().authority().map(|a| a.to_string()))
            .filter(|h| !h.trim().is_empty())
    }

    /// Collect the request into the core's model, enforcing the body limit
    async fn read_request(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        max_body_bytes: usize,
    ) -> Result<InboundRequest, ProxyError> {
        let host = Self::request_host(&req).ok_or(ProxyError::MissingHost)?;
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let (parts, body) = req.into_parts();

        let body = Limited::new(body, max_body_bytes)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    ProxyError::BodyTooLarge(max_body_bytes)
                } else {
                    ProxyError::Body(e.to_string())
                }
            })?
            .to_bytes();

        let mut inbound = InboundRequest::new(parts.method, normalize_host(&host), &path_and_query);
        inbound.headers = parts.headers;
        inbound.body = body;
        inbound.client_addr = Some(remote_addr.ip());

        Ok(inbound)
    }

    fn into_hyper(response: ProxyResponse) -> Response<BoxBody<Bytes, hyper::Error>> {
        let mut out = Response::new(Self::full_body(response.body));
        *out.status_mut() = response.status;
        *out.headers_mut() = response.headers;
        out
    }

    /// Create full body
    fn full_body(bytes: Bytes) -> BoxBody<Bytes, hyper::Error> {
        Full::new(bytes).map_err(|never| match never {}).boxed()
    }
}
