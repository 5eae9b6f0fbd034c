//! Responses produced by the proxy core, independent of the server library

use crate::config::Brand;
use crate::error_page;
use crate::headers::{apply_cors, copy_end_to_end, X_POWERED_BY};
use crate::upstream::BackendResponse;
use bytes::Bytes;
use chrono::Utc;
use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use hyper::StatusCode;
use serde::Serialize;

pub const DEFAULT_CONTENT_CACHE: &str = "public, max-age=300";
const DEFAULT_CONTENT_TYPE: &str = "text/html";

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    fn new(status: StatusCode, brand: &Brand) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("{} Proxy", brand.name)) {
            headers.insert(X_POWERED_BY, value);
        }
        Self {
            status,
            headers,
            body: Bytes::new(),
        }
    }

    /// CORS preflight answer
    pub fn preflight(brand: &Brand) -> Self {
        let mut response = Self::new(StatusCode::OK, brand);
        apply_cors(&mut response.headers);
        response
    }

    /// Re-emit a backend redirect with its status and `Location` untouched
    pub fn redirect(
        status: StatusCode,
        location: HeaderValue,
        cache_control: Option<HeaderValue>,
        brand: &Brand,
    ) -> Self {
        let mut response = Self::new(status, brand);
        response.headers.insert(LOCATION, location);
        if let Some(cache_control) = cache_control {
            response.headers.insert(CACHE_CONTROL, cache_control);
        }
        response
    }

    /// Relay a 2xx backend response with permissive CORS
    pub fn content(backend: BackendResponse, brand: &Brand) -> Self {
        let mut response = Self::new(backend.status, brand);
        let mut headers = copy_end_to_end(&backend.headers);

        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        headers
            .entry(CACHE_CONTROL)
            .or_insert(HeaderValue::from_static(DEFAULT_CONTENT_CACHE));
        apply_cors(&mut headers);
        headers.remove(X_POWERED_BY);

        response.headers.extend(headers);
        response.body = backend.body;
        response
    }

    /// Relay an exempt-host response exactly as the origin sent it
    pub fn passthrough(backend: BackendResponse) -> Self {
        Self {
            status: backend.status,
            headers: copy_end_to_end(&backend.headers),
            body: backend.body,
        }
    }

    /// The branded error page for `status`
    pub fn error_page(brand: &Brand, host: &str, path: &str, status: StatusCode) -> Self {
        let mut response = Self::new(status, brand);
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response
            .headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response.body = Bytes::from(error_page::render(brand, host, path, status, Utc::now()));
        response
    }

    /// A JSON body; serialization failures degrade to the branded 500 page
    pub fn json<T: Serialize>(value: &T, brand: &Brand, host: &str, path: &str) -> Self {
        match serde_json::to_vec_pretty(value) {
            Ok(body) => {
                let mut response = Self::new(StatusCode::OK, brand);
                response
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
                    .headers
                    .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
                response.body = Bytes::from(body);
                response
            }
            Err(_) => Self::error_page(brand, host, path, StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}
