//! Header names and the filtering rules shared by the request and response paths

use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION, CONTENT_LENGTH, HOST,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_ORIGINAL_HOST: HeaderName = HeaderName::from_static("x-original-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

const KEEP_ALIVE: &str = "keep-alive";

/// Connection-scoped headers that never cross the proxy
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == CONNECTION
        || *name == PROXY_AUTHENTICATE
        || *name == PROXY_AUTHORIZATION
        || *name == TE
        || *name == TRAILER
        || *name == TRANSFER_ENCODING
        || *name == UPGRADE
        || name.as_str() == KEEP_ALIVE
}

/// Header names listed as options of the `Connection` header
fn connection_options(source: &HeaderMap) -> Vec<HeaderName> {
    source
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

/// Copy end-to-end headers, dropping hop-by-hop ones, those named in
/// `Connection`, and `Content-Length`
pub fn copy_end_to_end(source: &HeaderMap) -> HeaderMap {
    let connection_scoped = connection_options(source);
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        if is_hop_by_hop(name) || *name == CONTENT_LENGTH || connection_scoped.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Headers for the rewritten backend request, before identity headers are added
pub fn forwardable_request_headers(source: &HeaderMap) -> HeaderMap {
    let mut headers = copy_end_to_end(source);
    headers.remove(HOST);
    for name in [X_FORWARDED_HOST, X_ORIGINAL_HOST, X_FORWARDED_PROTO] {
        headers.remove(name);
    }
    headers
}

/// Replace whatever CORS headers are present with the proxy's permissive set
pub fn apply_cors(headers: &mut HeaderMap) {
    let stale: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with("access-control-"))
        .cloned()
        .collect();
    for name in stale {
        headers.remove(name);
    }

    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
}
