//! Classification of backend results into the response classes the proxy serves

use crate::error::UpstreamError;
use crate::upstream::BackendResponse;
use hyper::header::{HeaderValue, CACHE_CONTROL, LOCATION};
use hyper::StatusCode;

/// What the backend's answer means for the client
#[derive(Debug)]
pub enum Outcome {
    /// 3xx carrying a `Location`
    Redirect {
        status: StatusCode,
        location: HeaderValue,
        cache_control: Option<HeaderValue>,
    },
    /// 2xx, relayed with CORS headers
    Content(BackendResponse),
    /// The backend does not know this short code or domain
    NotFound,
    /// Any other backend status, including 3xx without `Location`.
    /// Statuses that cannot carry a body are reported as 502.
    UpstreamStatus(StatusCode),
    Timeout,
    Unreachable,
}

impl Outcome {
    /// Status the client will see
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Redirect { status, .. } => *status,
            Outcome::Content(response) => response.status,
            Outcome::NotFound => StatusCode::NOT_FOUND,
            Outcome::UpstreamStatus(status) => *status,
            Outcome::Timeout | Outcome::Unreachable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn classify(result: Result<BackendResponse, UpstreamError>) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(UpstreamError::Timeout(_)) => return Outcome::Timeout,
        Err(UpstreamError::Unreachable(_)) | Err(UpstreamError::Transport(_)) => {
            return Outcome::Unreachable
        }
    };

    let status = response.status;

    if status.is_redirection() {
        if let Some(location) = response.headers.get(LOCATION) {
            return Outcome::Redirect {
                status,
                location: location.clone(),
                cache_control: response.headers.get(CACHE_CONTROL).cloned(),
            };
        }
        return Outcome::UpstreamStatus(page_status(status));
    }

    if status.is_success() {
        return Outcome::Content(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Outcome::NotFound;
    }

    Outcome::UpstreamStatus(page_status(status))
}

/// 1xx and 304 responses are sent without a body, so the error page goes out as 502
fn page_status(status: StatusCode) -> StatusCode {
    if status.is_informational() || status == StatusCode::NOT_MODIFIED {
        StatusCode::BAD_GATEWAY
    } else {
        status
    }
}
