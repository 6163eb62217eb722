//! Admit-or-reject gate for HTTP requests.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::Full;
use tracing::debug;

use super::identity::extract_identity;
use crate::ratelimit::AdmissionControl;

/// Body of the rejection response.
pub const TOO_MANY_REQUESTS_MSG: &str = "Too many requests";

/// Check rate limiting for an incoming request.
///
/// Returns:
/// - `None` if the request may pass through unchanged
/// - `Some(429 response)` if the client is over its limit
pub fn check<A>(
    limiter: &A,
    headers: &HeaderMap,
    remote_addr: Option<&str>,
) -> Option<Response<Full<Bytes>>>
where
    A: AdmissionControl + ?Sized,
{
    let identity = extract_identity(headers, limiter.identity_header(), remote_addr);

    if limiter.admit(&identity) {
        return None;
    }

    debug!(
        identity = %identity,
        remote_addr = remote_addr.unwrap_or_default(),
        "Rejecting request"
    );
    Some(too_many_requests())
}

/// Build the `429 Too Many Requests` response.
pub fn too_many_requests() -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(TOO_MANY_REQUESTS_MSG.as_bytes())));
    *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}
