//! Outbound response conversion.

use axum::body::Body;

use crate::dispatch::Response;

/// Convert a dispatch response into an axum response.
pub fn into_http_response(response: Response) -> axum::response::Response {
    let mut out = axum::response::Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}
