//! Inbound request conversion.
//!
//! # Responsibilities
//! - Attach a request ID (UUID v4) as early as possible
//! - Buffer the body within the configured size limit
//! - Convert the axum request into the transport-neutral [`Request`]
//!
//! # Design Decisions
//! - A client-supplied `x-request-id` is kept as is
//! - WebSocket upgrades are detected before the body is read

use axum::body::{to_bytes, Body};
use axum::http::{header, request::Parts, HeaderMap, HeaderName, StatusCode};
use axum::BoxError;
use http_body_util::LengthLimitError;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

use crate::dispatch::Request;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Layer assigning `x-request-id` to requests that carry none.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Layer copying the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Request ID assigned by [`set_request_id_layer`], or `"unknown"`.
pub fn request_id(parts: &Parts) -> String {
    parts
        .extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// True when the headers ask for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let has_token = |name: header::HeaderName, token: &str| {
        headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case(token))
    };
    has_token(header::UPGRADE, "websocket") && has_token(header::CONNECTION, "upgrade")
}

/// Error raised when the body exceeds the size limit or cannot be read.
#[derive(Debug, thiserror::Error)]
pub enum BodyRejected {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Unreadable(#[source] BoxError),
}

impl BodyRejected {
    fn from_body_error(error: axum::Error, limit: usize) -> Self {
        let inner = error.into_inner();
        let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(inner.as_ref());
        while let Some(e) = cause {
            if e.is::<LengthLimitError>() {
                return Self::TooLarge { limit };
            }
            cause = e.source();
        }
        Self::Unreadable(inner)
    }

    /// 413 for an oversized body, 400 for any other read failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unreadable(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Buffer the body and build the dispatch request.
pub async fn into_dispatch_request(
    parts: Parts,
    body: Body,
    max_body_bytes: usize,
) -> Result<Request, BodyRejected> {
    let body = to_bytes(body, max_body_bytes)
        .await
        .map_err(|e| BodyRejected::from_body_error(e, max_body_bytes))?;
    Ok(Request {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn parts(request: axum::http::Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_detects_websocket_upgrade() {
        let upgrade = parts(
            axum::http::Request::get("/chat")
                .header(header::UPGRADE, "WebSocket")
                .header(header::CONNECTION, "keep-alive, Upgrade")
                .body(())
                .unwrap(),
        );
        assert!(is_websocket_upgrade(&upgrade.headers));

        let plain = parts(axum::http::Request::get("/chat").body(()).unwrap());
        assert!(!is_websocket_upgrade(&plain.headers));
    }

    #[tokio::test]
    async fn test_into_dispatch_request() {
        let (parts, body) = axum::http::Request::post("/shop/cart?item=3")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap()
            .into_parts();

        let request = into_dispatch_request(parts, body, 1024).await.unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/shop/cart");
        assert_eq!(request.query.as_deref(), Some("item=3"));
        assert_eq!(request.header(&header::CONTENT_TYPE), Some("application/json"));
        assert_eq!(&request.body[..], b"{}");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let (parts, body) = axum::http::Request::post("/upload")
            .body(Body::from(vec![0u8; 64]))
            .unwrap()
            .into_parts();
        let err = into_dispatch_request(parts, body, 16).await.unwrap_err();
        assert!(matches!(err, BodyRejected::TooLarge { limit: 16 }));
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_read_failure_is_not_payload_too_large() {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
            Ok(b"{\"partial\":"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
        ];
        let (parts, _) = axum::http::Request::post("/upload").body(()).unwrap().into_parts();
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let err = into_dispatch_request(parts, body, 1024).await.unwrap_err();
        assert!(matches!(err, BodyRejected::Unreadable(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
