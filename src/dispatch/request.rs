//! Transport-neutral request and response descriptors.
//!
//! # Responsibilities
//! - Carry the parsed request line, headers and buffered body
//! - Carry the status, headers and body written back by the core
//! - Hold per-request state shared between filters and the handler
//!
//! # Design Decisions
//! - Bodies are fully buffered `Bytes` (the transport enforces size limits)
//! - Header types come from the `http` crate re-exported by axum

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use crate::negotiation::{Bean, CodecError};

/// A decoded inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Full request path, without query string.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A response produced by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Plain-text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// State passed along the filter chain and into the handler.
#[derive(Debug)]
pub struct Exchange {
    pub request: Request,
    /// Name of the application serving the request.
    pub application: Arc<str>,
    /// Path relative to the application.
    pub path: String,
    /// Decoded request body, for routes that consume a bean.
    pub bean: Option<Bean>,
    /// Values set by filters for later stages.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Exchange {
    pub fn new(request: Request, application: Arc<str>, path: String) -> Self {
        Self {
            request,
            application,
            path,
            bean: None,
            attributes: HashMap::new(),
        }
    }

    /// Decoded request body converted into a concrete type.
    pub fn bean_as<T: DeserializeOwned>(&self) -> Option<Result<T, CodecError>> {
        self.bean.as_ref().map(Bean::to_typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = Request::new(Method::POST, "/app/items")
            .with_header(header::CONTENT_TYPE, "application/json")
            .with_body("{}");
        assert_eq!(request.header(&header::CONTENT_TYPE), Some("application/json"));
        assert_eq!(&request.body[..], b"{}");
        assert!(request.header(&header::ACCEPT).is_none());
    }

    #[test]
    fn test_text_response() {
        let response = Response::text(StatusCode::NOT_FOUND, "missing");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            response.header(&header::CONTENT_TYPE),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(&response.body[..], b"missing");
    }
}
