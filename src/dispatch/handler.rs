//! Handler contracts consumed by the dispatcher.

use axum::body::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt};
use std::error::Error as StdError;
use std::fmt;

use crate::dispatch::request::{Exchange, Response};
use crate::negotiation::Bean;

/// What a handler (or filter) hands back to the dispatcher.
#[derive(Debug)]
pub enum Reply {
    /// Filters only: run the next stage.
    Continue,
    /// A finished response; short-circuits when returned by a filter.
    Response(Response),
    /// A value to encode with the negotiated serializer.
    Bean(Bean),
}

/// Error raised by handler code. Opaque to the core.
#[derive(Debug)]
pub struct HandlerError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for HandlerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Request handler or filter bound by a route entry.
///
/// Implementations may block on I/O; the dispatcher holds no lock while
/// awaiting them.
pub trait Handler: Send + Sync {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Result<Reply, HandlerError>>;
}

/// Adapter turning a synchronous closure into a [`Handler`].
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Exchange) -> Result<Reply, HandlerError> + Send + Sync,
{
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Result<Reply, HandlerError>> {
        future::ready((self.0)(exchange)).boxed()
    }
}

/// Wrap a synchronous closure as a shareable handler.
pub fn handler_fn<F>(f: F) -> std::sync::Arc<dyn Handler>
where
    F: Fn(&mut Exchange) -> Result<Reply, HandlerError> + Send + Sync + 'static,
{
    std::sync::Arc::new(FnHandler(f))
}

/// A WebSocket message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
    Text(String),
    Binary(Bytes),
}

impl SessionMessage {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Endpoint for one WebSocket session at a time; shared across sessions.
pub trait SessionHandler: Send + Sync {
    /// Called once the upgrade completes; may greet the client.
    fn on_open(&self) -> Option<SessionMessage> {
        None
    }

    /// Handle one inbound message, optionally replying.
    fn on_message(&self, message: SessionMessage) -> BoxFuture<'_, Option<SessionMessage>>;

    fn on_close(&self) {}
}
