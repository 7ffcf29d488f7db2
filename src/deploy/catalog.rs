//! Named handlers that application manifests bind to routes.

use axum::http::StatusCode;
use futures_util::future::{self, BoxFuture, FutureExt};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::{
    handler_fn, Exchange, Handler, HandlerError, Reply, Response, SessionHandler, SessionMessage,
};
use crate::negotiation::{Bean, BeanType};

/// Bean type produced by the built-in `echo` handler.
pub const ECHO_BEAN: BeanType = BeanType::new("Echo");

/// Registry of handler implementations, keyed by the names used in `app.toml`.
#[derive(Default, Clone)]
pub struct HandlerCatalog {
    handlers: HashMap<String, Arc<dyn Handler>>,
    sockets: HashMap<String, Arc<dyn SessionHandler>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the handlers shipped in this crate:
    /// `echo`, `hello`, `access-log` (filter) and `ws-echo` (WebSocket).
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register("echo", handler_fn(echo));
        catalog.register(
            "hello",
            handler_fn(|exchange| {
                Ok(Reply::Response(Response::text(
                    StatusCode::OK,
                    format!("Hello from {}", exchange.application),
                )))
            }),
        );
        catalog.register(
            "access-log",
            handler_fn(|exchange| {
                tracing::info!(
                    application = %exchange.application,
                    method = %exchange.request.method,
                    path = %exchange.path,
                    "Request"
                );
                Ok(Reply::Continue)
            }),
        );
        catalog.register_socket("ws-echo", Arc::new(EchoSession));
        catalog
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn Handler>) -> &mut Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    pub fn register_socket(&mut self, name: &str, handler: Arc<dyn SessionHandler>) -> &mut Self {
        self.sockets.insert(name.to_string(), handler);
        self
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn socket(&self, name: &str) -> Option<Arc<dyn SessionHandler>> {
        self.sockets.get(name).cloned()
    }
}

/// Echo the decoded request bean, or describe the request as an `Echo` bean.
fn echo(exchange: &mut Exchange) -> Result<Reply, HandlerError> {
    if let Some(bean) = exchange.bean.take() {
        return Ok(Reply::Bean(bean));
    }
    Ok(Reply::Bean(Bean::new(
        ECHO_BEAN,
        json!({
            "method": exchange.request.method.as_str(),
            "path": exchange.path,
            "query": exchange.request.query,
            "body": String::from_utf8_lossy(&exchange.request.body),
        }),
    )))
}

/// Replies to every message with the same payload.
struct EchoSession;

impl SessionHandler for EchoSession {
    fn on_message(&self, message: SessionMessage) -> BoxFuture<'_, Option<SessionMessage>> {
        future::ready(Some(message)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Request;
    use axum::http::Method;

    #[tokio::test]
    async fn test_echo_describes_request() {
        let catalog = HandlerCatalog::with_builtins();
        let handler = catalog.handler("echo").unwrap();
        let mut exchange = Exchange::new(
            Request::new(Method::POST, "/app/echo").with_body("ping"),
            Arc::from("app"),
            "/echo".into(),
        );

        match handler.handle(&mut exchange).await.unwrap() {
            Reply::Bean(bean) => {
                assert_eq!(bean.ty, ECHO_BEAN);
                assert_eq!(bean.value["method"], "POST");
                assert_eq!(bean.value["path"], "/echo");
                assert_eq!(bean.value["body"], "ping");
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ws_echo_replies_with_payload() {
        let catalog = HandlerCatalog::with_builtins();
        let session = catalog.socket("ws-echo").unwrap();
        let reply = session.on_message(SessionMessage::Text("hi".into())).await;
        assert_eq!(reply, Some(SessionMessage::Text("hi".into())));
        assert!(catalog.socket("missing").is_none());
    }
}
