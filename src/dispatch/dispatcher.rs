//! Request dispatch against the live application versions.

use axum::body::Bytes;
use axum::http::{header, Method, StatusCode};
use futures_util::FutureExt;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::deploy::{Application, Registry};
use crate::dispatch::handler::{Handler, HandlerError, Reply};
use crate::dispatch::request::{Exchange, Request, Response};
use crate::dispatch::static_files::StaticFiles;
use crate::negotiation::{Bean, NegotiationError, Negotiator, Serializer};
use crate::observability::metrics;
use crate::routing::{format_allow_header, ExactBinding, Target};
use crate::statistics::{HttpOutcome, HttpStatistics};

/// Terminal result of dispatching one request.
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled(Response),
    NotFound,
    MethodNotAllowed { allowed: Vec<Method> },
    NoAcceptableFormat(NegotiationError),
    UnsupportedFormat(NegotiationError),
    HandlerFailed(HandlerError),
}

impl DispatchOutcome {
    /// Status line and body written to the transport.
    pub fn into_response(self) -> Response {
        match self {
            Self::Handled(response) => response,
            Self::NotFound => Response::text(StatusCode::NOT_FOUND, "Not Found"),
            Self::MethodNotAllowed { allowed } => {
                Response::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
                    .with_header(header::ALLOW, &format_allow_header(&allowed))
            }
            Self::NoAcceptableFormat(e) => {
                Response::text(StatusCode::NOT_ACCEPTABLE, e.to_string())
            }
            Self::UnsupportedFormat(e) => {
                Response::text(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
            }
            Self::HandlerFailed(_) => {
                Response::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

/// Resolves requests to handlers and runs filter chains.
///
/// Holds no lock while a handler runs; each request works on the
/// application version it loaded at resolution time.
pub struct Dispatcher {
    registry: Arc<Registry>,
    negotiator: Arc<Negotiator>,
    http_stats: Arc<HttpStatistics>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        negotiator: Arc<Negotiator>,
        http_stats: Arc<HttpStatistics>,
    ) -> Self {
        Self {
            registry,
            negotiator,
            http_stats,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn negotiator(&self) -> &Arc<Negotiator> {
        &self.negotiator
    }

    pub fn http_stats(&self) -> &Arc<HttpStatistics> {
        &self.http_stats
    }

    /// Dispatch a request and record its outcome exactly once.
    pub async fn dispatch(&self, request: Request) -> Response {
        let start = Instant::now();
        let is_head = request.method == Method::HEAD;
        let (application, outcome) = self.run(request).await;

        if let DispatchOutcome::HandlerFailed(e) = &outcome {
            tracing::error!(
                application = application.as_deref().unwrap_or("-"),
                error = %e,
                "Handler failed"
            );
        }
        let mut response = outcome.into_response();
        if is_head {
            response.body = Bytes::new();
        }

        let status = response.status.as_u16();
        self.http_stats.record(HttpOutcome {
            status,
            duration: start.elapsed(),
            response_bytes: response.body.len() as u64,
        });
        metrics::record_request(application.as_deref().unwrap_or("-"), status, start);
        response
    }

    /// Dispatch without recording statistics.
    pub async fn execute(&self, request: Request) -> DispatchOutcome {
        self.run(request).await.1
    }

    async fn run(&self, request: Request) -> (Option<Arc<str>>, DispatchOutcome) {
        let Some((application, path)) = self.registry.lookup(&request.path) else {
            tracing::debug!(path = %request.path, "No application for path");
            return (None, DispatchOutcome::NotFound);
        };
        let outcome = self.run_in(&application, request, path).await;
        (Some(application.shared_name()), outcome)
    }

    async fn run_in(
        &self,
        application: &Application,
        request: Request,
        path: String,
    ) -> DispatchOutcome {
        let routes = Arc::clone(application.routes());
        let method = request.method.clone();
        let resolution = routes.resolve(&method, &path);
        let mut exchange = Exchange::new(request, application.shared_name(), path);

        for filter in &resolution.filters {
            match invoke(filter.handler.as_ref(), &mut exchange).await {
                Ok(Reply::Continue) => {}
                Ok(Reply::Response(response)) => return DispatchOutcome::Handled(response),
                Ok(Reply::Bean(bean)) => return self.encode(&exchange, bean),
                Err(e) => return DispatchOutcome::HandlerFailed(e),
            }
        }

        match resolution.target {
            Target::Handler(binding) => self.run_handler(binding, &mut exchange).await,
            Target::MethodNotAllowed { allowed } if method == Method::OPTIONS => {
                DispatchOutcome::Handled(
                    Response::new(StatusCode::NO_CONTENT)
                        .with_header(header::ALLOW, &format_allow_header(&allowed)),
                )
            }
            Target::MethodNotAllowed { .. } if method == Method::TRACE => {
                DispatchOutcome::Handled(trace_echo(&exchange.request))
            }
            Target::MethodNotAllowed { allowed } => DispatchOutcome::MethodNotAllowed { allowed },
            Target::NotFound if method == Method::GET || method == Method::HEAD => {
                serve_static(application, &exchange.path).await
            }
            Target::NotFound => DispatchOutcome::NotFound,
        }
    }

    async fn run_handler(
        &self,
        binding: &ExactBinding,
        exchange: &mut Exchange,
    ) -> DispatchOutcome {
        // Negotiate both directions before running handler code
        let serializer = match &binding.produces {
            Some(bean) => {
                let accept = exchange.request.header(&header::ACCEPT);
                match self.negotiator.create_serializer(bean, accept) {
                    Ok(serializer) => Some(serializer),
                    Err(e) => return DispatchOutcome::NoAcceptableFormat(e),
                }
            }
            None => None,
        };

        if let Some(bean) = &binding.consumes {
            let content_type = exchange.request.header(&header::CONTENT_TYPE);
            let deserializer = match self.negotiator.create_deserializer(bean, content_type) {
                Ok(deserializer) => deserializer,
                Err(e) => return DispatchOutcome::UnsupportedFormat(e),
            };
            match deserializer.deserialize(bean, &exchange.request.body) {
                Ok(decoded) => exchange.bean = Some(decoded),
                Err(e) => {
                    return DispatchOutcome::Handled(Response::text(
                        StatusCode::BAD_REQUEST,
                        e.to_string(),
                    ))
                }
            }
        }

        match invoke(binding.handler.as_ref(), exchange).await {
            Ok(Reply::Continue) => DispatchOutcome::Handled(Response::new(StatusCode::NO_CONTENT)),
            Ok(Reply::Response(response)) => DispatchOutcome::Handled(response),
            Ok(Reply::Bean(bean)) => match serializer {
                Some(serializer) if binding.produces.as_ref() == Some(&bean.ty) => {
                    write_bean(serializer.as_ref(), &bean)
                }
                _ => self.encode(exchange, bean),
            },
            Err(e) => DispatchOutcome::HandlerFailed(e),
        }
    }

    /// Encode a bean with a serializer negotiated for its own type.
    fn encode(&self, exchange: &Exchange, bean: Bean) -> DispatchOutcome {
        let accept = exchange.request.header(&header::ACCEPT);
        match self.negotiator.create_serializer(&bean.ty, accept) {
            Ok(serializer) => write_bean(serializer.as_ref(), &bean),
            Err(e) => DispatchOutcome::NoAcceptableFormat(e),
        }
    }
}

/// Run a handler, turning a panic into a handler failure.
async fn invoke(handler: &dyn Handler, exchange: &mut Exchange) -> Result<Reply, HandlerError> {
    match AssertUnwindSafe(handler.handle(exchange)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(HandlerError::new("handler panicked")),
    }
}

fn write_bean(serializer: &dyn Serializer, bean: &Bean) -> DispatchOutcome {
    match serializer.serialize(bean) {
        Ok(body) => DispatchOutcome::Handled(
            Response::new(StatusCode::OK)
                .with_header(header::CONTENT_TYPE, serializer.content_type())
                .with_body(body),
        ),
        Err(e) => DispatchOutcome::HandlerFailed(HandlerError::with_source(
            format!("failed to encode '{}'", bean.ty),
            e,
        )),
    }
}

async fn serve_static(application: &Application, path: &str) -> DispatchOutcome {
    match StaticFiles::for_application(application.base_dir()).load(path).await {
        Ok((bytes, content_type)) => DispatchOutcome::Handled(
            Response::new(StatusCode::OK)
                .with_header(header::CONTENT_TYPE, content_type)
                .with_body(bytes),
        ),
        Err(_) => DispatchOutcome::NotFound,
    }
}

/// Echo the request line and headers back as `message/http`.
fn trace_echo(request: &Request) -> Response {
    let mut body = format!("{} {}", request.method, request.path);
    if let Some(query) = &request.query {
        let _ = write!(body, "?{}", query);
    }
    body.push_str(" HTTP/1.1\r\n");
    for (name, value) in &request.headers {
        let _ = write!(body, "{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()));
    }
    Response::new(StatusCode::OK)
        .with_header(header::CONTENT_TYPE, "message/http")
        .with_body(body)
}
