use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use axum::http::response::Parts;
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, error};

use crate::{metrics, ApiError, Envelope, ErrorData, ErrorKind};

const RAW_BODY_LIMIT: usize = 64 * 1024;

pub type SinkResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Identity of the caller, attached to responses by the authentication layers so
/// the responder can report it without reaching into request state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseIdentity(pub String);

/// Structured record written for every 500 response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub method: String,
    pub url: String,
    pub client_info: Option<String>,
    pub user: Option<String>,
    pub status: u16,
    pub status_message: String,
    pub error: Option<String>,
}

pub trait ErrorLogSink: Send + Sync {
    fn record(&self, entry: &ErrorLogEntry) -> SinkResult;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl ErrorLogSink for TracingLogSink {
    fn record(&self, entry: &ErrorLogEntry) -> SinkResult {
        error!(
            target: "http_errors",
            method = %entry.method,
            url = %entry.url,
            client_info = entry.client_info.as_deref().unwrap_or(""),
            user = entry.user.as_deref().unwrap_or(""),
            status = entry.status,
            error = entry.error.as_deref().unwrap_or(""),
            "{}",
            entry.status_message
        );
        Ok(())
    }
}

/// Request attributes captured before the inner layers consume the request.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: Method,
    pub url: String,
    pub client_info: Option<String>,
}

impl RequestSummary {
    pub fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            url: req.uri().to_string(),
            client_info: req
                .headers()
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
        }
    }
}

/// Terminal error formatter.
#[derive(Clone)]
pub struct ErrorResponder {
    service: Arc<str>,
    include_stack_trace: bool,
    sink: Arc<dyn ErrorLogSink>,
}

impl ErrorResponder {
    pub fn new(service: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
            include_stack_trace: false,
            sink: Arc::new(TracingLogSink),
        }
    }

    pub fn with_stack_trace(mut self, include: bool) -> Self {
        self.include_stack_trace = include;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ErrorLogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn includes_stack_trace(&self) -> bool {
        self.include_stack_trace
    }

    /// Logs (for 500s), counts and renders `error`.
    pub fn respond(&self, error: &ApiError, request: &RequestSummary, user: Option<&str>) -> Response {
        self.observe(error, request, user);
        error.render(self.include_stack_trace)
    }

    async fn finish(&self, request: &RequestSummary, response: Response) -> Response {
        if let Some(error) = response.extensions().get::<ApiError>().cloned() {
            let user = identity(&response);
            self.observe(&error, request, user.as_deref());
            if self.include_stack_trace {
                let (parts, _) = response.into_parts();
                return replace_body(parts, &error, true);
            }
            return response;
        }

        if response.status().is_client_error() {
            return self.wrap_client_error(request, response).await;
        }
        if !response.status().is_server_error() {
            return response;
        }

        // A raw 5xx from an inner layer: wrap it so the client still gets an envelope.
        let user = identity(&response);
        let (parts, body) = response.into_parts();
        let error = ApiError::custom(read_text(body).await);
        self.observe(&error, request, user.as_deref());
        replace_body(parts, &error, self.include_stack_trace)
    }

    /// Raw 4xx responses (axum's 405, extractor rejections) keep their status
    /// but get an envelope body.
    async fn wrap_client_error(&self, request: &RequestSummary, response: Response) -> Response {
        let user = identity(&response);
        let (parts, body) = response.into_parts();
        let status = parts.status;
        let mut message = read_text(body).await;
        if message.is_empty() {
            message = status.canonical_reason().unwrap_or("Request failed").to_string();
        }

        match ErrorKind::from_status(status) {
            Some(kind) => {
                let error = ApiError::new(kind, message);
                self.observe(&error, request, user.as_deref());
                replace_body(parts, &error, false)
            }
            None => {
                let envelope = Envelope::fail(
                    status,
                    0,
                    ErrorData {
                        reason: None,
                        message: message.clone(),
                        stack_trace: None,
                    },
                    message,
                );
                json_response(parts, &envelope).unwrap_or_else(|| status.into_response())
            }
        }
    }

    fn observe(&self, error: &ApiError, request: &RequestSummary, user: Option<&str>) {
        metrics::record_error(&self.service, error.kind());
        if error.status().as_u16() != 500 {
            return;
        }
        let entry = ErrorLogEntry {
            method: request.method.to_string(),
            url: request.url.clone(),
            client_info: request.client_info.clone(),
            user: user.map(str::to_owned),
            status: error.status().as_u16(),
            status_message: error.message().to_string(),
            error: error.stack().map(str::to_owned),
        };
        // The sink must never mask the response, even if it panics.
        match catch_unwind(AssertUnwindSafe(|| self.sink.record(&entry))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(error = %err, "error log sink failed"),
            Err(_) => debug!("error log sink panicked"),
        }
    }
}

/// Axum middleware: `middleware::from_fn_with_state(responder, respond_errors)`,
/// installed as the outermost layer.
pub async fn respond_errors(
    State(responder): State<ErrorResponder>,
    req: Request,
    next: Next,
) -> Response {
    let summary = RequestSummary::from_request(&req);
    let response = next.run(req).await;
    responder.finish(&summary, response).await
}

/// Handler for `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else {
        String::new()
    };
    ApiError::custom(message).into_response()
}

fn identity(response: &Response) -> Option<String> {
    response
        .extensions()
        .get::<ResponseIdentity>()
        .map(|identity| identity.0.clone())
}

async fn read_text(body: Body) -> String {
    match to_bytes(body, RAW_BODY_LIMIT).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(err) => {
            debug!(error = %err, "unable to read inner error body");
            String::new()
        }
    }
}

fn replace_body(mut parts: Parts, error: &ApiError, include_stack_trace: bool) -> Response {
    parts.status = error.status();
    parts
        .headers
        .insert("X-Error-Code", HeaderValue::from_static(error.kind().code()));
    parts.extensions.insert(error.clone());
    json_response(parts, &error.serialize(include_stack_trace))
        .unwrap_or_else(|| error.render(false))
}

fn json_response(mut parts: Parts, envelope: &Envelope<ErrorData>) -> Option<Response> {
    let body = serde_json::to_vec(envelope).ok()?;
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Some(Response::from_parts(parts, Body::from(body)))
}
