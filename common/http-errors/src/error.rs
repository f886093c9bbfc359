use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use thiserror::Error;

use crate::envelope::{Envelope, ErrorData};

pub type ApiResult<T> = Result<T, ApiError>;

/// Closed set of error kinds understood by the response formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Custom,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Validation,
        ErrorKind::Authentication,
        ErrorKind::Authorization,
        ErrorKind::NotFound,
        ErrorKind::Conflict,
        ErrorKind::Custom,
    ];

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Custom => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The kind whose status is `status`, if any.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.status() == status)
    }

    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Validation => "Invalid data",
            ErrorKind::Authentication => "Authentication required",
            ErrorKind::Authorization => "You do not have enough permission to this resource",
            ErrorKind::NotFound => "Resource not found",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Custom => "Oops something went wrong",
        }
    }

    /// Stable machine-readable code, used for the `X-Error-Code` header and metric labels.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Authentication => "authentication_error",
            ErrorKind::Authorization => "authorization_error",
            ErrorKind::NotFound => "not_found_error",
            ErrorKind::Conflict => "conflict_error",
            ErrorKind::Custom => "custom_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Sub-codes carried by authentication failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AuthSubCode {
    Generic = 0,
    Expired = 1,
    MissingRefreshInput = 2,
    InvalidRefreshPayload = 3,
}

impl From<AuthSubCode> for u16 {
    fn from(value: AuthSubCode) -> Self {
        value as u16
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    sub_code: u16,
    message: String,
    reason: Option<Value>,
    stack: Option<String>,
}

impl ApiError {
    /// Builds an error of `kind`. An empty message falls back to the kind's default.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            kind.default_message().to_string()
        } else {
            message
        };
        Self {
            kind,
            sub_code: 0,
            message,
            reason: None,
            stack: captured_backtrace(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Custom, message)
    }

    pub fn with_sub_code(mut self, sub_code: impl Into<u16>) -> Self {
        self.sub_code = sub_code.into();
        self
    }

    pub fn with_reason(mut self, reason: Value) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Wraps any error outside the taxonomy into a `Custom` error.
    ///
    /// Errors that already are an [`ApiError`] (directly, or as the root of an
    /// `anyhow` chain) are returned unchanged.
    pub fn normalize(error: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        match error.downcast::<ApiError>() {
            Ok(api) => *api,
            Err(other) => Self::custom(other.to_string()).with_stack(format!("{other:?}")),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn sub_code(&self) -> u16 {
        self.sub_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reason(&self) -> Option<&Value> {
        self.reason.as_ref()
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// True for authentication failures carrying the given sub-code.
    pub fn is_authentication(&self, sub_code: AuthSubCode) -> bool {
        self.kind == ErrorKind::Authentication && self.sub_code == u16::from(sub_code)
    }

    pub fn serialize(&self, include_stack_trace: bool) -> Envelope<ErrorData> {
        let stack_trace = if include_stack_trace {
            self.stack.clone()
        } else {
            None
        };
        Envelope::fail(
            self.status(),
            self.sub_code,
            ErrorData {
                reason: self.reason.clone(),
                message: self.message.clone(),
                stack_trace,
            },
            self.message.clone(),
        )
    }

    /// Renders the envelope and tags the response so an outer
    /// [`ErrorResponder`](crate::ErrorResponder) can find the original error.
    pub fn render(&self, include_stack_trace: bool) -> Response {
        let mut resp = (self.status(), Json(self.serialize(include_stack_trace))).into_response();
        resp.headers_mut()
            .insert("X-Error-Code", HeaderValue::from_static(self.kind.code()));
        resp.extensions_mut().insert(self.clone());
        resp
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.render(false)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        match value.downcast::<ApiError>() {
            Ok(api) => api,
            Err(other) => Self::custom(other.to_string()).with_stack(format!("{other:?}")),
        }
    }
}

fn captured_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}
