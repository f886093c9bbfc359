pub mod envelope;
pub mod error;
pub mod metrics;
pub mod responder;

pub use envelope::{Envelope, EnvelopeStatus, ErrorData};
pub use error::{ApiError, ApiResult, AuthSubCode, ErrorKind};
pub use responder::{
    panic_response, respond_errors, ErrorLogEntry, ErrorLogSink, ErrorResponder, RequestSummary,
    ResponseIdentity, SinkResult, TracingLogSink,
};
