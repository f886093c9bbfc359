use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::ErrorKind;

// Labels stay bounded: `kind` is a closed enum and `status` is derived from it.
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "http_errors_total",
            "Count of HTTP error responses emitted (status >= 400)",
        ),
        &["service", "kind", "status"],
    )
    .unwrap_or_else(|err| panic!("invalid http_errors_total definition: {err}"));
    let _ = REGISTRY.register(Box::new(counter.clone()));
    counter
});

pub fn record_error(service: &str, kind: ErrorKind) {
    let status = kind.status();
    HTTP_ERRORS_TOTAL
        .with_label_values(&[service, kind.code(), status.as_str()])
        .inc();
}

pub fn error_count(service: &str, kind: ErrorKind) -> u64 {
    let status = kind.status();
    HTTP_ERRORS_TOTAL
        .with_label_values(&[service, kind.code(), status.as_str()])
        .get()
}

/// Prometheus text exposition of the error counters.
pub fn render() -> String {
    Lazy::force(&HTTP_ERRORS_TOTAL);
    let mut buffer = Vec::new();
    if TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .is_err()
    {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
