use tracing_subscriber::EnvFilter;

/// Installs the process-wide fmt subscriber.
///
/// The filter defaults to `info` and honours `RUST_LOG`. Calling this more than
/// once leaves the first subscriber in place.
pub fn init_tracing(service: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if json {
        builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_current_span(false)
            .try_init()
            .is_ok()
    } else {
        builder.with_target(true).try_init().is_ok()
    };

    if installed {
        tracing::info!(service, json, "tracing initialised");
    }
}
