use tracing_subscriber::EnvFilter;

/// Filter directive: `RUST_LOG` when set, otherwise `fallback_level`.
pub fn filter_directive(rust_log: Option<String>, fallback_level: &str) -> String {
    rust_log
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback_level.to_string())
}

/// Installs a JSON subscriber writing one object per line to stderr.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(fallback_level: &str) {
    let directive = filter_directive(std::env::var("RUST_LOG").ok(), fallback_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_current_span(false)
        .with_writer(std::io::stderr)
        .try_init();
}
