use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "TEND_LOG";

/// `TEND_LOG` wins over `RUST_LOG`; with neither set only warnings show,
/// or everything from debug up under `--verbose`.
pub fn filter_directive(tend_log: Option<&str>, rust_log: Option<&str>, verbose: bool) -> String {
    [tend_log, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string())
}

/// Installs the stderr subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let tend_log = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(tend_log.as_deref(), rust_log.as_deref(), verbose);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init();
}
