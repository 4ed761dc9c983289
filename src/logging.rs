//! Tracing subscriber setup for the binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when neither `RUST_LOG` nor a configured level is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Builds the filter directive for a base level.
///
/// Chatty dependencies are capped at `warn` unless the level asks for
/// `trace`.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { DEFAULT_LOG_LEVEL } else { level };

    if level.eq_ignore_ascii_case("trace") {
        level.to_string()
    } else {
        format!("{},hyper=warn,reqwest=warn", level)
    }
}

/// Installs a stderr subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Calling this twice is a no-op.
pub fn init(level: Option<&str>) {
    let directive = filter_directive(level.unwrap_or(DEFAULT_LOG_LEVEL));
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
