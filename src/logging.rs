//! Tracing subscriber setup for the binary.
//!
//! Library code only emits events; this module is the single place that
//! installs a subscriber.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::prelude::*;

/// Maps the `-v` count to a default filter directive.
#[must_use]
pub const fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Builds the filter: `RUST_LOG` wins when set and no `-v` flag was given.
#[must_use]
pub fn filter_for(verbosity: u8, rust_log: Option<&str>) -> EnvFilter {
    match rust_log {
        Some(directives) if verbosity == 0 && !directives.trim().is_empty() => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(default_level(0)))
        }
        _ => EnvFilter::new(default_level(verbosity)),
    }
}

/// Installs a stderr subscriber. Repeated calls keep the first one.
pub fn init(verbosity: u8) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = filter_for(verbosity, rust_log.as_deref());
    let fmt_layer = tracing_fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .ok();
}
