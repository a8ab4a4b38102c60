//! Tracing subscriber setup.
//!
//! The relay logs through `tracing` with structured fields. The subscriber
//! writes compact human-readable lines to stderr; `RUST_LOG` takes priority
//! over the configured level.

use tracing_subscriber::EnvFilter;

/// Level used when `--debug` is passed.
pub const DEBUG_LEVEL: &str = "debug";

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup. Later calls are no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

/// Pick the effective level from the debug flag and the configured level.
pub fn effective_level(debug: bool, configured: &str) -> &str {
    if debug { DEBUG_LEVEL } else { configured }
}
