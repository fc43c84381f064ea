//! Logging utilities for the Darsly application.
//!
//! One place to initialize the tracing subscriber so every crate logs through
//! the same filter and format.

use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber at the default level (INFO).
pub fn init() {
    init_with_level(Level::INFO);
}

/// Initialize the tracing subscriber with a specific minimum log level.
///
/// `RUST_LOG` still takes precedence through the env filter, so operators can
/// raise or lower individual targets without a rebuild.
pub fn init_with_level(level: Level) {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("darsly={}", level).parse().unwrap());

    // try_init so tests that initialize twice do not panic
    let result = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init();

    if result.is_ok() {
        info!("Logging initialized at level: {}", level);
    }
}
