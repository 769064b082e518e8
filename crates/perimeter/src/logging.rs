//! Tracing subscriber setup.
//!
//! The level is read from `RUST_LOG` when set:
//!
//! ```bash
//! RUST_LOG=perimeter=debug,sqlx=warn cargo run
//! ```
//!
//! Call exactly one of these once at startup; a second call panics.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Human-readable logs, `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    init_logging_with_level("info");
}

/// Human-readable logs with a fallback level for when `RUST_LOG` is unset.
pub fn init_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// JSON logs for production log shipping.
pub fn init_logging_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
