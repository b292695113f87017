//! Logging setup for binaries built on Partyhall.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log targets of the Partyhall crates.
const TARGETS: [&str; 5] = [
    "partyhall",
    "partyhall_room",
    "partyhall_transport",
    "partyhall_protocol",
    "partyhall_timer",
];

/// Builds the filter applied when `RUST_LOG` is unset: every Partyhall
/// crate plus the binary itself at `default_level`.
pub fn default_filter(binary_name: &str, default_level: &str) -> String {
    TARGETS
        .iter()
        .copied()
        .chain(std::iter::once(binary_name))
        .map(|target| format!("{}={default_level}", target.replace('-', "_")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initializes the tracing subscriber.
///
/// The log level can be overridden with the `RUST_LOG` environment
/// variable.
///
/// ```no_run
/// partyhall::setup_logger("party-server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
