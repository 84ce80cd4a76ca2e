// Tracing subscriber setup for binaries.

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber. `RUST_LOG` takes precedence over `default_filter`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
