//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Install a fmt subscriber at `level`, overridable through `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(level: tracing::Level) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
