//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins over the configured level. Calling this twice, or after
/// another subscriber was installed, is harmless.
pub fn init(cfg: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();
}
