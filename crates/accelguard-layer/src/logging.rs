//! Subscriber setup for hosts that do not install their own.

use accelguard_common::LogLevel;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber for `accelguard*` targets at `level`.
///
/// `RUST_LOG` takes precedence when set. Returns `false` if a global
/// subscriber was already installed.
pub fn init_logging(level: LogLevel) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "accelguard_layer={level},accelguard_refcount={level},accelguard_bounds={level},accelguard_common={level}"
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init().is_ok()
}
