//! # Telemetry: Tracing Setup
//!
//! The store reports everything through `tracing`; nothing is printed
//! directly. Host applications that do not install their own subscriber can
//! use the helper below.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,arbor_runtime=debug";

/// Initialize a simple stdout tracing subscriber for development.
///
/// # Panics
/// If a global subscriber has already been installed.
pub fn init_stdout_tracing() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Like [`init_stdout_tracing`], but a no-op when a subscriber is already set.
/// Convenient in tests, where many cases race to install one.
pub fn try_init_stdout_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_test_writer()
        .try_init()
        .is_ok()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        try_init_stdout_tracing();
        assert!(!try_init_stdout_tracing());
    }
}
