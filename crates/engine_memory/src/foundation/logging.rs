//! Logging utilities
//!
//! Library code logs through the `log` macros; binaries pick the backend.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize `env_logger` from `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize `env_logger` with `level` as the default filter.
///
/// `RUST_LOG` still takes precedence for the modules it names.
pub fn init_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}
