//! crates/logging/src/tracing_bridge.rs
//! Bridge between the verbosity system and the `tracing` ecosystem.
//!
//! With the `tracing` feature enabled every diagnostic emitted through
//! [`info_log!`](crate::info_log), [`debug_log!`](crate::debug_log) and
//! [`warn_log!`](crate::warn_log) is also forwarded as a `tracing` event with
//! target `receiver` and a `flag` field naming the category. This module
//! installs a formatting subscriber whose filter follows the verbosity
//! configuration, so `-vv` produces the same lines on stderr that tests
//! observe through [`drain_events`](crate::drain_events).

use super::config::VerbosityConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Maps the configured verbosity to the coarsest `tracing` level that still
/// lets every enabled diagnostic through.
pub fn level_filter_for(config: &VerbosityConfig) -> LevelFilter {
    match config.max_level() {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

/// Builds the filter used by [`init_tracing`].
///
/// `RUST_LOG` directives take precedence over the verbosity-derived default.
pub fn env_filter_for(config: &VerbosityConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level_filter_for(config).into())
        .from_env_lossy()
}

/// Initialize tracing output on stderr for the given verbosity.
///
/// Also installs `config` as the calling thread's verbosity configuration.
/// Returns an error when a global subscriber is already installed.
pub fn init_tracing(
    config: VerbosityConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = env_filter_for(&config);
    super::thread_local::init(config);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}
