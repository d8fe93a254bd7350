#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` provides the verbosity flag system used by the receiver. Every
//! diagnostic belongs to an info category ([`InfoFlag`]) or a debug category
//! ([`DebugFlag`]) and carries a level; it is emitted only when the current
//! thread's [`VerbosityConfig`] enables that category at that level or above.
//!
//! # Design
//!
//! - [`VerbosityConfig::from_verbose_level`] maps a `-v` count to per-flag
//!   levels; [`VerbosityConfig::apply_info_flag`] and
//!   [`VerbosityConfig::apply_debug_flag`] refine it from `FLAG[N]` tokens.
//! - The configuration lives in thread-local storage ([`init`]). Emitted
//!   diagnostics are collected as [`DiagnosticEvent`] values that callers
//!   (and tests) retrieve with [`drain_events`].
//! - [`info_log!`], [`debug_log!`] and [`warn_log!`] are the only entry points
//!   used by the rest of the workspace.
//! - With the `tracing` feature every event is also forwarded to `tracing`,
//!   and [`init_tracing`] installs a stderr subscriber whose filter follows
//!   the verbosity configuration.
//!
//! # Examples
//!
//! ```
//! use logging::{VerbosityConfig, debug_log, drain_events, init};
//!
//! init(VerbosityConfig::from_verbose_level(3));
//! debug_log!(Recv, 1, "{}: updated mode: {:o}", "sub", 0o755);
//! debug_log!(Recv, 4, "suppressed");
//!
//! let events = drain_events();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].message(), "sub: updated mode: 755");
//! ```

mod config;
mod levels;
mod macros;
mod thread_local;
#[cfg(feature = "tracing")]
mod tracing_bridge;

pub use config::VerbosityConfig;
pub use levels::{DebugFlag, DebugLevels, InfoFlag, InfoLevels};
pub use thread_local::{
    DiagnosticEvent, apply_debug_flag, apply_info_flag, current, debug_gte, drain_events,
    emit_debug, emit_info, emit_warning, info_gte, init,
};
#[cfg(feature = "tracing")]
pub use tracing_bridge::{env_filter_for, init_tracing, level_filter_for};
