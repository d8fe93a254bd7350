//! crates/logging/src/macros.rs
//! Level-gated diagnostic macros.

/// Emit an info diagnostic when the flag is configured at or above `level`.
///
/// ```
/// use logging::{InfoFlag, VerbosityConfig, drain_events, info_log, init};
///
/// let mut config = VerbosityConfig::default();
/// config.info.flist = 1;
/// init(config);
///
/// info_log!(Flist, 1, "Transfer starting: {} files", 3);
/// assert_eq!(drain_events()[0].message(), "Transfer starting: 3 files");
/// ```
#[macro_export]
macro_rules! info_log {
    ($flag:ident, $level:expr, $($arg:tt)*) => {{
        let level: u8 = $level;
        if $crate::info_gte($crate::InfoFlag::$flag, level) {
            $crate::emit_info($crate::InfoFlag::$flag, level, format!($($arg)*));
        }
    }};
}

/// Emit a debug diagnostic when the flag is configured at or above `level`.
#[macro_export]
macro_rules! debug_log {
    ($flag:ident, $level:expr, $($arg:tt)*) => {{
        let level: u8 = $level;
        if $crate::debug_gte($crate::DebugFlag::$flag, level) {
            $crate::emit_debug($crate::DebugFlag::$flag, level, format!($($arg)*));
        }
    }};
}

/// Emit a warning. Warnings are never suppressed by verbosity.
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {{
        $crate::emit_warning(format!($($arg)*));
    }};
}
