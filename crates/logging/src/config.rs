//! crates/logging/src/config.rs
//! Verbosity configuration combining info and debug levels.

use super::levels::{DebugFlag, DebugLevels, InfoFlag, InfoLevels};

/// Combined verbosity configuration for info and debug flags.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VerbosityConfig {
    /// Info flag levels.
    pub info: InfoLevels,
    /// Debug flag levels.
    pub debug: DebugLevels,
}

impl VerbosityConfig {
    /// Create a new configuration from a `-v` count.
    ///
    /// Level 1 enables the user-facing summary lines, level 2 adds the phase
    /// progress lines and deletion/flist debugging, level 3 and above open up
    /// the per-role debugging categories.
    pub fn from_verbose_level(level: u8) -> Self {
        let mut config = Self::default();
        config.info.nonreg = 1;

        if level >= 1 {
            config.info.del = 1;
            config.info.flist = 1;
            config.info.misc = 1;
            config.info.name = 1;
            config.info.stats = 1;
        }
        if level >= 2 {
            config.info.misc = 2;
            config.info.name = 2;
            config.debug.del = 1;
            config.debug.flist = 1;
        }
        if level >= 3 {
            config.debug.del = 2;
            config.debug.flist = 2;
            config.debug.genr = 1;
            config.debug.recv = 1;
            config.debug.time = 1;
            config.debug.proto = 1;
        }
        if level >= 4 {
            config.debug.genr = 2;
            config.debug.recv = 2;
            config.debug.time = 2;
            config.debug.proto = 2;
            config.debug.io = 1;
        }
        if level >= 5 {
            config.debug.set_all(4);
        }

        config
    }

    /// Apply a single info flag token (e.g., "del", "misc2").
    pub fn apply_info_flag(&mut self, token: &str) -> Result<(), String> {
        let (name, level) = parse_flag_token(token)?;

        let flag = match name {
            "del" => InfoFlag::Del,
            "flist" => InfoFlag::Flist,
            "misc" => InfoFlag::Misc,
            "name" => InfoFlag::Name,
            "nonreg" => InfoFlag::Nonreg,
            "progress" => InfoFlag::Progress,
            "stats" => InfoFlag::Stats,
            _ => return Err(format!("unknown info flag: {name}")),
        };

        self.info.set(flag, level);
        Ok(())
    }

    /// Apply a single debug flag token (e.g., "recv2", "io").
    pub fn apply_debug_flag(&mut self, token: &str) -> Result<(), String> {
        let (name, level) = parse_flag_token(token)?;

        let flag = match name {
            "del" => DebugFlag::Del,
            "flist" => DebugFlag::Flist,
            "genr" => DebugFlag::Genr,
            "io" => DebugFlag::Io,
            "proto" => DebugFlag::Proto,
            "recv" => DebugFlag::Recv,
            "time" => DebugFlag::Time,
            _ => return Err(format!("unknown debug flag: {name}")),
        };

        self.debug.set(flag, level);
        Ok(())
    }

    /// Highest info level configured, counting any enabled debug flag as 2.
    ///
    /// Used to pick the `tracing` filter when the bridge is installed.
    pub fn max_level(&self) -> u8 {
        let info = [
            self.info.del,
            self.info.flist,
            self.info.misc,
            self.info.name,
            self.info.progress,
            self.info.stats,
        ];
        let debug = [
            self.debug.del,
            self.debug.flist,
            self.debug.genr,
            self.debug.io,
            self.debug.proto,
            self.debug.recv,
            self.debug.time,
        ];
        let info_max = info.into_iter().max().unwrap_or(0);
        let debug_max = debug.into_iter().max().unwrap_or(0);
        if debug_max > 0 {
            info_max.max(2)
        } else {
            info_max
        }
    }
}

/// Parse a flag token like "misc2" into ("misc", 2) or "del" into ("del", 1).
fn parse_flag_token(token: &str) -> Result<(&str, u8), String> {
    if token.is_empty() {
        return Err("empty flag token".to_string());
    }

    match token.find(|c: char| c.is_ascii_digit()) {
        Some(0) => Err(format!("missing flag name in: {token}")),
        Some(pos) => {
            let level = token[pos..]
                .parse::<u8>()
                .map_err(|_| format!("invalid level in flag: {token}"))?;
            Ok((&token[..pos], level))
        }
        None => Ok((token, 1)),
    }
}
