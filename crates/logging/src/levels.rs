//! crates/logging/src/levels.rs
//! Flag enums and level tables for info and debug verbosity.

/// Info flags for user-facing diagnostic categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InfoFlag {
    /// Deletion of extraneous destination entries.
    Del,
    /// File list reception.
    Flist,
    /// Miscellaneous progress of the receiver phases.
    Misc,
    /// Names of updated files.
    Name,
    /// Entries skipped because they are not regular files or directories.
    Nonreg,
    /// Per-file progress.
    Progress,
    /// Transfer statistics.
    Stats,
}

impl InfoFlag {
    /// Lower-case token used by `--info=FLAG[N]`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Del => "del",
            Self::Flist => "flist",
            Self::Misc => "misc",
            Self::Name => "name",
            Self::Nonreg => "nonreg",
            Self::Progress => "progress",
            Self::Stats => "stats",
        }
    }
}

/// Debug flags for developer-facing diagnostic categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DebugFlag {
    /// Deletion decisions.
    Del,
    /// File list decoding.
    Flist,
    /// Uploader (request generation) steps.
    Genr,
    /// Event loop and descriptor readiness.
    Io,
    /// Phase and sentinel exchanges.
    Proto,
    /// Downloader and directory finalization steps.
    Recv,
    /// Timestamp updates.
    Time,
}

impl DebugFlag {
    /// Lower-case token used by `--debug=FLAG[N]`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Del => "del",
            Self::Flist => "flist",
            Self::Genr => "genr",
            Self::Io => "io",
            Self::Proto => "proto",
            Self::Recv => "recv",
            Self::Time => "time",
        }
    }
}

/// Info verbosity levels for each flag.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InfoLevels {
    /// Deletion level.
    pub del: u8,
    /// File list level.
    pub flist: u8,
    /// Miscellaneous level.
    pub misc: u8,
    /// File name level.
    pub name: u8,
    /// Non-regular file level.
    pub nonreg: u8,
    /// Progress level.
    pub progress: u8,
    /// Statistics level.
    pub stats: u8,
}

impl InfoLevels {
    /// Get the level for a specific flag.
    pub const fn get(&self, flag: InfoFlag) -> u8 {
        match flag {
            InfoFlag::Del => self.del,
            InfoFlag::Flist => self.flist,
            InfoFlag::Misc => self.misc,
            InfoFlag::Name => self.name,
            InfoFlag::Nonreg => self.nonreg,
            InfoFlag::Progress => self.progress,
            InfoFlag::Stats => self.stats,
        }
    }

    /// Set the level for a specific flag.
    pub fn set(&mut self, flag: InfoFlag, level: u8) {
        match flag {
            InfoFlag::Del => self.del = level,
            InfoFlag::Flist => self.flist = level,
            InfoFlag::Misc => self.misc = level,
            InfoFlag::Name => self.name = level,
            InfoFlag::Nonreg => self.nonreg = level,
            InfoFlag::Progress => self.progress = level,
            InfoFlag::Stats => self.stats = level,
        }
    }

    /// Set all flags to the specified level.
    pub fn set_all(&mut self, level: u8) {
        self.del = level;
        self.flist = level;
        self.misc = level;
        self.name = level;
        self.nonreg = level;
        self.progress = level;
        self.stats = level;
    }
}

/// Debug verbosity levels for each flag.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DebugLevels {
    /// Deletion level.
    pub del: u8,
    /// File list level.
    pub flist: u8,
    /// Uploader level.
    pub genr: u8,
    /// Event loop level.
    pub io: u8,
    /// Protocol level.
    pub proto: u8,
    /// Downloader level.
    pub recv: u8,
    /// Timestamp level.
    pub time: u8,
}

impl DebugLevels {
    /// Get the level for a specific flag.
    pub const fn get(&self, flag: DebugFlag) -> u8 {
        match flag {
            DebugFlag::Del => self.del,
            DebugFlag::Flist => self.flist,
            DebugFlag::Genr => self.genr,
            DebugFlag::Io => self.io,
            DebugFlag::Proto => self.proto,
            DebugFlag::Recv => self.recv,
            DebugFlag::Time => self.time,
        }
    }

    /// Set the level for a specific flag.
    pub fn set(&mut self, flag: DebugFlag, level: u8) {
        match flag {
            DebugFlag::Del => self.del = level,
            DebugFlag::Flist => self.flist = level,
            DebugFlag::Genr => self.genr = level,
            DebugFlag::Io => self.io = level,
            DebugFlag::Proto => self.proto = level,
            DebugFlag::Recv => self.recv = level,
            DebugFlag::Time => self.time = level,
        }
    }

    /// Set all flags to the specified level.
    pub fn set_all(&mut self, level: u8) {
        self.del = level;
        self.flist = level;
        self.genr = level;
        self.io = level;
        self.proto = level;
        self.recv = level;
        self.time = level;
    }
}
