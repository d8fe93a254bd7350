//! Options that shape a receiver run.

use logging::VerbosityConfig;

/// Strong-checksum length requested from the sender.
///
/// Only [`ChecksumLength::Phase1`] is used by the run itself. `Full` exists
/// for roles that re-request out-of-sync files at full strength.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ChecksumLength {
    /// Short checksums for the first pass.
    #[default]
    Phase1,
    /// Full-length checksums.
    Full,
}

impl ChecksumLength {
    /// Number of checksum bytes sent on the wire.
    pub const fn bytes(self) -> i32 {
        match self {
            Self::Phase1 => 2,
            Self::Full => 16,
        }
    }
}

/// Configuration supplied to [`Receiver`](crate::Receiver).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReceiverConfig {
    /// This endpoint is the passive (server) side.
    pub server: bool,
    /// Directories in the list are created and finalized.
    pub recursive: bool,
    /// Remove local entries that are absent from the remote list.
    pub delete: bool,
    /// Report what would change without touching the destination. The
    /// protocol handshake still runs.
    pub dry_run: bool,
    /// Apply remote modification times.
    pub preserve_times: bool,
    /// Apply remote permission bits.
    pub preserve_perms: bool,
    /// Inbound data is wrapped in multiplexed envelopes.
    pub multiplexed_reads: bool,
    /// Checksum strength used for block requests.
    pub checksum_length: ChecksumLength,
    /// `-v` count.
    pub verbosity: u8,
}

impl ReceiverConfig {
    /// Sets [`server`](Self::server).
    #[must_use]
    pub const fn with_server(mut self, server: bool) -> Self {
        self.server = server;
        self
    }

    /// Sets [`recursive`](Self::recursive).
    #[must_use]
    pub const fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Sets [`delete`](Self::delete).
    #[must_use]
    pub const fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// Sets [`dry_run`](Self::dry_run).
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets [`preserve_times`](Self::preserve_times).
    #[must_use]
    pub const fn with_preserve_times(mut self, preserve: bool) -> Self {
        self.preserve_times = preserve;
        self
    }

    /// Sets [`preserve_perms`](Self::preserve_perms).
    #[must_use]
    pub const fn with_preserve_perms(mut self, preserve: bool) -> Self {
        self.preserve_perms = preserve;
        self
    }

    /// Sets [`multiplexed_reads`](Self::multiplexed_reads).
    #[must_use]
    pub const fn with_multiplexed_reads(mut self, multiplexed: bool) -> Self {
        self.multiplexed_reads = multiplexed;
        self
    }

    /// Sets [`checksum_length`](Self::checksum_length).
    #[must_use]
    pub const fn with_checksum_length(mut self, length: ChecksumLength) -> Self {
        self.checksum_length = length;
        self
    }

    /// Sets [`verbosity`](Self::verbosity).
    #[must_use]
    pub const fn with_verbosity(mut self, level: u8) -> Self {
        self.verbosity = level;
        self
    }

    /// Deletion runs only for recursive transfers.
    pub const fn deletion_enabled(&self) -> bool {
        self.delete && self.recursive
    }

    /// Verbosity flags derived from the `-v` count.
    pub fn verbosity_config(&self) -> VerbosityConfig {
        VerbosityConfig::from_verbose_level(self.verbosity)
    }
}
