//! Error categories for a receiver run.
//!
//! Every failure is fatal for the run. The categories only tell the caller
//! where the failure came from; each variant carries the step that failed so
//! the message identifies it without a backtrace.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Which of the two cooperating roles reported a failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// The side that requests data for out-of-date files.
    Uploader,
    /// The side that commits received file content.
    Downloader,
}

impl Role {
    /// Lower-case role name used in messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uploader => "uploader",
            Self::Downloader => "downloader",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fatal conditions that abort a receiver run.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// The peer violated the protocol: a bad sentinel or integrity value, an
    /// unexpected phase signal, or a descriptor hang-up.
    #[error("protocol error during {step}: {message}")]
    Protocol {
        /// Step that detected the violation.
        step: &'static str,
        /// Description of what was received.
        message: String,
    },

    /// Reading from or writing to the connection failed.
    #[error("transport error during {step}: {source}")]
    Transport {
        /// Step that performed the I/O.
        step: &'static str,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A filesystem operation on the destination failed.
    #[error("filesystem error during {step} on {}: {source}", path.display())]
    Filesystem {
        /// Step that touched the filesystem.
        step: &'static str,
        /// Path the operation targeted.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// One of the roles reported failure. The cause is passed through as-is.
    #[error("{role} failed: {source}")]
    Role {
        /// Role that failed.
        role: Role,
        /// The error the role returned.
        #[source]
        source: io::Error,
    },
}

impl ReceiverError {
    /// Builds a [`ReceiverError::Protocol`].
    pub fn protocol(step: &'static str, message: impl Into<String>) -> Self {
        Self::Protocol {
            step,
            message: message.into(),
        }
    }

    /// Wraps a transport failure.
    ///
    /// Malformed input surfaces from the wire helpers as `InvalidData`; such
    /// errors are reclassified as protocol violations.
    pub fn transport(step: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::InvalidData {
            return Self::protocol(step, source.to_string());
        }
        Self::Transport { step, source }
    }

    /// Wraps a filesystem failure on `path`.
    pub fn filesystem(step: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            step,
            path: path.into(),
            source,
        }
    }

    /// Wraps a role failure.
    pub const fn role(role: Role, source: io::Error) -> Self {
        Self::Role { role, source }
    }

    /// Returns `true` for protocol violations.
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` for transport failures.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` for filesystem failures.
    pub const fn is_filesystem(&self) -> bool {
        matches!(self, Self::Filesystem { .. })
    }

    /// Returns the failing role, if a role failed.
    pub const fn failed_role(&self) -> Option<Role> {
        match self {
            Self::Role { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Step recorded for this failure. Role failures report the role name.
    pub const fn step(&self) -> &'static str {
        match self {
            Self::Protocol { step, .. }
            | Self::Transport { step, .. }
            | Self::Filesystem { step, .. } => step,
            Self::Role { role, .. } => role.name(),
        }
    }
}

/// Result alias for receiver operations.
pub type ReceiverResult<T> = Result<T, ReceiverError>;
