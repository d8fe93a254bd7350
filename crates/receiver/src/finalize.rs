//! Directory metadata fixup after all content has been committed.
//!
//! Writing into a directory changes its modification time, and a directory
//! whose remote mode is not writable could not be filled once that mode is
//! applied. Directory times and modes are therefore applied in one pass after
//! the event loop has exited.

use std::io;
use std::os::fd::BorrowedFd;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use logging::debug_log;
use protocol::FileEntry;
use rustix::fs::{Mode, Timespec, Timestamps, fchmod, futimens};

use crate::beneath::open_dir_beneath;
use crate::config::ReceiverConfig;
use crate::error::{ReceiverError, ReceiverResult};
use crate::roles::NewDirFlags;

/// Sink for directory metadata updates.
pub trait DirectoryMetadata {
    /// Sets the access time to now and the modification time to `mtime`.
    fn set_times(&mut self, path: &Path, mtime: i64) -> io::Result<()>;

    /// Sets the permission bits.
    fn set_mode(&mut self, path: &Path, mode: u32) -> io::Result<()>;
}

/// Applies updates relative to the destination root descriptor.
///
/// Each directory is opened beneath the root without following symlinks and
/// updated through its own descriptor.
#[derive(Clone, Copy, Debug)]
pub struct RootMetadata<'a> {
    root: BorrowedFd<'a>,
}

impl<'a> RootMetadata<'a> {
    /// Wraps the destination root descriptor.
    pub const fn new(root: BorrowedFd<'a>) -> Self {
        Self { root }
    }
}

impl DirectoryMetadata for RootMetadata<'_> {
    fn set_times(&mut self, path: &Path, mtime: i64) -> io::Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as i64);
        let times = Timestamps {
            last_access: Timespec {
                tv_sec: now,
                tv_nsec: 0,
            },
            last_modification: Timespec {
                tv_sec: mtime,
                tv_nsec: 0,
            },
        };
        let dir = open_dir_beneath(self.root, path)?;
        futimens(&dir, &times).map_err(io::Error::from)
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> io::Result<()> {
        let dir = open_dir_beneath(self.root, path)?;
        fchmod(&dir, Mode::from_raw_mode(mode as _)).map_err(io::Error::from)
    }
}

/// Which fixups the finalizer performs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FinalizeOptions {
    /// Directories were created by this run at all.
    pub recursive: bool,
    /// Apply remote modification times.
    pub preserve_times: bool,
    /// Apply remote modes to pre-existing directories too.
    pub preserve_perms: bool,
}

impl From<&ReceiverConfig> for FinalizeOptions {
    fn from(config: &ReceiverConfig) -> Self {
        Self {
            recursive: config.recursive,
            preserve_times: config.preserve_times,
            preserve_perms: config.preserve_perms,
        }
    }
}

/// Counts of updates applied.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FinalizeSummary {
    /// Directories whose times were set.
    pub times: usize,
    /// Directories whose mode was set.
    pub modes: usize,
}

/// Fixes up every directory entry in list order.
///
/// A directory created by this run always has its mode set; a pre-existing
/// one only when permissions are preserved. Any failure aborts the pass.
pub fn finalize_directories<M: DirectoryMetadata>(
    metadata: &mut M,
    files: &[FileEntry],
    new_dirs: &NewDirFlags,
    options: FinalizeOptions,
) -> ReceiverResult<FinalizeSummary> {
    let mut summary = FinalizeSummary::default();
    if !options.recursive {
        return Ok(summary);
    }

    for (index, entry) in files.iter().enumerate() {
        if !entry.is_dir() {
            continue;
        }
        let path = entry.path();

        if options.preserve_times {
            metadata
                .set_times(path, entry.mtime())
                .map_err(|err| ReceiverError::filesystem("utimensat", path, err))?;
            debug_log!(Recv, 2, "{}: updated date", path.display());
            summary.times += 1;
        }

        if new_dirs.is_new(index) || options.preserve_perms {
            metadata
                .set_mode(path, entry.permissions())
                .map_err(|err| ReceiverError::filesystem("fchmodat", path, err))?;
            debug_log!(
                Recv,
                2,
                "{}: updated mode: {:o}",
                path.display(),
                entry.permissions()
            );
            summary.modes += 1;
        }
    }

    Ok(summary)
}
