//! Removal of local entries absent from the remote file list.

use std::collections::HashSet;
use std::io;
use std::os::fd::BorrowedFd;
use std::path::{Component, Path, PathBuf};

use logging::{debug_log, info_log};
use protocol::FileEntry;
use rustix::fs::{AtFlags, unlinkat};

use crate::beneath::parent_beneath;
use crate::error::{ReceiverError, ReceiverResult};
use crate::scan::LocalEntry;

/// What a deletion pass removed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeleteSummary {
    /// Non-directory entries removed.
    pub files: usize,
    /// Directories removed.
    pub directories: usize,
}

impl DeleteSummary {
    /// Total entries removed.
    pub const fn total(&self) -> usize {
        self.files + self.directories
    }

    fn count(&mut self, entry: &LocalEntry) {
        if entry.is_dir {
            self.directories += 1;
        } else {
            self.files += 1;
        }
    }
}

/// Reconciles the local tree against the authoritative list.
pub trait DeletionReconciler {
    /// Removes local entries that the remote list does not name.
    ///
    /// `local` is in scan order (parents before children); paths are
    /// relative to `root`.
    fn reconcile(
        &mut self,
        root: BorrowedFd<'_>,
        local: &[LocalEntry],
        remote: &[FileEntry],
    ) -> ReceiverResult<DeleteSummary>;
}

/// Deletes extraneous entries, children before their parents.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtraneousDeleter;

/// Drops `.` components so `./a` and `a` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Local entries the remote list does not name, children before parents.
///
/// `local` is in scan order; returned paths have `.` components removed.
pub fn extraneous_entries(local: &[LocalEntry], remote: &[FileEntry]) -> Vec<LocalEntry> {
    let keep: HashSet<PathBuf> = remote.iter().map(|entry| normalize(entry.path())).collect();
    local
        .iter()
        .rev()
        .map(|entry| LocalEntry {
            path: normalize(&entry.path),
            is_dir: entry.is_dir,
        })
        .filter(|entry| !keep.contains(&entry.path))
        .collect()
}

/// Logs and counts what a deletion pass would remove, touching nothing.
pub fn plan_deletions(local: &[LocalEntry], remote: &[FileEntry]) -> DeleteSummary {
    let mut summary = DeleteSummary::default();
    for entry in extraneous_entries(local, remote) {
        info_log!(Del, 1, "deleting {}", entry.path.display());
        summary.count(&entry);
    }
    summary
}

fn remove(root: BorrowedFd<'_>, entry: &LocalEntry) -> io::Result<()> {
    let flags = if entry.is_dir {
        AtFlags::REMOVEDIR
    } else {
        AtFlags::empty()
    };
    let (parent, name) = parent_beneath(root, &entry.path)?;
    unlinkat(&parent, &name, flags).map_err(io::Error::from)
}

impl DeletionReconciler for ExtraneousDeleter {
    fn reconcile(
        &mut self,
        root: BorrowedFd<'_>,
        local: &[LocalEntry],
        remote: &[FileEntry],
    ) -> ReceiverResult<DeleteSummary> {
        let mut summary = DeleteSummary::default();

        for entry in extraneous_entries(local, remote) {
            remove(root, &entry)
                .map_err(|err| ReceiverError::filesystem("delete", &entry.path, err))?;
            info_log!(Del, 1, "deleting {}", entry.path.display());
            summary.count(&entry);
        }

        debug_log!(
            Del,
            1,
            "removed {} files and {} directories",
            summary.files,
            summary.directories
        );
        Ok(summary)
    }
}
