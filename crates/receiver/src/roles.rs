//! Contracts between the orchestrator and the two cooperating roles.
//!
//! The orchestrator owns every piece of shared state: the file list, the
//! [`NewDirFlags`] array, the [`UploadCursor`], the [`SecondaryDescriptor`] and
//! the downloader's continuation. Each role exposes a single `advance`
//! operation that borrows what it needs for one step. A role returning `Err`
//! aborts the run; the orchestrator does not inspect the cause.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use protocol::FileEntry;

use crate::config::ChecksumLength;

/// Position of the uploader within the file list.
///
/// The cursor visits every index in `0..len` followed by one final step at
/// which the uploader emits its end-of-requests marker. It is exhausted once
/// that last step has been taken.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UploadCursor {
    next: usize,
    len: usize,
}

/// What the uploader should do at the current cursor position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UploadStep {
    /// Examine the file list entry at this index.
    Entry(usize),
    /// Every entry has been offered; announce the end of requests.
    EndOfList,
}

impl UploadCursor {
    /// Creates a cursor over a list of `len` entries.
    pub const fn new(len: usize) -> Self {
        Self { next: 0, len }
    }

    /// Step to perform next, or `None` once exhausted.
    pub const fn current(&self) -> Option<UploadStep> {
        if self.next < self.len {
            Some(UploadStep::Entry(self.next))
        } else if self.next == self.len {
            Some(UploadStep::EndOfList)
        } else {
            None
        }
    }

    /// Moves past the current step.
    pub fn advance(&mut self) {
        if self.next <= self.len {
            self.next += 1;
        }
    }

    /// Returns `true` once every step has been taken.
    pub const fn is_exhausted(&self) -> bool {
        self.next > self.len
    }

    /// Number of entries offered so far.
    pub const fn offered(&self) -> usize {
        if self.next < self.len {
            self.next
        } else {
            self.len
        }
    }
}

/// One flag per file list entry, set when the uploader created that directory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NewDirFlags {
    flags: Vec<bool>,
}

impl NewDirFlags {
    /// All-false flags for a list of `len` entries.
    pub fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
        }
    }

    /// Records that the directory at `index` did not exist before this run.
    ///
    /// Out-of-range indices are ignored.
    pub fn mark(&mut self, index: usize) {
        if let Some(flag) = self.flags.get_mut(index) {
            *flag = true;
        }
    }

    /// Returns `true` when the directory at `index` was created by this run.
    pub fn is_new(&self, index: usize) -> bool {
        self.flags.get(index).copied().unwrap_or(false)
    }

    /// Number of directories marked new.
    pub fn count(&self) -> usize {
        self.flags.iter().filter(|flag| **flag).count()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns `true` for an empty list.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Optional second descriptor the uploader waits on.
///
/// At most one descriptor is armed at a time. It is polled for read-readiness
/// alongside the connection and the uploader is invoked again when it fires.
#[derive(Debug, Default)]
pub struct SecondaryDescriptor {
    fd: Option<OwnedFd>,
}

impl SecondaryDescriptor {
    /// Arms `fd`. Fails with `ResourceBusy` when a descriptor is already armed.
    pub fn arm(&mut self, fd: OwnedFd) -> io::Result<()> {
        if self.fd.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::ResourceBusy,
                "secondary descriptor already armed",
            ));
        }
        self.fd = Some(fd);
        Ok(())
    }

    /// Disarms and returns the descriptor, if any.
    pub fn disarm(&mut self) -> Option<OwnedFd> {
        self.fd.take()
    }

    /// Returns `true` while a descriptor is armed.
    pub const fn is_armed(&self) -> bool {
        self.fd.is_some()
    }

    /// Borrows the armed descriptor for polling.
    pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        self.fd.as_ref().map(AsFd::as_fd)
    }
}

/// Everything the uploader may touch during one step.
pub struct UploadContext<'a> {
    /// Destination root directory; `None` during a dry run, which never
    /// opens it.
    pub root: Option<BorrowedFd<'a>>,
    /// Position in the file list.
    pub cursor: &'a mut UploadCursor,
    /// Descriptor to arm when the uploader must wait.
    pub secondary: &'a mut SecondaryDescriptor,
    /// The agreed file list.
    pub files: &'a [FileEntry],
    /// Checksum strength for requests.
    pub checksum_length: ChecksumLength,
    /// Permission mask in effect before the run cleared it.
    pub umask: u32,
    /// Directories created by this run.
    pub new_dirs: &'a mut NewDirFlags,
    /// Connection to the peer.
    pub outbound: &'a mut dyn Write,
}

/// Requests data for files that are missing or out of date.
pub trait Uploader {
    /// Performs one step.
    ///
    /// Called while the cursor is not exhausted, or when the armed secondary
    /// descriptor became readable.
    fn advance(&mut self, ctx: UploadContext<'_>) -> io::Result<()>;
}

/// Outcome of one downloader step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DownloadStatus {
    /// Some file content was consumed or committed.
    Progress,
    /// Every file of the phase has been received.
    PhaseComplete,
}

/// Everything the downloader may touch during one step.
pub struct DownloadContext<'a> {
    /// Destination root directory; `None` during a dry run.
    pub root: Option<BorrowedFd<'a>>,
    /// Connection to the peer, with multiplexing already stripped.
    pub inbound: &'a mut dyn Read,
    /// The agreed file list.
    pub files: &'a [FileEntry],
    /// Permission mask in effect before the run cleared it.
    pub umask: u32,
}

/// Receives and commits file content.
pub trait Downloader {
    /// Saved progress for a file that spans several steps.
    type Continuation;

    /// Performs one step. Only called when inbound data is available.
    ///
    /// `continuation` is owned by the orchestrator; the downloader creates,
    /// updates and clears it.
    fn advance(
        &mut self,
        ctx: DownloadContext<'_>,
        continuation: &mut Option<Self::Continuation>,
    ) -> io::Result<DownloadStatus>;
}
