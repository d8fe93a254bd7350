#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! crates/receiver/src/lib.rs
//!
//! Destination-side receiver for a file synchronization protocol.
//!
//! A [`Receiver`] takes the file list the sender publishes, brings a local
//! destination directory in line with it, and walks the connection through
//! its phase handshake. Two roles share the connection:
//!
//! - the **uploader** ([`Uploader`]) walks the list, creates directories and
//!   asks the peer for every file that is missing or out of date;
//! - the **downloader** ([`Downloader`]) reads the peer's replies and commits
//!   each file atomically through a temporary file.
//!
//! Both are advanced from one readiness loop (see [`wait_ready`]), so a
//! blocked write never starves reads and the other way round. Directory
//! times and modes are fixed up only after every file has landed
//! ([`finalize_directories`]).
//!
//! # Setup order
//!
//! 1. Capabilities are restricted ([`Sandbox::restrict_capabilities`]).
//! 2. Clients send an empty filter list, then the file list and the sender's
//!    integrity value are read. A non-zero value aborts before anything on
//!    disk changes.
//! 3. The destination is created, the umask is cleared for the run and the
//!    root is opened as a directory descriptor.
//! 4. With deletion enabled, extraneous local entries are removed.
//! 5. The process is confined to the root ([`Sandbox::confine_to`]).
//!
//! Every path from the file list is resolved beneath the root descriptor one
//! component at a time without following symlinks, so a symlink in the
//! destination cannot redirect a write outside it.
//!
//! # Dry runs
//!
//! With [`ReceiverConfig::dry_run`] the destination is neither created nor
//! opened. Nothing is requested, deleted or finalized; entries that would be
//! transferred or deleted are only logged. The phase handshake runs as usual.
//!
//! # Errors
//!
//! Every failure is fatal and returned as a [`ReceiverError`] naming the
//! step that failed. Temporary files of an interrupted commit are removed.
//!
//! # Examples
//!
//! ```no_run
//! use std::os::unix::net::UnixStream;
//! use std::path::Path;
//!
//! use receiver::{Receiver, ReceiverConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = UnixStream::connect("/run/sync.sock")?;
//! let config = ReceiverConfig::default()
//!     .with_recursive(true)
//!     .with_preserve_times(true);
//!
//! let outcome = Receiver::new(config).run(Path::new("/srv/dest"), &stream, &stream)?;
//! println!("received {} entries", outcome.files);
//! # Ok(())
//! # }
//! ```

mod beneath;
mod config;
mod delete;
mod error;
mod finalize;
mod phase;
mod poll;
mod receiver;
mod roles;
mod sandbox;
mod scan;
mod setup;
mod temp_guard;
mod whole_file;

pub use config::{ChecksumLength, ReceiverConfig};
pub use delete::{
    DeleteSummary, DeletionReconciler, ExtraneousDeleter, extraneous_entries, plan_deletions,
};
pub use error::{ReceiverError, ReceiverResult, Role};
pub use finalize::{
    DirectoryMetadata, FinalizeOptions, FinalizeSummary, RootMetadata, finalize_directories,
};
pub use phase::{InvalidTransition, Phase, PhaseEvent};
pub use poll::{PollTimeout, Readiness, poll_timeout, wait_ready};
pub use receiver::{Receiver, ReceiverOutcome};
pub use roles::{
    DownloadContext, DownloadStatus, Downloader, NewDirFlags, SecondaryDescriptor, UploadContext,
    UploadCursor, UploadStep, Uploader,
};
pub use sandbox::{CapabilityMode, ProcessSandbox, Sandbox};
pub use scan::{LocalEntry, scan_destination};
pub use setup::{UmaskGuard, make_path, open_root, write_filter_preamble};
pub use temp_guard::{TempFileGuard, open_tmpfile};
pub use whole_file::{PendingFile, WholeFileDownloader, WholeFileUploader};
