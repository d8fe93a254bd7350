//! Steps that prepare the destination before the event loop.

use std::fs::DirBuilder;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::path::Path;

use protocol::write_int;
use rustix::fs::{Mode, OFlags, open};
use rustix::process::umask;

/// Sends the empty filter list a client owes the peer before the file list.
pub fn write_filter_preamble<W: Write + ?Sized>(outbound: &mut W) -> io::Result<()> {
    write_int(outbound, 0)?;
    outbound.flush()
}

/// Creates `root` and any missing parents with the current umask.
pub fn make_path(root: &Path) -> io::Result<()> {
    DirBuilder::new().recursive(true).create(root)
}

/// Opens `root` as a directory descriptor for relative operations.
pub fn open_root(root: &Path) -> io::Result<OwnedFd> {
    open(
        root,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(io::Error::from)
}

/// Clears the process umask and restores it on drop.
#[derive(Debug)]
pub struct UmaskGuard {
    previous: Mode,
}

impl UmaskGuard {
    /// Sets the umask to zero, remembering the previous value.
    pub fn clear() -> Self {
        Self {
            previous: umask(Mode::empty()),
        }
    }

    /// The mask that was in effect before [`clear`](Self::clear).
    pub fn previous(&self) -> u32 {
        self.previous.as_raw_mode() as u32
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        umask(self.previous);
    }
}

/// Serializes tests that change the process umask, directly or through a
/// receiver run.
#[cfg(test)]
pub(crate) fn lock_umask() -> std::sync::MutexGuard<'static, ()> {
    static UMASK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    UMASK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
