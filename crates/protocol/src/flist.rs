//! crates/protocol/src/flist.rs
//!
//! File list entries and their framed wire encoding.
//!
//! The list is a sequence of entries terminated by a zero name length:
//!
//! ```text
//! name_len : int   (> 0)
//! name     : name_len bytes, relative to the transfer root
//! mode     : int   (type and permission bits)
//! mtime    : longint (seconds since the epoch)
//! size     : longint
//! ...
//! 0        : int   (end of list)
//! ```
//!
//! Names are sanitized on decode. A sender may not name anything outside the
//! destination root, so absolute names, `..` components and empty names are
//! refused. The lone name `.` denotes the root itself.

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use logging::debug_log;
use thiserror::Error;

use crate::wire::{read_int, read_long, read_size, write_int, write_long};

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const S_IFLNK: u32 = 0o120_000;

/// Longest accepted entry name in bytes.
pub const MAX_NAME_LEN: usize = 4096;

/// A single file list entry as announced by the sender.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    path: PathBuf,
    mode: u32,
    mtime: i64,
    size: u64,
}

impl FileEntry {
    /// Creates an entry. `path` is taken as-is; only decoding sanitizes.
    pub fn new(path: impl Into<PathBuf>, mode: u32, mtime: i64, size: u64) -> Self {
        Self {
            path: path.into(),
            mode,
            mtime,
            size,
        }
    }

    /// Convenience constructor for a regular file with the given permissions.
    pub fn file(path: impl Into<PathBuf>, perms: u32, mtime: i64, size: u64) -> Self {
        Self::new(path, S_IFREG | (perms & 0o7777), mtime, size)
    }

    /// Convenience constructor for a directory with the given permissions.
    pub fn directory(path: impl Into<PathBuf>, perms: u32, mtime: i64) -> Self {
        Self::new(path, S_IFDIR | (perms & 0o7777), mtime, 0)
    }

    /// Path relative to the transfer root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full mode word including the file type bits.
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Permission bits only.
    pub const fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Modification time in seconds.
    pub const fn mtime(&self) -> i64 {
        self.mtime
    }

    /// Size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns `true` for directories.
    pub const fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Returns `true` for regular files.
    pub const fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Returns `true` for symbolic links.
    pub const fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Returns `true` when the entry names the transfer root itself.
    pub fn is_root(&self) -> bool {
        self.path.as_os_str() == "."
    }
}

/// Reasons a received name is refused.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FileListError {
    /// The entry announced a negative name length.
    #[error("invalid file name length {0}")]
    BadNameLength(i32),
    /// The name exceeded [`MAX_NAME_LEN`].
    #[error("file name length {0} exceeds maximum {MAX_NAME_LEN}")]
    NameTooLong(usize),
    /// The name is absolute.
    #[error("refusing absolute path {0:?}")]
    Absolute(PathBuf),
    /// The name contains a `..` component.
    #[error("refusing path with parent directory component {0:?}")]
    ParentComponent(PathBuf),
    /// The name has no usable components or contains a NUL byte.
    #[error("refusing malformed path {0:?}")]
    Malformed(PathBuf),
}

impl From<FileListError> for io::Error {
    fn from(err: FileListError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Checks that `path` stays inside the transfer root.
pub fn sanitize_path(path: &Path) -> Result<(), FileListError> {
    if path.as_os_str().as_bytes().contains(&0) {
        return Err(FileListError::Malformed(path.to_path_buf()));
    }
    if path.has_root() {
        return Err(FileListError::Absolute(path.to_path_buf()));
    }
    if path.as_os_str() == "." {
        return Ok(());
    }

    let mut normal = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(FileListError::ParentComponent(path.to_path_buf()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(FileListError::Absolute(path.to_path_buf()));
            }
        }
    }
    if normal == 0 {
        return Err(FileListError::Malformed(path.to_path_buf()));
    }
    Ok(())
}

/// Reads a complete file list.
pub fn read_file_list<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    loop {
        let len = read_int(reader)?;
        if len == 0 {
            break;
        }
        let len = usize::try_from(len).map_err(|_| FileListError::BadNameLength(len))?;
        if len > MAX_NAME_LEN {
            return Err(FileListError::NameTooLong(len).into());
        }

        let mut name = vec![0u8; len];
        reader.read_exact(&mut name)?;
        let path = PathBuf::from(OsStr::from_bytes(&name));
        sanitize_path(&path)?;

        let mode = read_int(reader)? as u32;
        let mtime = read_long(reader)?;
        let size = read_size(reader, "file size")?;

        debug_log!(
            Flist,
            2,
            "[{}] {} mode={:o} size={} mtime={}",
            entries.len(),
            path.display(),
            mode,
            size,
            mtime
        );
        entries.push(FileEntry::new(path, mode, mtime, size));
    }

    debug_log!(Flist, 1, "received file list with {} entries", entries.len());
    Ok(entries)
}

/// Writes a complete file list including the terminator.
pub fn write_file_list<W: Write + ?Sized>(writer: &mut W, entries: &[FileEntry]) -> io::Result<()> {
    for entry in entries {
        let name = entry.path().as_os_str().as_bytes();
        let len = i32::try_from(name.len())
            .ok()
            .filter(|&len| len > 0)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cannot encode file name of length {}", name.len()),
                )
            })?;
        write_int(writer, len)?;
        writer.write_all(name)?;
        write_int(writer, entry.mode() as i32)?;
        write_long(writer, entry.mtime())?;
        write_long(writer, entry.size() as i64)?;
    }
    write_int(writer, 0)
}
