//! Temporary files for incoming content.
//!
//! Content for `dir/name` is written to `dir/.name.XXXXXX`, created with
//! `O_EXCL` relative to a directory descriptor, and renamed over the
//! destination once complete. [`TempFileGuard`] unlinks the temporary file if
//! the transfer of that file never completes.

use std::fs::File;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};

use rustix::fs::{AtFlags, Mode, OFlags, openat, renameat, unlinkat};
use rustix::io::Errno;

/// Length of the random suffix including the leading dot: `.XXXXXX`.
const TMPNAME_SUFFIX_LEN: usize = 7;

/// Characters used for the random suffix.
const RAND_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Attempts before giving up on finding an unused name.
const MAX_OPEN_ATTEMPTS: u32 = 100;

/// Maximum length of one path component.
const NAME_MAX: usize = 255;

/// Builds the `.name.XXXXXX` template next to `dest`.
fn get_tmpname(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "receiver".to_owned());
    let name = file_name.strip_prefix('.').unwrap_or(&file_name);
    let temp_name = truncate_utf8_safe(&format!(".{name}.XXXXXX"), NAME_MAX);

    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(temp_name),
        _ => PathBuf::from(temp_name),
    }
}

/// Truncates `s` to `max_len` bytes on a character boundary, keeping the
/// `.XXXXXX` suffix.
fn truncate_utf8_safe(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_owned();
    }

    let (prefix, suffix) = s.split_at(s.len() - TMPNAME_SUFFIX_LEN);
    let mut end = (max_len - TMPNAME_SUFFIX_LEN).min(prefix.len());
    while end > 0 && !prefix.is_char_boundary(end) {
        end -= 1;
    }
    let trimmed = prefix[..end].trim_end_matches('.');
    format!("{trimmed}{suffix}")
}

/// Replaces the trailing `XXXXXX` of `template` with random characters.
fn fill_random_suffix(template: &Path) -> io::Result<PathBuf> {
    let mut random_bytes = [0u8; 6];
    getrandom::fill(&mut random_bytes)
        .map_err(|err| io::Error::other(format!("getrandom failed: {err}")))?;
    let suffix: String = random_bytes
        .iter()
        .map(|&b| RAND_CHARS[usize::from(b) % RAND_CHARS.len()] as char)
        .collect();

    let template = template.to_string_lossy();
    let prefix = &template[..template.len() - 6];
    Ok(PathBuf::from(format!("{prefix}{suffix}")))
}

/// Creates a temporary file for `dest`, both relative to `dir`.
///
/// Returns the open file and a guard that removes it unless
/// [`TempFileGuard::persist`] succeeds.
pub fn open_tmpfile(dir: BorrowedFd<'_>, dest: &Path) -> io::Result<(File, TempFileGuard)> {
    let template = get_tmpname(dest);

    for _ in 0..MAX_OPEN_ATTEMPTS {
        let candidate = fill_random_suffix(&template)?;
        match openat(
            dir,
            &candidate,
            OFlags::WRONLY | OFlags::CREATE | OFlags::EXCL | OFlags::NOFOLLOW | OFlags::CLOEXEC,
            Mode::from_raw_mode(0o600),
        ) {
            Ok(fd) => {
                let guard = TempFileGuard::new(dir.try_clone_to_owned()?, candidate);
                return Ok((File::from(fd), guard));
            }
            Err(Errno::EXIST) => continue,
            Err(errno) => return Err(io::Error::from(errno)),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "failed to create temp file after {MAX_OPEN_ATTEMPTS} attempts: {}",
            template.display()
        ),
    ))
}

/// Removes a temporary file on drop unless it was persisted.
#[derive(Debug)]
pub struct TempFileGuard {
    dir: OwnedFd,
    path: PathBuf,
    keep_on_drop: bool,
}

impl TempFileGuard {
    /// Guards `path`, relative to `dir`.
    pub const fn new(dir: OwnedFd, path: PathBuf) -> Self {
        Self {
            dir,
            path,
            keep_on_drop: false,
        }
    }

    /// Path of the temporary file relative to the directory descriptor.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the temporary file over `dest` and disarms the guard.
    pub fn persist(mut self, dest: &Path) -> io::Result<()> {
        renameat(&self.dir, &self.path, &self.dir, dest).map_err(io::Error::from)?;
        self.keep_on_drop = true;
        Ok(())
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.keep_on_drop {
            let _ = unlinkat(&self.dir, &self.path, AtFlags::empty());
        }
    }
}
