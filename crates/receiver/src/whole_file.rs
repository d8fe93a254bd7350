//! Role pair that transfers whole files without a basis.
//!
//! Requests carry an empty block list, so the sender answers every request
//! with literal data only. On the wire:
//!
//! ```text
//! request  (uploader → peer) : index, count=0, blength=0, csum_len, remainder=0
//! end of requests            : NDX_DONE
//! reply    (peer → downloader): index, echoed sum head (4 ints),
//!                               { len > 0, len bytes }*, 0
//! end of phase               : NDX_DONE
//! ```

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use logging::{debug_log, info_log};
use protocol::{FileEntry, NDX_DONE, read_int, write_int};
use rustix::fs::{
    AtFlags, FileType, Mode, Timespec, Timestamps, fchmod, futimens, mkdirat, statat,
};
use rustix::io::Errno;

use crate::beneath::parent_beneath;
use crate::config::ReceiverConfig;
use crate::roles::{
    DownloadContext, DownloadStatus, Downloader, UploadContext, UploadStep, Uploader,
};
use crate::temp_guard::{TempFileGuard, open_tmpfile};

/// Size of the sum head that precedes each file's data.
const SUM_HEAD_INTS: usize = 4;

/// Largest literal token accepted from the peer.
const MAX_TOKEN_LEN: i32 = 1 << 24;

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Local state of a destination path.
enum LocalState {
    Missing,
    Directory,
    Regular { size: u64, mtime: i64 },
    Other,
}

fn destination(root: Option<BorrowedFd<'_>>) -> io::Result<BorrowedFd<'_>> {
    root.ok_or_else(|| io::Error::other("destination root is not open"))
}

/// Resolves the parent of `path` under `root`, naming `path` on failure.
fn resolve(root: BorrowedFd<'_>, path: &Path) -> io::Result<(OwnedFd, OsString)> {
    parent_beneath(root, path)
        .map_err(|err| io::Error::new(err.kind(), format!("{}: {err}", path.display())))
}

fn local_state(root: BorrowedFd<'_>, path: &Path) -> io::Result<LocalState> {
    let (parent, name) = match resolve(root, path) {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LocalState::Missing),
        Err(err) => return Err(err),
    };
    match statat(&parent, &name, AtFlags::SYMLINK_NOFOLLOW) {
        Ok(stat) => Ok(match FileType::from_raw_mode(stat.st_mode as _) {
            FileType::Directory => LocalState::Directory,
            FileType::RegularFile => LocalState::Regular {
                size: stat.st_size as u64,
                mtime: stat.st_mtime as i64,
            },
            _ => LocalState::Other,
        }),
        Err(Errno::NOENT) => Ok(LocalState::Missing),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Requests every missing or changed regular file in list order.
#[derive(Debug, Default)]
pub struct WholeFileUploader {
    recursive: bool,
    dry_run: bool,
    requested: usize,
    up_to_date: usize,
}

impl WholeFileUploader {
    /// Creates an uploader for `config`.
    pub fn new(config: &ReceiverConfig) -> Self {
        Self {
            recursive: config.recursive,
            dry_run: config.dry_run,
            ..Self::default()
        }
    }

    /// Number of files requested from the peer.
    pub const fn requested(&self) -> usize {
        self.requested
    }

    /// Number of files found already up to date.
    pub const fn up_to_date(&self) -> usize {
        self.up_to_date
    }

    fn examine(&mut self, index: usize, ctx: &mut UploadContext<'_>) -> io::Result<()> {
        let files = ctx.files;
        let entry = &files[index];
        let path = entry.path();

        if entry.is_dir() {
            return self.prepare_directory(index, entry, ctx);
        }
        if !entry.is_file() {
            info_log!(Nonreg, 1, "skipping non-regular file \"{}\"", path.display());
            return Ok(());
        }
        if self.dry_run {
            info_log!(Name, 1, "{}", path.display());
            return Ok(());
        }

        match local_state(destination(ctx.root)?, path)? {
            LocalState::Regular { size, mtime } if size == entry.size() && mtime == entry.mtime() => {
                debug_log!(Genr, 1, "{} is uptodate", path.display());
                self.up_to_date += 1;
                return Ok(());
            }
            LocalState::Directory => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{}: destination is a directory", path.display()),
                ));
            }
            _ => {}
        }

        let ndx = i32::try_from(index)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file index overflow"))?;
        write_int(ctx.outbound, ndx)?;
        for value in [0, 0, ctx.checksum_length.bytes(), 0] {
            write_int(ctx.outbound, value)?;
        }
        ctx.outbound.flush()?;
        debug_log!(Genr, 2, "requested {} (index {})", path.display(), index);
        self.requested += 1;
        Ok(())
    }

    fn prepare_directory(
        &self,
        index: usize,
        entry: &FileEntry,
        ctx: &mut UploadContext<'_>,
    ) -> io::Result<()> {
        let path = entry.path();
        if !self.recursive {
            info_log!(Nonreg, 1, "skipping directory \"{}\"", path.display());
            return Ok(());
        }
        if entry.is_root() || self.dry_run {
            return Ok(());
        }

        let root = destination(ctx.root)?;
        match local_state(root, path)? {
            LocalState::Directory => Ok(()),
            LocalState::Missing => {
                let (parent, name) = resolve(root, path)?;
                let mode = Mode::from_raw_mode((0o777 & !ctx.umask) as _);
                mkdirat(&parent, &name, mode).map_err(io::Error::from)?;
                ctx.new_dirs.mark(index);
                debug_log!(Genr, 1, "{}: creating directory", path.display());
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{}: destination is not a directory", path.display()),
            )),
        }
    }
}

impl Uploader for WholeFileUploader {
    fn advance(&mut self, mut ctx: UploadContext<'_>) -> io::Result<()> {
        // No step of this role waits on the secondary descriptor.
        drop(ctx.secondary.disarm());

        match ctx.cursor.current() {
            Some(UploadStep::Entry(index)) => {
                self.examine(index, &mut ctx)?;
                ctx.cursor.advance();
            }
            Some(UploadStep::EndOfList) => {
                write_int(ctx.outbound, NDX_DONE)?;
                ctx.outbound.flush()?;
                ctx.cursor.advance();
                debug_log!(
                    Genr,
                    1,
                    "uploader done: {} requested, {} up to date",
                    self.requested,
                    self.up_to_date
                );
            }
            None => {}
        }
        Ok(())
    }
}

/// A file whose content is still arriving.
#[derive(Debug)]
pub struct PendingFile {
    index: usize,
    name: OsString,
    file: File,
    guard: TempFileGuard,
    written: u64,
}

impl PendingFile {
    /// File list index being received.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Bytes written so far.
    pub const fn written(&self) -> u64 {
        self.written
    }
}

/// Commits literal file content through temporary files.
#[derive(Debug, Default)]
pub struct WholeFileDownloader {
    preserve_times: bool,
    preserve_perms: bool,
    received: usize,
    bytes: u64,
}

impl WholeFileDownloader {
    /// Creates a downloader for `config`.
    pub fn new(config: &ReceiverConfig) -> Self {
        Self {
            preserve_times: config.preserve_times,
            preserve_perms: config.preserve_perms,
            ..Self::default()
        }
    }

    /// Number of files committed.
    pub const fn received(&self) -> usize {
        self.received
    }

    /// Number of literal bytes committed.
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    fn begin(&self, ndx: i32, ctx: &mut DownloadContext<'_>) -> io::Result<PendingFile> {
        let index = usize::try_from(ndx)
            .ok()
            .filter(|&index| index < ctx.files.len())
            .ok_or_else(|| invalid_data(format!("file index {ndx} out of range")))?;
        let files = ctx.files;
        let entry = &files[index];
        if !entry.is_file() {
            return Err(invalid_data(format!(
                "data sent for non-regular file {}",
                entry.path().display()
            )));
        }

        let mut head = [0i32; SUM_HEAD_INTS];
        for value in &mut head {
            *value = read_int(ctx.inbound)?;
        }
        if head[0] != 0 {
            return Err(invalid_data(format!(
                "{}: peer announced {} blocks without a basis",
                entry.path().display(),
                head[0]
            )));
        }

        let (parent, name) = resolve(destination(ctx.root)?, entry.path())?;
        let (file, guard) = open_tmpfile(parent.as_fd(), Path::new(&name))?;
        debug_log!(Recv, 1, "receiving {} (index {})", entry.path().display(), index);
        Ok(PendingFile {
            index,
            name,
            file,
            guard,
            written: 0,
        })
    }

    fn commit(&mut self, pending: PendingFile, ctx: &DownloadContext<'_>) -> io::Result<()> {
        let entry = &ctx.files[pending.index];
        let path = entry.path();
        if pending.written != entry.size() {
            return Err(invalid_data(format!(
                "{}: received {} bytes, expected {}",
                path.display(),
                pending.written,
                entry.size()
            )));
        }

        let perms = if self.preserve_perms {
            entry.permissions()
        } else {
            entry.permissions() & !ctx.umask
        };
        fchmod(&pending.file, Mode::from_raw_mode(perms as _)).map_err(io::Error::from)?;

        if self.preserve_times {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_secs() as i64);
            let times = Timestamps {
                last_access: Timespec {
                    tv_sec: now,
                    tv_nsec: 0,
                },
                last_modification: Timespec {
                    tv_sec: entry.mtime(),
                    tv_nsec: 0,
                },
            };
            futimens(&pending.file, &times).map_err(io::Error::from)?;
        }

        let PendingFile {
            name, file, guard, ..
        } = pending;
        drop(file);
        guard.persist(Path::new(&name))?;

        self.received += 1;
        self.bytes += entry.size();
        info_log!(Name, 1, "{}", path.display());
        Ok(())
    }
}

impl Downloader for WholeFileDownloader {
    type Continuation = PendingFile;

    fn advance(
        &mut self,
        mut ctx: DownloadContext<'_>,
        continuation: &mut Option<PendingFile>,
    ) -> io::Result<DownloadStatus> {
        let Some(mut pending) = continuation.take() else {
            let ndx = read_int(ctx.inbound)?;
            if ndx == NDX_DONE {
                debug_log!(Recv, 1, "downloader done: {} files", self.received);
                return Ok(DownloadStatus::PhaseComplete);
            }
            *continuation = Some(self.begin(ndx, &mut ctx)?);
            return Ok(DownloadStatus::Progress);
        };

        let token = read_int(ctx.inbound)?;
        if token == 0 {
            self.commit(pending, &ctx)?;
            return Ok(DownloadStatus::Progress);
        }
        if token < 0 {
            return Err(invalid_data(format!(
                "block reference {token} without a basis file"
            )));
        }
        if token > MAX_TOKEN_LEN {
            return Err(invalid_data(format!("literal token of {token} bytes")));
        }

        let len = token as u64;
        let mut literal = Read::take(&mut *ctx.inbound, len);
        let copied = io::copy(&mut literal, &mut pending.file)?;
        if copied != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("literal data truncated: {copied} of {len} bytes"),
            ));
        }
        pending.written += len;
        debug_log!(Recv, 3, "index {}: +{} bytes", pending.index, len);
        *continuation = Some(pending);
        Ok(DownloadStatus::Progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChecksumLength;
    use crate::roles::{NewDirFlags, SecondaryDescriptor, UploadCursor};
    use std::fs;
    use std::io::Cursor;
    use std::os::fd::AsFd;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use tempfile::tempdir;

    struct Upload {
        cursor: UploadCursor,
        secondary: SecondaryDescriptor,
        new_dirs: NewDirFlags,
        out: Vec<u8>,
    }

    impl Upload {
        fn new(len: usize) -> Self {
            Self {
                cursor: UploadCursor::new(len),
                secondary: SecondaryDescriptor::default(),
                new_dirs: NewDirFlags::new(len),
                out: Vec::new(),
            }
        }

        fn run(&mut self, uploader: &mut WholeFileUploader, root: &File, files: &[FileEntry]) {
            while !self.cursor.is_exhausted() {
                uploader
                    .advance(UploadContext {
                        root: Some(root.as_fd()),
                        cursor: &mut self.cursor,
                        secondary: &mut self.secondary,
                        files,
                        checksum_length: ChecksumLength::Phase1,
                        umask: 0o022,
                        new_dirs: &mut self.new_dirs,
                        outbound: &mut self.out,
                    })
                    .unwrap();
            }
        }

        fn ints(&self) -> Vec<i32> {
            self.out
                .chunks(4)
                .map(|chunk| i32::from_le_bytes(chunk.try_into().unwrap()))
                .collect()
        }
    }

    #[test]
    fn uploader_requests_missing_files_and_creates_directories() {
        let temp = tempdir().unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![
            FileEntry::directory(".", 0o755, 0),
            FileEntry::directory("sub", 0o755, 0),
            FileEntry::file("sub/a", 0o644, 5, 3),
        ];
        let config = ReceiverConfig::default().with_recursive(true);
        let mut uploader = WholeFileUploader::new(&config);
        let mut upload = Upload::new(files.len());
        upload.run(&mut uploader, &root, &files);

        assert!(temp.path().join("sub").is_dir());
        assert!(upload.new_dirs.is_new(1));
        assert!(!upload.new_dirs.is_new(0));
        assert_eq!(upload.ints(), [2, 0, 0, 2, 0, NDX_DONE]);
        assert_eq!(uploader.requested(), 1);
    }

    #[test]
    fn uploader_skips_up_to_date_files() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("same"), b"abc").unwrap();
        let mtime = fs::metadata(temp.path().join("same")).unwrap().mtime();
        let root = File::open(temp.path()).unwrap();
        let files = vec![
            FileEntry::file("same", 0o644, mtime, 3),
            FileEntry::file("changed", 0o644, mtime, 3),
        ];
        let mut uploader = WholeFileUploader::new(&ReceiverConfig::default());
        let mut upload = Upload::new(files.len());
        upload.run(&mut uploader, &root, &files);

        assert_eq!(upload.ints(), [1, 0, 0, 2, 0, NDX_DONE]);
        assert_eq!(uploader.up_to_date(), 1);
    }

    #[test]
    fn uploader_ignores_directories_when_not_recursive() {
        let temp = tempdir().unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![FileEntry::directory("d", 0o755, 0)];
        let mut uploader = WholeFileUploader::new(&ReceiverConfig::default());
        let mut upload = Upload::new(1);
        upload.run(&mut uploader, &root, &files);

        assert!(!temp.path().join("d").exists());
        assert_eq!(upload.ints(), [NDX_DONE]);
    }

    #[test]
    fn uploader_refuses_file_over_directory() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("x")).unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![FileEntry::file("x", 0o644, 0, 1)];
        let mut uploader = WholeFileUploader::new(&ReceiverConfig::default());
        let mut upload = Upload::new(1);
        let err = uploader
            .advance(UploadContext {
                root: Some(root.as_fd()),
                cursor: &mut upload.cursor,
                secondary: &mut upload.secondary,
                files: &files,
                checksum_length: ChecksumLength::Phase1,
                umask: 0,
                new_dirs: &mut upload.new_dirs,
                outbound: &mut upload.out,
            })
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn dry_run_requests_nothing_and_creates_nothing() {
        let temp = tempdir().unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![
            FileEntry::directory("sub", 0o755, 0),
            FileEntry::file("sub/a", 0o644, 5, 3),
        ];
        let config = ReceiverConfig::default()
            .with_recursive(true)
            .with_dry_run(true);
        let mut uploader = WholeFileUploader::new(&config);
        let mut upload = Upload::new(files.len());
        upload.run(&mut uploader, &root, &files);

        assert!(!temp.path().join("sub").exists());
        assert_eq!(upload.new_dirs.count(), 0);
        assert_eq!(upload.ints(), [NDX_DONE]);
        assert_eq!(uploader.requested(), 0);
    }

    #[test]
    fn uploader_does_not_follow_symlinked_parent() {
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("a")).unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![
            FileEntry::directory("a/d", 0o755, 0),
            FileEntry::file("a/x", 0o644, 0, 1),
        ];
        let config = ReceiverConfig::default().with_recursive(true);
        let mut uploader = WholeFileUploader::new(&config);
        let mut upload = Upload::new(files.len());
        let err = uploader
            .advance(UploadContext {
                root: Some(root.as_fd()),
                cursor: &mut upload.cursor,
                secondary: &mut upload.secondary,
                files: &files,
                checksum_length: ChecksumLength::Phase1,
                umask: 0,
                new_dirs: &mut upload.new_dirs,
                outbound: &mut upload.out,
            })
            .unwrap_err();
        assert!(err.to_string().contains("a/d"), "{err}");
        assert!(!outside.path().join("d").exists());
        assert!(upload.out.is_empty());
    }

    fn reply(index: i32, chunks: &[&[u8]]) -> Vec<u8> {
        let mut wire = Vec::new();
        for value in [index, 0, 0, 2, 0] {
            write_int(&mut wire, value).unwrap();
        }
        for chunk in chunks {
            write_int(&mut wire, chunk.len() as i32).unwrap();
            wire.extend_from_slice(chunk);
        }
        write_int(&mut wire, 0).unwrap();
        wire
    }

    fn download_all(
        downloader: &mut WholeFileDownloader,
        root: &File,
        files: &[FileEntry],
        wire: Vec<u8>,
    ) -> io::Result<usize> {
        let mut inbound = Cursor::new(wire);
        let mut continuation = None;
        let mut steps = 0;
        loop {
            steps += 1;
            let status = downloader.advance(
                DownloadContext {
                    root: Some(root.as_fd()),
                    inbound: &mut inbound,
                    files,
                    umask: 0o022,
                },
                &mut continuation,
            )?;
            if status == DownloadStatus::PhaseComplete {
                assert!(continuation.is_none());
                return Ok(steps);
            }
        }
    }

    #[test]
    fn downloader_commits_files_with_metadata() {
        let temp = tempdir().unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![FileEntry::file("f", 0o640, 1_000_000, 5)];
        let mut wire = reply(0, &[b"he", b"llo"]);
        write_int(&mut wire, NDX_DONE).unwrap();

        let config = ReceiverConfig::default()
            .with_preserve_perms(true)
            .with_preserve_times(true);
        let mut downloader = WholeFileDownloader::new(&config);
        let steps = download_all(&mut downloader, &root, &files, wire).unwrap();

        // index, two literals, end of file, end of phase
        assert_eq!(steps, 5);
        let path = temp.path().join("f");
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        let meta = fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o640);
        assert_eq!(meta.mtime(), 1_000_000);
        assert_eq!(downloader.received(), 1);
        assert_eq!(downloader.bytes(), 5);
    }

    #[test]
    fn downloader_masks_mode_without_preserve_perms() {
        let temp = tempdir().unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![FileEntry::file("g", 0o666, 0, 0)];
        let mut wire = reply(0, &[]);
        write_int(&mut wire, NDX_DONE).unwrap();

        let mut downloader = WholeFileDownloader::new(&ReceiverConfig::default());
        download_all(&mut downloader, &root, &files, wire).unwrap();
        let mode = fs::metadata(temp.path().join("g")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn block_reference_is_rejected_and_temp_file_removed() {
        let temp = tempdir().unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![FileEntry::file("h", 0o644, 0, 4)];
        let mut wire = Vec::new();
        for value in [0, 0, 0, 2, 0, -3] {
            write_int(&mut wire, value).unwrap();
        }

        let mut downloader = WholeFileDownloader::new(&ReceiverConfig::default());
        let err = download_all(&mut downloader, &root, &files, wire).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn short_content_is_rejected() {
        let temp = tempdir().unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![FileEntry::file("s", 0o644, 0, 10)];
        let wire = reply(0, &[b"abc"]);

        let mut downloader = WholeFileDownloader::new(&ReceiverConfig::default());
        let err = download_all(&mut downloader, &root, &files, wire).unwrap_err();
        assert!(err.to_string().contains("expected 10"));
        assert!(!temp.path().join("s").exists());
    }

    #[test]
    fn content_is_not_written_through_symlinked_parent() {
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("a")).unwrap();
        let root = File::open(temp.path()).unwrap();
        let files = vec![FileEntry::file("a/x", 0o644, 0, 3)];
        let wire = reply(0, &[b"pwn"]);

        let mut downloader = WholeFileDownloader::new(&ReceiverConfig::default());
        assert!(download_all(&mut downloader, &root, &files, wire).is_err());
        assert_eq!(fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let temp = tempdir().unwrap();
        let root = File::open(temp.path()).unwrap();
        let wire = 9i32.to_le_bytes().to_vec();

        let mut downloader = WholeFileDownloader::new(&ReceiverConfig::default());
        let err = download_all(&mut downloader, &root, &[], wire).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
