//! The receiver run: setup, the phase-1 event loop, and the phase handshake.
//!
//! A run drives two cooperating roles over one connection. The uploader walks
//! the file list and writes requests for out-of-date entries; the downloader
//! reads the peer's replies and commits each file. Both are advanced from a
//! single readiness loop so neither can block the other.
//!
//! ```text
//! client → peer : 0                         filter preamble (clients only)
//! peer → client : file list, integrity int
//!                 ... phase 1: requests and replies interleaved ...
//! client → peer : -1                        end of phase 1
//! peer → client : -1                        acknowledgement
//! peer → client : stats                     (clients only)
//! client → peer : -1                        goodbye
//! ```

use std::io::{Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;

use logging::{debug_log, info_log, warn_log};
use protocol::{
    Demultiplexer, FileEntry, NDX_DONE, TransferStats, read_file_list, read_int, read_ndx_done,
    write_int,
};

use crate::config::ReceiverConfig;
use crate::delete::{DeleteSummary, DeletionReconciler, ExtraneousDeleter, plan_deletions};
use crate::error::{ReceiverError, ReceiverResult, Role};
use crate::finalize::{FinalizeOptions, FinalizeSummary, RootMetadata, finalize_directories};
use crate::phase::{Phase, PhaseEvent};
use crate::poll::{poll_timeout, wait_ready};
use crate::roles::{
    DownloadContext, DownloadStatus, Downloader, NewDirFlags, SecondaryDescriptor, UploadContext,
    UploadCursor, Uploader,
};
use crate::sandbox::{CapabilityMode, ProcessSandbox, Sandbox};
use crate::scan::scan_destination;
use crate::setup::{UmaskGuard, make_path, open_root, write_filter_preamble};
use crate::whole_file::{WholeFileDownloader, WholeFileUploader};

/// What a completed run did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReceiverOutcome {
    /// Phase reached; [`Phase::Done`] for every run that got past the file list.
    pub phase: Phase,
    /// Entries in the received file list.
    pub files: usize,
    /// The peer's statistics, received by clients only.
    pub stats: Option<TransferStats>,
    /// Entries removed by the deletion pass, or that a dry run would remove.
    pub deleted: DeleteSummary,
    /// Directories created during phase 1.
    pub new_directories: usize,
    /// Directory metadata updates applied after phase 1.
    pub finalized: FinalizeSummary,
    /// The client received an empty list and stopped before touching the
    /// destination.
    pub skipped_empty: bool,
}

/// Receiver orchestrator, generic over its roles, deletion pass and sandbox.
#[derive(Debug)]
pub struct Receiver<U, D, X = ExtraneousDeleter, S = ProcessSandbox> {
    config: ReceiverConfig,
    uploader: U,
    downloader: D,
    deleter: X,
    sandbox: S,
}

impl Receiver<WholeFileUploader, WholeFileDownloader> {
    /// Receiver with the whole-file roles and the process sandbox.
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            uploader: WholeFileUploader::new(&config),
            downloader: WholeFileDownloader::new(&config),
            deleter: ExtraneousDeleter,
            sandbox: ProcessSandbox::default(),
            config,
        }
    }
}

impl<U, D, X, S> Receiver<U, D, X, S>
where
    U: Uploader,
    D: Downloader,
    X: DeletionReconciler,
    S: Sandbox,
{
    /// Receiver assembled from explicit parts.
    pub const fn from_parts(
        config: ReceiverConfig,
        uploader: U,
        downloader: D,
        deleter: X,
        sandbox: S,
    ) -> Self {
        Self {
            config,
            uploader,
            downloader,
            deleter,
            sandbox,
        }
    }

    /// Replaces the sandbox.
    pub fn with_sandbox<S2: Sandbox>(self, sandbox: S2) -> Receiver<U, D, X, S2> {
        Receiver {
            config: self.config,
            uploader: self.uploader,
            downloader: self.downloader,
            deleter: self.deleter,
            sandbox,
        }
    }

    /// Replaces the deletion pass.
    pub fn with_deleter<X2: DeletionReconciler>(self, deleter: X2) -> Receiver<U, D, X2, S> {
        Receiver {
            config: self.config,
            uploader: self.uploader,
            downloader: self.downloader,
            deleter,
            sandbox: self.sandbox,
        }
    }

    /// The run configuration.
    pub const fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// The uploader role.
    pub const fn uploader(&self) -> &U {
        &self.uploader
    }

    /// The downloader role.
    pub const fn downloader(&self) -> &D {
        &self.downloader
    }

    /// The sandbox.
    pub const fn sandbox(&self) -> &S {
        &self.sandbox
    }

    /// Receives one transfer into `root`.
    ///
    /// `inbound` must be pollable; it is read through the demultiplexer when
    /// the configuration enables multiplexed reads. The thread's verbosity is
    /// set from the configuration. Every failure aborts the run.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(root = %root.display())))]
    pub fn run<I, O>(
        &mut self,
        root: &Path,
        inbound: I,
        outbound: O,
    ) -> ReceiverResult<ReceiverOutcome>
    where
        I: Read + AsFd,
        O: Write,
    {
        logging::init(self.config.verbosity_config());
        let mut outbound = outbound;
        let mut reader = Demultiplexer::new(inbound, self.config.multiplexed_reads);

        self.sandbox
            .restrict_capabilities(CapabilityMode::for_config(&self.config))
            .map_err(|err| ReceiverError::filesystem("restrict capabilities", root, err))?;

        if !self.config.server {
            write_filter_preamble(&mut outbound)
                .map_err(|err| ReceiverError::transport("filter preamble", err))?;
        }

        let files =
            read_file_list(&mut reader).map_err(|err| ReceiverError::transport("file list", err))?;
        let integrity =
            read_int(&mut reader).map_err(|err| ReceiverError::transport("integrity value", err))?;
        if integrity != 0 {
            return Err(ReceiverError::protocol(
                "integrity value",
                format!("peer reported I/O error value {integrity}"),
            ));
        }

        let mut outcome = ReceiverOutcome {
            files: files.len(),
            ..ReceiverOutcome::default()
        };

        if !self.config.server {
            if files.is_empty() {
                warn_log!("empty file list: nothing to receive");
                outcome.skipped_empty = true;
                return Ok(outcome);
            }
            info_log!(Flist, 1, "Transfer starting: {} files", files.len());
        }
        info_log!(Misc, 2, "{}: receiver destination", root.display());

        let dry_run = self.config.dry_run;
        if !dry_run {
            make_path(root).map_err(|err| ReceiverError::filesystem("mkpath", root, err))?;
        }
        let umask = UmaskGuard::clear();
        let dir = if dry_run {
            None
        } else {
            Some(open_root(root).map_err(|err| ReceiverError::filesystem("open", root, err))?)
        };

        if self.config.deletion_enabled() {
            let local = scan_destination(root)?;
            outcome.deleted = match &dir {
                Some(dir) => self.deleter.reconcile(dir.as_fd(), &local, &files)?,
                None => plan_deletions(&local, &files),
            };
        }

        self.sandbox
            .confine_to(root)
            .map_err(|err| ReceiverError::filesystem("confine", root, err))?;

        info_log!(Misc, 2, "{}: ready for phase 1 data", root.display());

        let mut new_dirs = NewDirFlags::new(files.len());
        let mut phase = self.phase_one(
            dir.as_ref(),
            &mut reader,
            &mut outbound,
            &files,
            umask.previous(),
            &mut new_dirs,
        )?;
        info_log!(Misc, 2, "{}: receiver ready for phase 2 data", root.display());
        outcome.new_directories = new_dirs.count();

        if let Some(dir) = &dir {
            let mut metadata = RootMetadata::new(dir.as_fd());
            outcome.finalized = finalize_directories(
                &mut metadata,
                &files,
                &new_dirs,
                FinalizeOptions::from(&self.config),
            )?;
        }

        send_ndx_done(&mut outbound, "end of phase")?;
        read_ndx_done(&mut reader, "phase acknowledgement")
            .map_err(|err| ReceiverError::transport("phase acknowledgement", err))?;
        phase = phase
            .transition(PhaseEvent::PeerAcknowledged)
            .map_err(|err| ReceiverError::protocol("phase acknowledgement", err.to_string()))?;
        debug_log!(Proto, 1, "peer acknowledged phase 1, now in phase {}", phase.number());

        if !self.config.server {
            let stats = TransferStats::read_from(&mut reader)
                .map_err(|err| ReceiverError::transport("statistics", err))?;
            info_log!(
                Stats,
                1,
                "sent {} bytes  received {} bytes  total size {}",
                stats.total_written,
                stats.total_read,
                stats.total_size
            );
            outcome.stats = Some(stats);
        }

        send_ndx_done(&mut outbound, "goodbye")?;
        info_log!(Misc, 2, "{}: receiver finished updating", root.display());

        outcome.phase = phase;
        drop(umask);
        Ok(outcome)
    }

    /// Runs the readiness loop until the downloader reports the end of phase 1.
    fn phase_one<I: Read + AsFd>(
        &mut self,
        dir: Option<&OwnedFd>,
        reader: &mut Demultiplexer<I>,
        outbound: &mut dyn Write,
        files: &[FileEntry],
        umask: u32,
        new_dirs: &mut NewDirFlags,
    ) -> ReceiverResult<Phase> {
        let mut cursor = UploadCursor::new(files.len());
        let mut secondary = SecondaryDescriptor::default();
        let mut continuation: Option<D::Continuation> = None;

        loop {
            let timeout = poll_timeout(!cursor.is_exhausted(), secondary.is_armed());
            let ready = wait_ready(reader.get_ref().as_fd(), secondary.as_fd(), timeout)?;

            if !cursor.is_exhausted() || ready.secondary {
                self.uploader
                    .advance(UploadContext {
                        root: dir.map(AsFd::as_fd),
                        cursor: &mut cursor,
                        secondary: &mut secondary,
                        files,
                        checksum_length: self.config.checksum_length,
                        umask,
                        new_dirs: &mut *new_dirs,
                        outbound: &mut *outbound,
                    })
                    .map_err(|err| ReceiverError::role(Role::Uploader, err))?;
            }

            if !ready.inbound {
                continue;
            }

            if reader.is_multiplexed() {
                reader
                    .flush_out_of_band()
                    .map_err(|err| ReceiverError::transport("out-of-band messages", err))?;
                if reader.data_remaining() == 0 {
                    continue;
                }
            }

            let status = self
                .downloader
                .advance(
                    DownloadContext {
                        root: dir.map(AsFd::as_fd),
                        inbound: &mut *reader,
                        files,
                        umask,
                    },
                    &mut continuation,
                )
                .map_err(|err| ReceiverError::role(Role::Downloader, err))?;

            if status == DownloadStatus::PhaseComplete {
                if !cursor.is_exhausted() {
                    return Err(ReceiverError::protocol(
                        "phase 1",
                        format!(
                            "peer ended the phase after {} of {} entries were offered",
                            cursor.offered(),
                            files.len()
                        ),
                    ));
                }
                if continuation.is_some() {
                    return Err(ReceiverError::protocol(
                        "phase 1",
                        "peer ended the phase while a file was in progress",
                    ));
                }
                return Phase::Collecting
                    .transition(PhaseEvent::DownloadComplete)
                    .map_err(|err| ReceiverError::protocol("phase 1", err.to_string()));
            }
        }
    }
}

fn send_ndx_done(outbound: &mut dyn Write, step: &'static str) -> ReceiverResult<()> {
    write_int(outbound, NDX_DONE)
        .and_then(|()| outbound.flush())
        .map_err(|err| ReceiverError::transport(step, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::UploadStep;
    use crate::setup::lock_umask;
    use protocol::write_file_list;
    use std::io;
    use std::os::unix::net::UnixStream;
    use tempfile::tempdir;

    #[derive(Debug, Default)]
    struct NullSandbox {
        calls: Vec<&'static str>,
    }

    impl Sandbox for NullSandbox {
        fn restrict_capabilities(&mut self, _mode: CapabilityMode) -> io::Result<()> {
            self.calls.push("restrict");
            Ok(())
        }

        fn confine_to(&mut self, _root: &Path) -> io::Result<()> {
            self.calls.push("confine");
            Ok(())
        }
    }

    /// Offers every entry in one call without writing requests.
    #[derive(Debug, Default)]
    struct SilentUploader {
        calls: usize,
    }

    impl Uploader for SilentUploader {
        fn advance(&mut self, ctx: UploadContext<'_>) -> io::Result<()> {
            self.calls += 1;
            while ctx.cursor.current().is_some() {
                ctx.cursor.advance();
            }
            Ok(())
        }
    }

    /// Offers one entry only, then stalls.
    #[derive(Debug, Default)]
    struct StalledUploader;

    impl Uploader for StalledUploader {
        fn advance(&mut self, ctx: UploadContext<'_>) -> io::Result<()> {
            if ctx.cursor.offered() == 0 {
                ctx.cursor.advance();
            }
            Ok(())
        }
    }

    /// Reads one int per call; -1 completes the phase.
    #[derive(Debug, Default)]
    struct IntDownloader {
        seen: Vec<i32>,
    }

    impl Downloader for IntDownloader {
        type Continuation = ();

        fn advance(
            &mut self,
            ctx: DownloadContext<'_>,
            _continuation: &mut Option<()>,
        ) -> io::Result<DownloadStatus> {
            let value = read_int(ctx.inbound)?;
            self.seen.push(value);
            Ok(if value == NDX_DONE {
                DownloadStatus::PhaseComplete
            } else {
                DownloadStatus::Progress
            })
        }
    }

    fn script(list: &[FileEntry], tail: &[i32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_file_list(&mut bytes, list).unwrap();
        write_int(&mut bytes, 0).unwrap();
        for value in tail {
            write_int(&mut bytes, *value).unwrap();
        }
        bytes
    }

    fn peer_with(bytes: Vec<u8>) -> (UnixStream, UnixStream) {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        theirs.write_all(&bytes).unwrap();
        (ours, theirs)
    }

    fn server_config() -> ReceiverConfig {
        ReceiverConfig::default().with_server(true)
    }

    #[test]
    fn server_run_with_mock_roles_reaches_done() {
        let _umask = lock_umask();
        let temp = tempdir().unwrap();
        let root = temp.path().join("dest");
        let list = [FileEntry::file("a", 0o644, 0, 0), FileEntry::file("b", 0o644, 0, 0)];
        let (inbound, _peer) = peer_with(script(&list, &[5, NDX_DONE, NDX_DONE]));

        let mut receiver = Receiver::from_parts(
            server_config(),
            SilentUploader::default(),
            IntDownloader::default(),
            ExtraneousDeleter,
            NullSandbox::default(),
        );
        let mut out = Vec::new();
        let outcome = receiver.run(&root, &inbound, &mut out).unwrap();

        assert_eq!(outcome.phase, Phase::Done);
        assert_eq!(outcome.files, 2);
        assert!(outcome.stats.is_none());
        assert_eq!(receiver.downloader().seen, [5, NDX_DONE]);
        assert_eq!(receiver.uploader().calls, 1);
        assert_eq!(receiver.sandbox().calls, ["restrict", "confine"]);
        assert_eq!(out, [NDX_DONE, NDX_DONE].map(i32::to_le_bytes).concat());
        assert!(root.is_dir());
    }

    #[test]
    fn early_phase_completion_is_a_protocol_error() {
        let _umask = lock_umask();
        let temp = tempdir().unwrap();
        let list = [FileEntry::file("a", 0o644, 0, 0), FileEntry::file("b", 0o644, 0, 0)];
        let (inbound, _peer) = peer_with(script(&list, &[NDX_DONE]));

        let mut receiver = Receiver::from_parts(
            server_config(),
            StalledUploader,
            IntDownloader::default(),
            ExtraneousDeleter,
            NullSandbox::default(),
        );
        let err = receiver
            .run(temp.path(), &inbound, io::sink())
            .unwrap_err();
        assert!(err.is_protocol(), "{err}");
        assert_eq!(err.step(), "phase 1");
    }

    #[test]
    fn wrong_acknowledgement_is_a_protocol_error() {
        let _umask = lock_umask();
        let temp = tempdir().unwrap();
        let list = [FileEntry::file("a", 0o644, 0, 0)];
        let (inbound, _peer) = peer_with(script(&list, &[NDX_DONE, 7]));

        let mut receiver = Receiver::from_parts(
            server_config(),
            SilentUploader::default(),
            IntDownloader::default(),
            ExtraneousDeleter,
            NullSandbox::default(),
        );
        let err = receiver
            .run(temp.path(), &inbound, io::sink())
            .unwrap_err();
        assert!(err.is_protocol(), "{err}");
        assert_eq!(err.step(), "phase acknowledgement");
    }

    #[test]
    fn nonzero_integrity_value_stops_before_the_destination_exists() {
        let _umask = lock_umask();
        let temp = tempdir().unwrap();
        let root = temp.path().join("never");
        let mut bytes = Vec::new();
        write_file_list(&mut bytes, &[FileEntry::file("a", 0o644, 0, 0)]).unwrap();
        write_int(&mut bytes, 1).unwrap();
        let (inbound, _peer) = peer_with(bytes);

        let mut receiver = Receiver::from_parts(
            server_config(),
            SilentUploader::default(),
            IntDownloader::default(),
            ExtraneousDeleter,
            NullSandbox::default(),
        );
        let err = receiver.run(&root, &inbound, io::sink()).unwrap_err();
        assert!(err.is_protocol());
        assert!(!root.exists());
        assert_eq!(receiver.uploader().calls, 0);
    }

    #[test]
    fn uploader_failure_is_attributed_to_the_uploader() {
        let _umask = lock_umask();
        struct Failing;
        impl Uploader for Failing {
            fn advance(&mut self, _ctx: UploadContext<'_>) -> io::Result<()> {
                Err(io::Error::other("boom"))
            }
        }

        let temp = tempdir().unwrap();
        let (inbound, _peer) = peer_with(script(&[FileEntry::file("a", 0o644, 0, 0)], &[]));
        let mut receiver = Receiver::from_parts(
            server_config(),
            Failing,
            IntDownloader::default(),
            ExtraneousDeleter,
            NullSandbox::default(),
        );
        let err = receiver
            .run(temp.path(), &inbound, io::sink())
            .unwrap_err();
        assert_eq!(err.failed_role(), Some(Role::Uploader));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn armed_secondary_descriptor_drives_the_uploader() {
        let _umask = lock_umask();
        /// Arms a socket on the first entry, finishes it once it fires, and
        /// lets the peer end the phase after the end of the list.
        struct Deferring {
            peer: UnixStream,
            writer: Option<UnixStream>,
            fired: bool,
        }

        impl Uploader for Deferring {
            fn advance(&mut self, ctx: UploadContext<'_>) -> io::Result<()> {
                if ctx.secondary.is_armed() {
                    ctx.secondary.disarm();
                    self.fired = true;
                    ctx.cursor.advance();
                    return Ok(());
                }
                match ctx.cursor.current() {
                    Some(UploadStep::Entry(_)) => {
                        let (read_end, mut write_end) = UnixStream::pair()?;
                        write_end.write_all(b"x")?;
                        self.writer = Some(write_end);
                        ctx.secondary.arm(OwnedFd::from(read_end))?;
                    }
                    Some(UploadStep::EndOfList) => {
                        ctx.cursor.advance();
                        write_int(&mut self.peer, NDX_DONE)?;
                        write_int(&mut self.peer, NDX_DONE)?;
                    }
                    None => {}
                }
                Ok(())
            }
        }

        let temp = tempdir().unwrap();
        let list = [FileEntry::file("a", 0o644, 0, 0)];
        let (inbound, peer) = peer_with(script(&list, &[]));
        let mut receiver = Receiver::from_parts(
            server_config(),
            Deferring {
                peer,
                writer: None,
                fired: false,
            },
            IntDownloader::default(),
            ExtraneousDeleter,
            NullSandbox::default(),
        );
        let outcome = receiver.run(temp.path(), &inbound, io::sink()).unwrap();
        assert_eq!(outcome.phase, Phase::Done);
        assert!(receiver.uploader().fired);
        assert_eq!(receiver.downloader().seen, [NDX_DONE]);
    }
}
