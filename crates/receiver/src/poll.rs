//! Readiness wait over the inbound connection and the secondary descriptor.

use std::io;
use std::os::fd::BorrowedFd;

use logging::debug_log;
use rustix::event::{PollFd, PollFlags, Timespec, poll};
use rustix::io::Errno;

use crate::error::{ReceiverError, ReceiverResult};

/// How long a single wait may block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollTimeout {
    /// Return at once so the uploader can keep going.
    Immediate,
    /// Block until a descriptor is ready.
    Indefinite,
}

impl PollTimeout {
    fn as_timespec(self) -> Option<Timespec> {
        match self {
            Self::Immediate => Some(Timespec {
                tv_sec: 0,
                tv_nsec: 0,
            }),
            Self::Indefinite => None,
        }
    }
}

/// Timeout for the next wait.
///
/// Zero exactly while upload work remains and no continuation is waiting on
/// the secondary descriptor.
pub const fn poll_timeout(upload_pending: bool, secondary_armed: bool) -> PollTimeout {
    if upload_pending && !secondary_armed {
        PollTimeout::Immediate
    } else {
        PollTimeout::Indefinite
    }
}

/// Read-readiness reported by one wait.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Readiness {
    /// The inbound connection has data.
    pub inbound: bool,
    /// The secondary descriptor fired.
    pub secondary: bool,
}

/// Waits on `inbound` and, when armed, `secondary`.
///
/// Error, invalid-descriptor and hang-up indications on either descriptor are
/// protocol errors.
pub fn wait_ready(
    inbound: BorrowedFd<'_>,
    secondary: Option<BorrowedFd<'_>>,
    timeout: PollTimeout,
) -> ReceiverResult<Readiness> {
    let timespec = timeout.as_timespec();
    let mut fds = Vec::with_capacity(2);
    fds.push(PollFd::new(&inbound, PollFlags::IN));
    if let Some(fd) = secondary.as_ref() {
        fds.push(PollFd::new(fd, PollFlags::IN));
    }

    loop {
        match poll(&mut fds, timespec.as_ref()) {
            Ok(_) => break,
            Err(Errno::INTR) => continue,
            Err(errno) => return Err(ReceiverError::transport("poll", io::Error::from(errno))),
        }
    }

    let mut readiness = Readiness::default();
    for (slot, fd) in fds.iter().enumerate() {
        let revents = fd.revents();
        if revents.intersects(PollFlags::ERR | PollFlags::NVAL) {
            return Err(ReceiverError::protocol("poll", "bad fd"));
        }
        if revents.contains(PollFlags::HUP) {
            return Err(ReceiverError::protocol("poll", "hangup"));
        }
        let ready = revents.contains(PollFlags::IN);
        if slot == 0 {
            readiness.inbound = ready;
        } else {
            readiness.secondary = ready;
        }
    }

    debug_log!(
        Io,
        2,
        "poll({:?}): inbound={} secondary={}",
        timeout,
        readiness.inbound,
        readiness.secondary
    );
    Ok(readiness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn idle_connection_is_not_ready() {
        let (ours, _peer) = UnixStream::pair().unwrap();
        let readiness = wait_ready(ours.as_fd(), None, PollTimeout::Immediate).unwrap();
        assert_eq!(readiness, Readiness::default());
    }

    #[test]
    fn pending_data_is_reported() {
        let (ours, mut peer) = UnixStream::pair().unwrap();
        peer.write_all(&[1]).unwrap();
        let readiness = wait_ready(ours.as_fd(), None, PollTimeout::Indefinite).unwrap();
        assert!(readiness.inbound);
        assert!(!readiness.secondary);
    }

    #[test]
    fn secondary_descriptor_is_watched_when_present() {
        let (ours, _peer) = UnixStream::pair().unwrap();
        let (waiting, mut signal) = UnixStream::pair().unwrap();
        signal.write_all(b"x").unwrap();
        let readiness =
            wait_ready(ours.as_fd(), Some(waiting.as_fd()), PollTimeout::Indefinite).unwrap();
        assert!(readiness.secondary);
        assert!(!readiness.inbound);
    }

    #[test]
    fn hangup_is_a_protocol_error() {
        let (ours, peer) = UnixStream::pair().unwrap();
        drop(peer);
        let err = wait_ready(ours.as_fd(), None, PollTimeout::Immediate).unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("hangup"));
    }

    #[test]
    fn timeout_examples() {
        assert_eq!(poll_timeout(true, false), PollTimeout::Immediate);
        assert_eq!(poll_timeout(false, false), PollTimeout::Indefinite);
        assert_eq!(poll_timeout(true, true), PollTimeout::Indefinite);
    }

    proptest! {
        #[test]
        fn timeout_is_zero_only_with_unblocked_upload_work(pending: bool, armed: bool) {
            let immediate = poll_timeout(pending, armed) == PollTimeout::Immediate;
            prop_assert_eq!(immediate, pending && !armed);
        }
    }
}
