//! Receiver phase machine.
//!
//! ```text
//! Collecting --(downloader: phase complete)--> AwaitingAck --(peer ack)--> Done
//! ```

use std::fmt;

/// Coarse stage of a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub enum Phase {
    /// Phase 0: requests and file content are interleaved.
    #[default]
    Collecting,
    /// Phase 1: waiting for the peer to acknowledge the end of phase 1.
    AwaitingAck,
    /// Phase 2: ready for statistics and shutdown.
    Done,
}

/// Inputs that move the phase machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PhaseEvent {
    /// The downloader reported that every file of phase 1 has been received.
    DownloadComplete,
    /// The peer echoed the end-of-phase sentinel.
    PeerAcknowledged,
}

/// Returned when an event arrives in a phase that does not accept it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvalidTransition {
    /// Phase the machine was in.
    pub from: Phase,
    /// Event that was rejected.
    pub event: PhaseEvent,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not valid in phase {}", self.event, self.from.number())
    }
}

impl Phase {
    /// Numeric phase counter: 0, 1 or 2.
    pub const fn number(self) -> u8 {
        match self {
            Self::Collecting => 0,
            Self::AwaitingAck => 1,
            Self::Done => 2,
        }
    }

    /// Applies `event` and returns the next phase.
    pub const fn transition(self, event: PhaseEvent) -> Result<Self, InvalidTransition> {
        match (self, event) {
            (Self::Collecting, PhaseEvent::DownloadComplete) => Ok(Self::AwaitingAck),
            (Self::AwaitingAck, PhaseEvent::PeerAcknowledged) => Ok(Self::Done),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}
