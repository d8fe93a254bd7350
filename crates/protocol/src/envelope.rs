//! Multiplexed message envelope.
//!
//! When reads are multiplexed, every chunk on the inbound stream is prefixed
//! by a four byte little-endian header. The high byte carries the message tag
//! (`MPLEX_BASE` plus a [`MessageCode`]) and the low 24 bits carry the payload
//! length. Only [`MessageCode::Data`] frames carry protocol payload; every
//! other code is out-of-band diagnostic traffic.

use thiserror::Error;

/// Length of an encoded multiplexed header in bytes.
pub const HEADER_LEN: usize = 4;

/// Offset added to a message code to form the wire tag.
pub const MPLEX_BASE: u8 = 7;

/// Largest payload representable in the 24-bit length field.
pub const MAX_PAYLOAD_LENGTH: u32 = 0x00FF_FFFF;

const PAYLOAD_MASK: u32 = 0x00FF_FFFF;

/// Tags used for multiplexed messages.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum MessageCode {
    #[doc(alias = "MSG_DATA")]
    /// Protocol payload.
    Data = 0,
    #[doc(alias = "MSG_ERROR_XFER")]
    /// Transfer error reported by the peer.
    ErrorXfer = 1,
    #[doc(alias = "MSG_INFO")]
    /// Informational text.
    Info = 2,
    #[doc(alias = "MSG_ERROR")]
    /// Non-fatal error text.
    Error = 3,
    #[doc(alias = "MSG_WARNING")]
    /// Warning text.
    Warning = 4,
    #[doc(alias = "MSG_ERROR_SOCKET")]
    /// Error relayed from a sibling process.
    ErrorSocket = 5,
    #[doc(alias = "MSG_LOG")]
    /// Text destined only for the peer's log file.
    Log = 6,
    #[doc(alias = "MSG_CLIENT")]
    /// Text destined only for the client.
    Client = 7,
    #[doc(alias = "MSG_IO_ERROR")]
    /// The peer hit an I/O error while reading its source tree.
    IoError = 22,
    #[doc(alias = "MSG_NOOP")]
    /// Keep-alive without content.
    NoOp = 42,
}

impl MessageCode {
    /// Returns the numeric representation expected on the wire.
    #[must_use]
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to construct a [`MessageCode`] from its numeric representation.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            1 => Some(Self::ErrorXfer),
            2 => Some(Self::Info),
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            5 => Some(Self::ErrorSocket),
            6 => Some(Self::Log),
            7 => Some(Self::Client),
            22 => Some(Self::IoError),
            42 => Some(Self::NoOp),
            _ => None,
        }
    }

    /// Returns `true` when the payload is human-readable diagnostic text.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(
            self,
            Self::ErrorXfer
                | Self::Info
                | Self::Error
                | Self::Warning
                | Self::ErrorSocket
                | Self::Log
                | Self::Client
        )
    }

    /// Returns `true` for codes that report a failure on the peer.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Self::ErrorXfer | Self::Error | Self::ErrorSocket | Self::IoError
        )
    }
}

/// Failures encountered while parsing or constructing headers.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EnvelopeError {
    /// Fewer than [`HEADER_LEN`] bytes were provided.
    #[error("multiplexed header truncated: expected {HEADER_LEN} bytes, got {actual}")]
    TruncatedHeader {
        /// Number of bytes that were available.
        actual: usize,
    },
    /// The tag byte did not include the [`MPLEX_BASE`] offset.
    #[error("multiplexed header contained invalid tag byte {0}")]
    InvalidTag(u8),
    /// The encoded message code is not understood.
    #[error("unknown multiplexed message code {0}")]
    UnknownMessageCode(u8),
    /// The payload length exceeded the 24-bit range.
    #[error("multiplexed payload length {0} exceeds maximum {MAX_PAYLOAD_LENGTH}")]
    OversizedPayload(u32),
}

/// A decoded multiplexed message header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MessageHeader {
    code: MessageCode,
    payload_len: u32,
}

impl MessageHeader {
    /// Creates a new header for `code` with the provided payload length.
    pub const fn new(code: MessageCode, payload_len: u32) -> Result<Self, EnvelopeError> {
        if payload_len > MAX_PAYLOAD_LENGTH {
            return Err(EnvelopeError::OversizedPayload(payload_len));
        }

        Ok(Self { code, payload_len })
    }

    /// Parses a header from the beginning of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < HEADER_LEN {
            return Err(EnvelopeError::TruncatedHeader {
                actual: bytes.len(),
            });
        }

        let mut encoded = [0u8; HEADER_LEN];
        encoded.copy_from_slice(&bytes[..HEADER_LEN]);
        Self::from_raw(u32::from_le_bytes(encoded))
    }

    /// Constructs a header from the raw 32-bit wire value.
    pub const fn from_raw(raw: u32) -> Result<Self, EnvelopeError> {
        let tag = (raw >> 24) as u8;
        if tag < MPLEX_BASE {
            return Err(EnvelopeError::InvalidTag(tag));
        }

        let code_value = tag - MPLEX_BASE;
        match MessageCode::from_u8(code_value) {
            Some(code) => Self::new(code, raw & PAYLOAD_MASK),
            None => Err(EnvelopeError::UnknownMessageCode(code_value)),
        }
    }

    /// Encodes this header into its little-endian wire form.
    #[must_use]
    pub const fn encode(self) -> [u8; HEADER_LEN] {
        let raw = ((self.code.as_u8() as u32 + MPLEX_BASE as u32) << 24) | self.payload_len;
        raw.to_le_bytes()
    }

    /// Returns the message code.
    #[must_use]
    pub const fn code(self) -> MessageCode {
        self.code
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub const fn payload_len(self) -> u32 {
        self.payload_len
    }

    /// Returns the payload length as a `usize`.
    #[must_use]
    pub const fn payload_len_usize(self) -> usize {
        self.payload_len as usize
    }
}
