//! Demultiplexing reader for the inbound protocol stream.
//!
//! [`Demultiplexer`] wraps the inbound descriptor. In plain mode it is a
//! transparent pass-through. In multiplexed mode it strips envelope headers,
//! hands `MSG_DATA` payload bytes to the caller and routes every other message
//! to a handler.
//!
//! Unlike a buffering reader, the demultiplexer never pulls payload bytes off
//! the descriptor ahead of the caller. It only tracks how many bytes of the
//! current data frame are still unread. A caller that polls the underlying
//! descriptor for readiness therefore never misses data sitting in a private
//! buffer.

use std::io::{self, Read, Write};

use logging::{info_log, warn_log};

use crate::envelope::{EnvelopeError, HEADER_LEN, MessageCode, MessageHeader};

/// Callback invoked for each out-of-band message.
type MessageHandler = Box<dyn FnMut(MessageCode, &[u8]) -> io::Result<()> + Send>;

fn map_envelope_error(err: EnvelopeError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Writes one multiplexed message with the given code and payload.
///
/// ```
/// use protocol::{MessageCode, send_msg};
///
/// let mut wire = Vec::new();
/// send_msg(&mut wire, MessageCode::Info, b"hi").unwrap();
/// assert_eq!(wire, [2, 0, 0, 9, b'h', b'i']);
/// ```
pub fn send_msg<W: Write + ?Sized>(
    writer: &mut W,
    code: MessageCode,
    payload: &[u8],
) -> io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("multiplexed payload length {} too large", payload.len()),
        )
    })?;
    let header = MessageHeader::new(code, len).map_err(|err| match err {
        EnvelopeError::OversizedPayload(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
        other => map_envelope_error(other),
    })?;
    writer.write_all(&header.encode())?;
    writer.write_all(payload)
}

/// Inbound reader that optionally strips multiplexed envelopes.
pub struct Demultiplexer<R> {
    inner: R,
    multiplexed: bool,
    /// Unread bytes left in the current `MSG_DATA` frame.
    remaining: usize,
    handler: Option<MessageHandler>,
}

impl<R> Demultiplexer<R> {
    /// Creates a reader; `multiplexed` selects envelope stripping.
    pub fn new(inner: R, multiplexed: bool) -> Self {
        Self {
            inner,
            multiplexed,
            remaining: 0,
            handler: None,
        }
    }

    /// Returns `true` when envelopes are stripped.
    #[inline]
    pub const fn is_multiplexed(&self) -> bool {
        self.multiplexed
    }

    /// Number of protocol bytes known to be available without another header.
    ///
    /// Always zero in plain mode.
    #[inline]
    pub const fn data_remaining(&self) -> usize {
        self.remaining
    }

    /// Returns a reference to the wrapped reader.
    ///
    /// Reading from it directly corrupts the envelope stream.
    #[inline]
    pub const fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns a mutable reference to the wrapped reader.
    #[inline]
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the demultiplexer and returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Replaces the default routing of out-of-band messages.
    ///
    /// An error returned by `handler` aborts the read that triggered it.
    pub fn set_message_handler<F>(&mut self, handler: F)
    where
        F: FnMut(MessageCode, &[u8]) -> io::Result<()> + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }
}

impl<R: Read> Demultiplexer<R> {
    /// Consumes one envelope header and, for out-of-band messages, its payload.
    ///
    /// Called after the inbound descriptor polled readable. Does nothing in
    /// plain mode or while the current data frame still has unread bytes.
    /// Afterwards [`data_remaining`](Self::data_remaining) tells whether
    /// protocol bytes are ready; when it is zero the caller should poll again.
    pub fn flush_out_of_band(&mut self) -> io::Result<()> {
        if !self.multiplexed || self.remaining > 0 {
            return Ok(());
        }
        if self.next_frame()? {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the stream between frames",
            ))
        }
    }

    /// Reads one header and dispatches it. Returns `false` on a clean end of
    /// stream at a frame boundary.
    fn next_frame(&mut self) -> io::Result<bool> {
        let mut raw = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            match self.inner.read(&mut raw[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("multiplexed header truncated after {filled} bytes"),
                    ));
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        let header = MessageHeader::decode(&raw).map_err(map_envelope_error)?;

        if header.code() == MessageCode::Data {
            self.remaining = header.payload_len_usize();
            return Ok(true);
        }

        let mut payload = vec![0u8; header.payload_len_usize()];
        self.inner.read_exact(&mut payload)?;
        match self.handler.as_mut() {
            Some(handler) => handler(header.code(), &payload)?,
            None => route_message(header.code(), &payload)?,
        }
        Ok(true)
    }
}

impl<R: Read> Read for Demultiplexer<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.multiplexed {
            return self.inner.read(buf);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        while self.remaining == 0 {
            if !self.next_frame()? {
                return Ok(0);
            }
        }

        let want = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "multiplexed payload truncated: {} bytes outstanding",
                    self.remaining
                ),
            ));
        }
        self.remaining -= n;
        Ok(n)
    }
}

/// Default routing of out-of-band messages into the diagnostic macros.
fn route_message(code: MessageCode, payload: &[u8]) -> io::Result<()> {
    match code {
        MessageCode::NoOp => Ok(()),
        MessageCode::IoError => {
            warn_log!("peer reported an I/O error on its side");
            Ok(())
        }
        MessageCode::Info | MessageCode::Log | MessageCode::Client => {
            let text = String::from_utf8_lossy(payload);
            info_log!(Misc, 1, "{}", text.trim_end_matches('\n'));
            Ok(())
        }
        code if code.is_text() => {
            let text = String::from_utf8_lossy(payload);
            warn_log!("{}", text.trim_end_matches('\n'));
            Ok(())
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected out-of-band message code {}", other.as_u8()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logging::{DiagnosticEvent, VerbosityConfig, drain_events, init};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn framed(parts: &[(MessageCode, &[u8])]) -> Vec<u8> {
        let mut wire = Vec::new();
        for (code, payload) in parts {
            send_msg(&mut wire, *code, payload).unwrap();
        }
        wire
    }

    #[test]
    fn plain_mode_passes_bytes_through() {
        let mut reader = Demultiplexer::new(Cursor::new(b"abc".to_vec()), false);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(reader.data_remaining(), 0);
    }

    #[test]
    fn data_frames_are_concatenated() {
        let wire = framed(&[
            (MessageCode::Data, b"hel"),
            (MessageCode::NoOp, b""),
            (MessageCode::Data, b"lo"),
        ]);
        let mut reader = Demultiplexer::new(Cursor::new(wire), true);
        let mut out = [0u8; 5];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn flush_reads_only_one_header() {
        let wire = framed(&[(MessageCode::Info, b"note\n"), (MessageCode::Data, b"xy")]);
        let mut reader = Demultiplexer::new(Cursor::new(wire), true);

        reader.flush_out_of_band().unwrap();
        assert_eq!(reader.data_remaining(), 0);

        reader.flush_out_of_band().unwrap();
        assert_eq!(reader.data_remaining(), 2);

        // Nothing happens while the data frame is unread.
        reader.flush_out_of_band().unwrap();
        assert_eq!(reader.data_remaining(), 2);
        assert_eq!(reader.get_ref().position(), 13);
    }

    #[test]
    fn flush_is_a_no_op_in_plain_mode() {
        let mut reader = Demultiplexer::new(Cursor::new(vec![1, 2, 3, 4]), false);
        reader.flush_out_of_band().unwrap();
        assert_eq!(reader.get_ref().position(), 0);
    }

    #[test]
    fn info_messages_reach_the_diagnostic_log() {
        init(VerbosityConfig::from_verbose_level(1));
        let wire = framed(&[
            (MessageCode::Info, b"hello peer\n"),
            (MessageCode::Warning, b"careful"),
            (MessageCode::Data, &[7]),
        ]);
        let mut reader = Demultiplexer::new(Cursor::new(wire), true);
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte, [7]);

        let events = drain_events();
        assert!(events.iter().any(|event| matches!(
            event,
            DiagnosticEvent::Info { message, .. } if message == "hello peer"
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            DiagnosticEvent::Warning { message } if message == "careful"
        )));
    }

    #[test]
    fn custom_handler_sees_out_of_band_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let wire = framed(&[(MessageCode::Error, b"boom"), (MessageCode::Data, b"z")]);
        let mut reader = Demultiplexer::new(Cursor::new(wire), true);
        reader.set_message_handler(move |code, payload| {
            sink.lock().unwrap().push((code, payload.to_vec()));
            Ok(())
        });

        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[(MessageCode::Error, b"boom".to_vec())]
        );
    }

    #[test]
    fn handler_errors_abort_the_read() {
        let wire = framed(&[(MessageCode::ErrorXfer, b"fatal")]);
        let mut reader = Demultiplexer::new(Cursor::new(wire), true);
        reader.set_message_handler(|_, _| Err(io::Error::other("peer failed")));
        let err = reader.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.to_string(), "peer failed");
    }

    #[test]
    fn bad_tag_is_invalid_data() {
        let mut reader = Demultiplexer::new(Cursor::new(vec![0, 0, 0, 1]), true);
        let err = reader.flush_out_of_band().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_data_frame_is_unexpected_eof() {
        let mut wire = framed(&[(MessageCode::Data, b"abcd")]);
        wire.truncate(HEADER_LEN + 2);
        let mut reader = Demultiplexer::new(Cursor::new(wire), true);
        let mut out = [0u8; 4];
        let err = reader.read_exact(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn clean_end_of_stream_reads_zero() {
        let wire = framed(&[(MessageCode::Data, b"q")]);
        let mut reader = Demultiplexer::new(Cursor::new(wire), true);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"q");

        let err = reader.flush_out_of_band().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn data_code_is_never_routed() {
        let err = route_message(MessageCode::Data, b"").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
