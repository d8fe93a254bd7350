// crates/protocol/src/ndx.rs
//! File-list index sentinels.
//!
//! File-list indices are written as plain ints. A single reserved negative
//! value marks phase boundaries; its meaning (end of requests, end of phase,
//! end of transfer) is given by its position in the exchange, never by the
//! value itself.

use std::io::{self, Read};

use crate::wire::read_int;

/// Sentinel index marking the end of a phase or of the whole transfer.
pub const NDX_DONE: i32 = -1;

/// Reads one int and fails with `InvalidData` unless it is [`NDX_DONE`].
///
/// `context` names the exchange for the error message.
pub fn read_ndx_done<R: Read + ?Sized>(reader: &mut R, context: &str) -> io::Result<()> {
    let ndx = read_int(reader)?;
    if ndx != NDX_DONE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected NDX_DONE ({NDX_DONE}) during {context}, got {ndx}"),
        ));
    }
    Ok(())
}
