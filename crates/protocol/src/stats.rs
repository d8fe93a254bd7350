//! crates/protocol/src/stats.rs
//!
//! Transfer statistics sent by the peer at the end of a client-side run.
//!
//! ```text
//! total_read    : longint (bytes the sender read from the wire)
//! total_written : longint (bytes the sender wrote to the wire)
//! total_size    : longint (sum of file sizes in the list)
//! ```

use std::io::{self, Read, Write};

use crate::wire::{read_size, write_long};

/// Totals reported by the sending side.
///
/// ```
/// use protocol::TransferStats;
///
/// let stats = TransferStats::with_bytes(10, 2048, 4096);
/// let mut wire = Vec::new();
/// stats.write_to(&mut wire).unwrap();
/// assert_eq!(TransferStats::read_from(&mut wire.as_slice()).unwrap(), stats);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransferStats {
    /// Bytes read from the network by the sender.
    pub total_read: u64,
    /// Bytes written to the network by the sender.
    pub total_written: u64,
    /// Total size of all files in the transfer.
    pub total_size: u64,
}

impl TransferStats {
    /// Creates statistics from the three byte counters.
    pub const fn with_bytes(total_read: u64, total_written: u64, total_size: u64) -> Self {
        Self {
            total_read,
            total_written,
            total_size,
        }
    }

    /// Reads the three counters.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let total_read = read_size(reader, "total_read")?;
        let total_written = read_size(reader, "total_written")?;
        let total_size = read_size(reader, "total_size")?;
        Ok(Self::with_bytes(total_read, total_written, total_size))
    }

    /// Writes the three counters.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        for value in [self.total_read, self.total_written, self.total_size] {
            let value = i64::try_from(value).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("statistic {value} does not fit a longint"),
                )
            })?;
            write_long(writer, value)?;
        }
        Ok(())
    }

    /// Ratio of file bytes to wire bytes, as printed in the summary line.
    pub fn speedup(&self) -> f64 {
        let wire = self.total_read + self.total_written;
        if wire == 0 {
            return 0.0;
        }
        self.total_size as f64 / wire as f64
    }
}
