#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! Wire primitives shared by the receiving side of a transfer.
//!
//! The crate is split into small modules, each covering one building block of
//! the byte stream exchanged with the sender:
//!
//! - [`wire`]: little-endian ints and longints.
//! - [`envelope`] and [`Demultiplexer`]: the optional multiplexed framing
//!   that interleaves diagnostic messages with protocol data.
//! - [`FileEntry`] with [`read_file_list`] and [`write_file_list`].
//! - [`TransferStats`] and the [`NDX_DONE`] sentinel.
//!
//! # Examples
//!
//! ```
//! use protocol::{Demultiplexer, MessageCode, read_int, send_msg};
//!
//! let mut wire = Vec::new();
//! send_msg(&mut wire, MessageCode::Data, &7i32.to_le_bytes()).unwrap();
//!
//! let mut reader = Demultiplexer::new(wire.as_slice(), true);
//! assert_eq!(read_int(&mut reader).unwrap(), 7);
//! ```

pub mod envelope;
mod flist;
mod multiplex;
mod ndx;
mod stats;
pub mod wire;

pub use envelope::{EnvelopeError, MessageCode, MessageHeader};
pub use flist::{
    FileEntry, FileListError, MAX_NAME_LEN, read_file_list, sanitize_path, write_file_list,
};
pub use multiplex::{Demultiplexer, send_msg};
pub use ndx::{NDX_DONE, read_ndx_done};
pub use stats::TransferStats;
pub use wire::{read_int, read_long, read_size, write_int, write_long};
