//! Framed integer primitives.
//!
//! Integers travel as 32-bit little-endian values. Sizes and timestamps use
//! the longint form: values in `0..=i32::MAX` are written as a plain int,
//! anything else as the int `-1` followed by a 64-bit little-endian value.

use std::io::{self, Read, Write};

/// Marker int announcing that a 64-bit longint follows.
const LONGINT_ESCAPE: i32 = -1;

/// Reads one 32-bit little-endian integer.
pub fn read_int<R: Read + ?Sized>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Writes one 32-bit little-endian integer.
pub fn write_int<W: Write + ?Sized>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Reads a longint.
pub fn read_long<R: Read + ?Sized>(reader: &mut R) -> io::Result<i64> {
    let value = read_int(reader)?;
    if value != LONGINT_ESCAPE {
        return Ok(i64::from(value));
    }

    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Writes a longint.
pub fn write_long<W: Write + ?Sized>(writer: &mut W, value: i64) -> io::Result<()> {
    if let Ok(small) = i32::try_from(value)
        && small >= 0
    {
        return write_int(writer, small);
    }

    write_int(writer, LONGINT_ESCAPE)?;
    writer.write_all(&value.to_le_bytes())
}

/// Reads a longint that must not be negative.
pub fn read_size<R: Read + ?Sized>(reader: &mut R, what: &str) -> io::Result<u64> {
    let value = read_long(reader)?;
    u64::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative {what} on the wire: {value}"),
        )
    })
}
