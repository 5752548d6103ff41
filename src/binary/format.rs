//! Binary container layout constants and primitive stream helpers.
//!
//! All integers are fixed-width `u32`, little-endian, written in declaration
//! order. The stream is strictly sequential; there is no random access.

use std::io::{Read, Write};

use crate::{Error, Result};

/// Marker opening the rule section.
pub const RULEDB_MAGIC: &str = "ruledb";

/// Marker opening the packet header section.
pub const PACKETDB_MAGIC: &str = "packetdb";

/// Write one little-endian `u32`.
pub(crate) fn write_u32<W: Write>(sink: &mut W, value: u32) -> Result<()> {
    sink.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Read one little-endian `u32`.
pub(crate) fn read_u32<R: Read>(source: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a section marker.
pub(crate) fn write_magic<W: Write>(sink: &mut W, magic: &'static str) -> Result<()> {
    sink.write_all(magic.as_bytes())?;
    Ok(())
}

/// Consume a section marker, failing on any mismatch.
pub(crate) fn expect_magic<R: Read>(source: &mut R, magic: &'static str) -> Result<()> {
    let mut buf = vec![0u8; magic.len()];
    source.read_exact(&mut buf)?;
    if buf != magic.as_bytes() {
        return Err(Error::BadMagic { expected: magic });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_round_trip() {
        let mut buf = Vec::new();
        for value in [0u32, 1, 0xdead_beef, u32::MAX] {
            write_u32(&mut buf, value).unwrap();
        }
        let mut cursor = buf.as_slice();
        for expected in [0u32, 1, 0xdead_beef, u32::MAX] {
            assert_eq!(read_u32(&mut cursor).unwrap(), expected);
        }
    }

    #[test]
    fn test_magic_mismatch() {
        let mut cursor = "packetdb".as_bytes();
        let err = expect_magic(&mut cursor, RULEDB_MAGIC).unwrap_err();
        assert!(matches!(err, Error::BadMagic { expected: "ruledb" }));
    }

    #[test]
    fn test_magic_match() {
        let mut buf = Vec::new();
        write_magic(&mut buf, PACKETDB_MAGIC).unwrap();
        let mut cursor = buf.as_slice();
        expect_magic(&mut cursor, PACKETDB_MAGIC).unwrap();
    }
}
