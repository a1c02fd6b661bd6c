use std::io::{Read, Seek, Write};

use crate::stream::{AtomReader, AtomWriter};
use crate::{Error, FourCC, Result};

pub const HEADER_SIZE: u64 = 8;
pub const LARGE_HEADER_SIZE: u64 = 16;

/// The universal atom header: 32-bit size and type code, followed by a
/// 64-bit size when the 32-bit field holds the sentinel `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeader {
    /// Absolute stream offset of the first header byte.
    pub start: u64,
    pub kind: FourCC,
    /// Total size including the header. Zero means the atom extends to the
    /// end of its enclosing extent.
    pub size: u64,
    pub largesize: bool,
}

impl AtomHeader {
    pub fn header_size(&self) -> u64 {
        if self.largesize {
            LARGE_HEADER_SIZE
        } else {
            HEADER_SIZE
        }
    }

    pub fn read<R: Read + Seek>(reader: &mut AtomReader<R>) -> Result<Self> {
        let start = reader.position();
        let size = reader.read_u32()?;
        let kind = FourCC::from(reader.read_u32()?);

        if size == 1 {
            let largesize = reader.read_u64()?;
            // A largesize below 16 cannot even cover its own header; 0 keeps
            // its "to the end" meaning.
            let size = match largesize {
                0 => 0,
                1..=15 => return Err(Error::InvalidData("64-bit atom size too small")),
                16..=u64::MAX => largesize,
            };
            return Ok(Self {
                start,
                kind,
                size,
                largesize: true,
            });
        }

        if (2..8).contains(&size) {
            return Err(Error::MalformedContainer(
                kind,
                "atom size smaller than its header",
            ));
        }
        Ok(Self {
            start,
            kind,
            size: u64::from(size),
            largesize: false,
        })
    }

    /// Emits a header with a zero placeholder size and returns the offset and
    /// width of the size field to back-patch.
    pub fn write_placeholder<W: Write + Seek>(
        kind: FourCC,
        largesize: bool,
        writer: &mut AtomWriter<W>,
    ) -> Result<(u64, u8)> {
        let start = writer.position();
        if largesize {
            writer.write_uint(1, 4)?;
            writer.write_bytes(&kind.value)?;
            writer.write_uint(0, 8)?;
            Ok((start + HEADER_SIZE, 8))
        } else {
            writer.write_uint(0, 4)?;
            writer.write_bytes(&kind.value)?;
            Ok((start, 4))
        }
    }
}
