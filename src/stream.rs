//! Positioned big-endian I/O over seekable byte sources and sinks.
//!
//! [`AtomReader`] bounds every read by the extent of the atom currently being
//! parsed, so a short atom surfaces as [`Error::TruncatedInput`] instead of
//! silently reading into its sibling. Both sides pack bitfields MSB-first and
//! re-align to a byte boundary before any byte-oriented access.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::{Bytes, Error, FourCC, Result};

/// The atom being read and the end of its byte extent.
#[derive(Debug, Clone, Copy)]
pub struct Extent {
    pub kind: FourCC,
    pub end: u64,
}

pub struct AtomReader<R> {
    inner: R,
    pos: u64,
    len: u64,
    extent: Extent,
    bit_buf: u8,
    bits_left: u8,
}

impl<R: Read + Seek> AtomReader<R> {
    /// Wraps `inner`, whose readable length starting at the current position is `len`.
    pub fn new(mut inner: R, len: u64) -> Result<Self> {
        let pos = inner.stream_position()?;
        let end = pos
            .checked_add(len)
            .ok_or(Error::InvalidData("stream length overflows"))?;
        Ok(Self {
            inner,
            pos,
            len: end,
            extent: Extent {
                kind: FourCC::default(),
                end,
            },
            bit_buf: 0,
            bits_left: 0,
        })
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Absolute end of the underlying stream.
    pub fn stream_end(&self) -> u64 {
        self.len
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Restricts reads to `extent`, returning the previous one for [`Self::leave`].
    pub fn enter(&mut self, extent: Extent) -> Extent {
        std::mem::replace(&mut self.extent, extent)
    }

    pub fn leave(&mut self, previous: Extent) {
        self.extent = previous;
    }

    pub fn remaining(&self) -> u64 {
        self.extent.end.saturating_sub(self.pos)
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        self.bits_left = 0;
        Ok(())
    }

    pub fn skip(&mut self, size: u64) -> Result<()> {
        self.ensure(size)?;
        self.seek_to(self.pos + size)
    }

    /// Drops any bits left over from a partially consumed byte.
    pub fn align(&mut self) {
        self.bits_left = 0;
    }

    fn ensure(&self, needed: u64) -> Result<()> {
        let available = self.remaining();
        if needed > available {
            return Err(Error::TruncatedInput {
                kind: self.extent.kind,
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Reads an unsigned big-endian integer `width` bytes wide (1, 2, 3, 4 or 8).
    pub fn read_uint(&mut self, width: u8) -> Result<u64> {
        self.align();
        self.ensure(u64::from(width))?;
        let value = match width {
            1 => u64::from(self.inner.read_u8()?),
            2 => u64::from(self.inner.read_u16::<BigEndian>()?),
            3 => u64::from(self.inner.read_u24::<BigEndian>()?),
            4 => u64::from(self.inner.read_u32::<BigEndian>()?),
            8 => self.inner.read_u64::<BigEndian>()?,
            _ => return Err(Error::InvalidData("unsupported integer width")),
        };
        self.pos += u64::from(width);
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.read_uint(4)? as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_uint(8)
    }

    /// Reads `count` bits, most significant first, continuing inside a byte
    /// left partially consumed by the previous bitfield.
    pub fn read_bits(&mut self, count: u8) -> Result<u64> {
        let mut value = 0u64;
        for _ in 0..count {
            if self.bits_left == 0 {
                self.ensure(1)?;
                self.bit_buf = self.inner.read_u8()?;
                self.pos += 1;
                self.bits_left = 8;
            }
            self.bits_left -= 1;
            value = (value << 1) | u64::from((self.bit_buf >> self.bits_left) & 1);
        }
        Ok(value)
    }

    pub fn read_bytes(&mut self, size: u64) -> Result<Bytes> {
        self.align();
        self.ensure(size)?;
        let len = usize::try_from(size)
            .map_err(|_err| Error::InvalidData("atom body does not fit in memory"))?;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        self.pos += size;
        Ok(Bytes::from(buf))
    }

    /// Reads up to and including a NUL byte, returning the bytes before it.
    pub fn read_null_terminated(&mut self) -> Result<Bytes> {
        self.align();
        let mut buf = Vec::new();
        loop {
            self.ensure(1)?;
            let byte = self.inner.read_u8()?;
            self.pos += 1;
            if byte == 0 {
                return Ok(Bytes::from(buf));
            }
            buf.push(byte);
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

pub struct AtomWriter<W> {
    inner: W,
    pos: u64,
    bit_buf: u8,
    bits_used: u8,
}

impl<W: Write + Seek> AtomWriter<W> {
    pub fn new(mut inner: W) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self {
            inner,
            pos,
            bit_buf: 0,
            bits_used: 0,
        })
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Emits a partially filled bitfield byte, zero padded on the right.
    pub fn flush_bits(&mut self) -> Result<()> {
        if self.bits_used > 0 {
            let byte = self.bit_buf << (8 - self.bits_used);
            self.inner.write_u8(byte)?;
            self.pos += 1;
            self.bit_buf = 0;
            self.bits_used = 0;
        }
        Ok(())
    }

    pub fn write_uint(&mut self, value: u64, width: u8) -> Result<()> {
        self.flush_bits()?;
        match width {
            1 => self.inner.write_u8(value as u8)?,
            2 => self.inner.write_u16::<BigEndian>(value as u16)?,
            3 => self.inner.write_u24::<BigEndian>(value as u32)?,
            4 => self.inner.write_u32::<BigEndian>(value as u32)?,
            8 => self.inner.write_u64::<BigEndian>(value)?,
            _ => return Err(Error::InvalidData("unsupported integer width")),
        }
        self.pos += u64::from(width);
        Ok(())
    }

    /// Appends the low `count` bits of `value`, most significant first. A byte
    /// is only emitted once all eight of its bits have been supplied.
    pub fn write_bits(&mut self, value: u64, count: u8) -> Result<()> {
        for i in (0..count).rev() {
            self.bit_buf = (self.bit_buf << 1) | ((value >> i) & 1) as u8;
            self.bits_used += 1;
            if self.bits_used == 8 {
                self.inner.write_u8(self.bit_buf)?;
                self.pos += 1;
                self.bit_buf = 0;
                self.bits_used = 0;
            }
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.flush_bits()?;
        self.inner.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    pub fn write_zeros(&mut self, size: u64) -> Result<()> {
        const ZEROS: [u8; 1024] = [0u8; 1024];

        self.flush_bits()?;
        let mut left = size;
        while left > 0 {
            let n = left.min(ZEROS.len() as u64) as usize;
            self.inner.write_all(&ZEROS[..n])?;
            left -= n as u64;
        }
        self.pos += size;
        Ok(())
    }

    /// Overwrites `width` bytes at `at` with `value` and returns to the current position.
    pub fn patch_uint(&mut self, at: u64, value: u64, width: u8) -> Result<()> {
        self.flush_bits()?;
        let here = self.pos;
        self.inner.seek(SeekFrom::Start(at))?;
        self.pos = at;
        self.write_uint(value, width)?;
        self.inner.seek(SeekFrom::Start(here))?;
        self.pos = here;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.flush_bits()?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
