use serde::{Serialize, Serializer};
use std::fmt;

use crate::{Error, Result};

pub use bytes::Bytes;
pub use num_rational::Ratio;

/// Unsigned 8.8 fixed point, as used for volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FixedPointU8(Ratio<u16>);

impl FixedPointU8 {
    pub fn new(val: u8) -> Self {
        Self(Ratio::new_raw(val as u16 * 0x100, 0x100))
    }

    pub fn new_raw(val: u16) -> Self {
        Self(Ratio::new_raw(val, 0x100))
    }

    /// Nearest representable value, saturating at the ends of the range.
    pub fn from_f64(val: f64) -> Self {
        Self::new_raw((val * 256.0).round().clamp(0.0, u16::MAX as f64) as u16)
    }

    pub fn value(&self) -> u8 {
        self.0.to_integer() as u8
    }

    pub fn raw_value(&self) -> u16 {
        *self.0.numer()
    }

    pub fn to_f64(&self) -> f64 {
        *self.0.numer() as f64 / *self.0.denom() as f64
    }
}

/// Unsigned 16.16 fixed point, as used for rates, resolutions and track dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FixedPointU16(Ratio<u32>);

impl FixedPointU16 {
    pub fn new(val: u16) -> Self {
        Self(Ratio::new_raw(val as u32 * 0x10000, 0x10000))
    }

    pub fn new_raw(val: u32) -> Self {
        Self(Ratio::new_raw(val, 0x10000))
    }

    /// Nearest representable value, saturating at the ends of the range.
    pub fn from_f64(val: f64) -> Self {
        Self::new_raw((val * 65536.0).round().clamp(0.0, u32::MAX as f64) as u32)
    }

    pub fn value(&self) -> u16 {
        self.0.to_integer() as u16
    }

    pub fn raw_value(&self) -> u32 {
        *self.0.numer()
    }

    pub fn to_f64(&self) -> f64 {
        *self.0.numer() as f64 / *self.0.denom() as f64
    }
}

/// A four character atom type code.
///
/// Codes are compared byte-wise and are case-sensitive. Textual forms use
/// Latin-1, so `"©nam"` maps to the bytes `a9 6e 61 6d` used by iTunes.
#[derive(Default, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct FourCC {
    pub value: [u8; 4],
}

impl FourCC {
    pub const fn new(value: [u8; 4]) -> Self {
        Self { value }
    }
}

impl std::str::FromStr for FourCC {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut value = [0u8; 4];
        let mut chars = s.chars();
        for byte in &mut value {
            let c = chars
                .next()
                .ok_or(Error::InvalidData("expected exactly four characters in type code"))?;
            *byte = u8::try_from(u32::from(c))
                .map_err(|_err| Error::InvalidData("type code character outside Latin-1"))?;
        }
        if chars.next().is_some() {
            return Err(Error::InvalidData(
                "expected exactly four characters in type code",
            ));
        }
        Ok(Self { value })
    }
}

impl From<u32> for FourCC {
    fn from(number: u32) -> Self {
        Self {
            value: number.to_be_bytes(),
        }
    }
}

impl From<FourCC> for u32 {
    fn from(fourcc: FourCC) -> Self {
        (&fourcc).into()
    }
}

impl From<&FourCC> for u32 {
    fn from(fourcc: &FourCC) -> Self {
        Self::from_be_bytes(fourcc.value)
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self { value }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code: u32 = self.into();
        write!(f, "{self} / {code:#010X}")
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.value {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl Serialize for FourCC {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
