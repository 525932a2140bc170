//! LRC and CRC-16 (polynomial 0x1021) checksums used to build and validate
//! reader frames.
//!
//! The CRC-16 lookup table is built lazily on first use and shared read-only
//! by every caller afterwards.

use std::sync::OnceLock;

use crate::types::ReaderError;

/// CRC-16/CCITT polynomial (x^16 + x^12 + x^5 + 1)
pub const CRC16_POLY: u16 = 0x1021;

/// Initial register value for the EPC CRC-16
pub const CRC16_INIT: u16 = 0xFFFF;

static CRC16_TABLE: OnceLock<[u16; 256]> = OnceLock::new();

/// Build the MSB-first lookup table for [`CRC16_POLY`].
fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];

    for (i, slot) in table.iter_mut().enumerate() {
        let mut crc: u16 = 0;
        let mut c = (i as u16) << 8;

        for _ in 0..8 {
            if (crc ^ c) & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
            c <<= 1;
        }

        *slot = crc;
    }

    table
}

/// Shared CRC-16 lookup table, computed on first access.
pub fn crc16_table() -> &'static [u16; 256] {
    CRC16_TABLE.get_or_init(generate_crc16_table)
}

/// Longitudinal redundancy check: two's complement of the byte sum.
///
/// Appending the result to `data` makes the LRC of the whole sequence zero,
/// which is how received R2000 frames are validated.
pub fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

/// Table-driven CRC-16 (poly 0x1021, MSB first) continuing from `crc`.
///
/// No final XOR is applied; see [`epc16`] for the finalized variant.
pub fn crc16_1021(data: &[u8], crc: u16) -> u16 {
    let table = crc16_table();

    data.iter().fold(crc, |crc, &b| {
        let idx = ((crc >> 8) ^ b as u16) & 0x00FF;
        (crc << 8) ^ table[idx as usize]
    })
}

/// EPC Gen2 CRC-16: init 0xFFFF, poly 0x1021, output inverted.
///
/// ```
/// assert_eq!(magicrf::checksum::epc16(b"123456789"), 54862);
/// ```
pub fn epc16(data: &[u8]) -> u16 {
    crc16_1021(data, CRC16_INIT) ^ 0xFFFF
}

/// Checksum input: either a byte buffer or a single byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumInput<'a> {
    Bytes(&'a [u8]),
    Byte(u8),
}

impl ChecksumInput<'_> {
    fn with_bytes<R>(self, f: impl FnOnce(&[u8]) -> R) -> R {
        match self {
            ChecksumInput::Bytes(bytes) => f(bytes),
            ChecksumInput::Byte(b) => f(&[b]),
        }
    }
}

impl<'a> From<&'a [u8]> for ChecksumInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ChecksumInput::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for ChecksumInput<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        ChecksumInput::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for ChecksumInput<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        ChecksumInput::Bytes(bytes)
    }
}

impl From<u8> for ChecksumInput<'_> {
    fn from(b: u8) -> Self {
        ChecksumInput::Byte(b)
    }
}

impl TryFrom<i64> for ChecksumInput<'_> {
    type Error = ReaderError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value).map(ChecksumInput::Byte).map_err(|_| {
            ReaderError::InvalidArgument(format!(
                "checksum input must be a byte buffer or an integer in 0..=255, got {}",
                value
            ))
        })
    }
}

/// [`lrc`] over any accepted input shape.
pub fn lrc_of<'a>(input: impl Into<ChecksumInput<'a>>) -> u8 {
    input.into().with_bytes(lrc)
}

/// [`epc16`] over any accepted input shape.
pub fn epc16_of<'a>(input: impl Into<ChecksumInput<'a>>) -> u16 {
    input.into().with_bytes(epc16)
}
