//! The four-byte bzip2 stream header.

use crate::{BZIP2_MAGIC, BZIP2_VERSION, CompressionLevel};
use oxibz_core::error::{BzError, Result};

/// A parsed `BZh<digit>` stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    level: CompressionLevel,
}

impl StreamHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 4;

    /// Header for streams compressed at `level`.
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    /// Parse a header.
    ///
    /// # Errors
    ///
    /// Returns [`BzError::DataErrorMagic`] unless `buf` is `BZh` followed by
    /// a digit in `1..=9`.
    pub fn parse(buf: [u8; 4]) -> Result<Self> {
        if buf[..2] != BZIP2_MAGIC {
            return Err(BzError::bad_magic(format!(
                "signature {:02x?} is not \"BZ\"",
                &buf[..2]
            )));
        }
        if buf[2] != BZIP2_VERSION {
            return Err(BzError::bad_magic(format!(
                "unsupported version byte {:#04x}",
                buf[2]
            )));
        }
        let level = CompressionLevel::from_digit(buf[3]).ok_or_else(|| {
            BzError::bad_magic(format!("invalid block size digit {:#04x}", buf[3]))
        })?;
        Ok(Self { level })
    }

    /// Encode the header.
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            BZIP2_MAGIC[0],
            BZIP2_MAGIC[1],
            BZIP2_VERSION,
            self.level.digit(),
        ]
    }

    /// The declared compression level.
    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// The declared maximum block size.
    pub fn block_size(&self) -> usize {
        self.level.block_size()
    }
}
