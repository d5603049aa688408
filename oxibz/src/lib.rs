//! Resumable bzip2 compression/decompression for OxiBz.
//!
//! This crate provides a pure Rust implementation of the bzip2 stream
//! format with call-level resumable engines:
//!
//! - [`BzEncoder`] is push-style: the caller feeds input and output slices
//!   with an [`Action`] (`Run`, `Flush`, `Finish`) and the encoder advances
//!   as far as the buffers allow.
//! - [`BzDecoder`] is pull-style: it owns a byte source and fills
//!   caller-sized output buffers, carrying partial block state across calls.
//!
//! BZip2 uses a pipeline of transformations:
//! 1. Run-Length Encoding (RLE) - runs of 4..=259 equal bytes become 4 bytes + count
//! 2. Burrows-Wheeler Transform (BWT) - block sorting for better compression
//! 3. Move-to-Front Transform (MTF) - locality transformation
//! 4. Zero-Run Length Encoding - RUNA/RUNB coding of MTF zeros
//! 5. Huffman Coding - up to 6 tables, switched every 50 symbols
//!
//! # Example
//!
//! ```
//! use oxibz::{CompressionLevel, compress, decompress};
//!
//! let data = b"hello hello hello hello";
//! let packed = compress(data, CompressionLevel::new(1)).unwrap();
//! assert_eq!(&packed[..4], b"BZh1");
//! let unpacked = decompress(&packed[..]).unwrap();
//! assert_eq!(unpacked, data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
/// Burrows-Wheeler Transform implementation.
pub mod bwt;
mod decode;
mod encode;
pub mod header;
pub mod huffman;
pub mod mtf;
pub mod rle;

pub use block::{BlockEncoder, HuffmanBlockEncoder};
pub use decode::{BzDecoder, decompress, decompress_to};
pub use encode::{BzEncoder, Mode, compress};
pub use header::StreamHeader;
pub use oxibz_core::{
    Action, BzError, CompressStatus, Compressor, CrcKind, DecompressStatus, Decompressor, Result,
};

/// BZip2 magic bytes ("BZ").
pub const BZIP2_MAGIC: [u8; 2] = [0x42, 0x5A];

/// Version byte following the magic ('h' for Huffman).
pub const BZIP2_VERSION: u8 = b'h';

/// Block header magic (BCD pi, 48 bits).
pub const BLOCK_MAGIC: u64 = 0x3141_5926_5359;

/// End of stream magic (BCD sqrt(pi), 48 bits).
pub const EOS_MAGIC: u64 = 0x1772_4538_5090;

/// Block size granularity; the header digit multiplies this.
pub const BLOCK_SIZE_UNIT: usize = 100_000;

/// Maximum block size (900k).
pub const MAX_BLOCK_SIZE: usize = 9 * BLOCK_SIZE_UNIT;

/// Bytes kept free at the end of every literal block for sort lookahead.
pub const BLOCK_OVERSHOOT: usize = 19;

/// Minimum number of Huffman tables per block.
pub const MIN_GROUPS: usize = 2;

/// Maximum number of Huffman tables per block.
pub const MAX_GROUPS: usize = 6;

/// Symbols coded with one table before the next selector applies.
pub const GROUP_SIZE: usize = 50;

/// Largest alphabet: RUNA, RUNB, 255 MTF positions and EOB.
pub const MAX_ALPHA_SIZE: usize = 258;

/// Run-length-of-zero pseudo-symbol adding `1 << position`.
pub const RUNA: u16 = 0;

/// Run-length-of-zero pseudo-symbol adding `2 << position`.
pub const RUNB: u16 = 1;

/// Compression level (1-9, where 9 = 900k block size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// Create a new compression level (clamped to 1-9).
    pub fn new(level: u8) -> Self {
        Self(level.clamp(1, 9))
    }

    /// Create a level from an ASCII block-size digit (`b'1'..=b'9'`).
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'1'..=b'9' => Some(Self(digit - b'0')),
            _ => None,
        }
    }

    /// The ASCII digit stored in the stream header.
    pub fn digit(&self) -> u8 {
        b'0' + self.0
    }

    /// Get the block size for this level.
    pub fn block_size(&self) -> usize {
        self.0 as usize * BLOCK_SIZE_UNIT
    }

    /// Most RLE-encoded bytes a block may hold before it is sorted.
    pub fn block_capacity(&self) -> usize {
        self.block_size() - BLOCK_OVERSHOOT
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(9)
    }
}

impl TryFrom<u8> for CompressionLevel {
    type Error = BzError;

    fn try_from(level: u8) -> Result<Self> {
        if (1..=9).contains(&level) {
            Ok(Self(level))
        } else {
            Err(BzError::param(format!(
                "block size factor must be 1-9, got {level}"
            )))
        }
    }
}
