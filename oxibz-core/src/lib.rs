//! # OxiBz Core
//!
//! Core components for the OxiBz bzip2 codec.
//!
//! - [`bitstream`]: MSB-first bit-level I/O
//! - [`crc`]: CRC-32/BZIP2 and the combined stream CRC
//! - [`traits`]: Streaming compressor/decompressor traits
//! - [`error`]: Error types
//!
//! ## Example
//!
//! ```rust
//! use oxibz_core::bitstream::BitReader;
//! use oxibz_core::crc::BzCrc32;
//! use std::io::Cursor;
//!
//! let mut reader = BitReader::new(Cursor::new(vec![0x42, 0x5A]));
//! assert_eq!(reader.read_bits(16).unwrap(), 0x425A);
//!
//! assert_eq!(BzCrc32::compute(b"123456789"), 0xFC891918);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod crc;
pub mod error;
pub mod traits;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use crc::{BzCrc32, combine_stream_crc};
pub use error::{BzError, CrcKind, Result};
pub use traits::{Action, CompressStatus, Compressor, DecompressStatus, Decompressor};
