//! Error types for OxiBz operations.
//!
//! The variants mirror the failure classes of a bzip2 stream: API misuse,
//! resource exhaustion, structural corruption, integrity failures and short
//! I/O. Structural and integrity failures are kept apart so callers can tell
//! "this is not a valid stream" from "this stream parsed but its content is
//! wrong".

use std::io;
use thiserror::Error;

/// Which checksum failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcKind {
    /// Per-block CRC stored in the block header.
    Block,
    /// Combined CRC stored after the end-of-stream marker.
    Stream,
}

impl std::fmt::Display for CrcKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrcKind::Block => f.write_str("block"),
            CrcKind::Stream => f.write_str("stream"),
        }
    }
}

/// The main error type for OxiBz operations.
#[derive(Debug, Error)]
pub enum BzError {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Actions were issued out of the order the stream state machine allows.
    #[error("Sequence error: {message}")]
    Sequence {
        /// What the caller did wrong.
        message: String,
    },

    /// A parameter was outside its permitted range.
    #[error("Invalid parameter: {message}")]
    Param {
        /// Description of the bad parameter.
        message: String,
    },

    /// A stream buffer could not be allocated.
    #[error("Out of memory: could not allocate {bytes} bytes")]
    OutOfMemory {
        /// Size of the failed allocation.
        bytes: usize,
    },

    /// The input does not start with a bzip2 signature, or a block marker
    /// is neither a block nor an end-of-stream magic.
    #[error("Not bzip2 data: {message}")]
    DataErrorMagic {
        /// Description of what was found.
        message: String,
    },

    /// Structurally invalid compressed data.
    #[error("Data error at bit {bit_position}: {message}")]
    DataError {
        /// Bit position in the compressed stream where the error was noticed.
        bit_position: u64,
        /// Description of the corruption.
        message: String,
    },

    /// The stream uses the randomised-block feature removed in bzip2 0.9.5.
    #[error("Obsolete format: randomised blocks are not supported")]
    Obsolete,

    /// A stored checksum did not match the decoded content.
    #[error("{kind} CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Which checksum failed.
        kind: CrcKind,
        /// CRC stored in the stream.
        expected: u32,
        /// CRC computed from the decoded data.
        computed: u32,
    },

    /// The compressed source ended in the middle of the stream.
    #[error("Unexpected end of input: needed {needed_bits} more bits")]
    UnexpectedEof {
        /// Bits that were requested but not available.
        needed_bits: u32,
    },

    /// The output sink stopped accepting decoded bytes.
    #[error("Unexpected end of output: {pending} bytes could not be written")]
    OutputEof {
        /// Bytes that were left unwritten.
        pending: usize,
    },
}

/// Result type alias for OxiBz operations.
pub type Result<T> = std::result::Result<T, BzError>;

impl BzError {
    /// Create a sequence error.
    pub fn sequence(message: impl Into<String>) -> Self {
        Self::Sequence {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn param(message: impl Into<String>) -> Self {
        Self::Param {
            message: message.into(),
        }
    }

    /// Create an out of memory error.
    pub fn out_of_memory(bytes: usize) -> Self {
        Self::OutOfMemory { bytes }
    }

    /// Create a "not bzip2 data" error.
    pub fn bad_magic(message: impl Into<String>) -> Self {
        Self::DataErrorMagic {
            message: message.into(),
        }
    }

    /// Create a structural data error.
    pub fn data_error(bit_position: u64, message: impl Into<String>) -> Self {
        Self::DataError {
            bit_position,
            message: message.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(kind: CrcKind, expected: u32, computed: u32) -> Self {
        Self::CrcMismatch {
            kind,
            expected,
            computed,
        }
    }

    /// Create an unexpected end of input error.
    pub fn unexpected_eof(needed_bits: u32) -> Self {
        Self::UnexpectedEof { needed_bits }
    }

    /// Create an unexpected end of output error.
    pub fn output_eof(pending: usize) -> Self {
        Self::OutputEof { pending }
    }

    /// Whether the error reports damaged content rather than a damaged
    /// structure.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::CrcMismatch { .. })
    }

    /// Whether the error reports a structurally invalid stream.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DataError { .. } | Self::DataErrorMagic { .. } | Self::Obsolete
        )
    }

    /// Duplicate the error for sticky reporting.
    ///
    /// `io::Error` is not `Clone`, so the I/O variant keeps its kind and
    /// message only.
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Sequence { message } => Self::sequence(message.clone()),
            Self::Param { message } => Self::param(message.clone()),
            Self::OutOfMemory { bytes } => Self::out_of_memory(*bytes),
            Self::DataErrorMagic { message } => Self::bad_magic(message.clone()),
            Self::DataError {
                bit_position,
                message,
            } => Self::data_error(*bit_position, message.clone()),
            Self::Obsolete => Self::Obsolete,
            Self::CrcMismatch {
                kind,
                expected,
                computed,
            } => Self::crc_mismatch(*kind, *expected, *computed),
            Self::UnexpectedEof { needed_bits } => Self::unexpected_eof(*needed_bits),
            Self::OutputEof { pending } => Self::output_eof(*pending),
        }
    }
}

impl From<BzError> for io::Error {
    fn from(err: BzError) -> Self {
        let kind = match &err {
            BzError::Io(e) => e.kind(),
            BzError::UnexpectedEof { .. } => io::ErrorKind::UnexpectedEof,
            BzError::OutputEof { .. } => io::ErrorKind::WriteZero,
            BzError::OutOfMemory { .. } => io::ErrorKind::OutOfMemory,
            BzError::Sequence { .. } | BzError::Param { .. } => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::InvalidData,
        };
        match err {
            BzError::Io(e) => e,
            other => io::Error::new(kind, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BzError::crc_mismatch(CrcKind::Block, 0x12345678, 0xDEADBEEF);
        let text = err.to_string();
        assert!(text.contains("block CRC mismatch"));
        assert!(text.contains("0x12345678"));

        let err = BzError::data_error(42, "bad selector");
        assert!(err.to_string().contains("bit 42"));

        assert!(BzError::Obsolete.to_string().contains("randomised"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BzError = io_err.into();
        assert!(matches!(err, BzError::Io(_)));
    }

    #[test]
    fn test_into_io_error_kind() {
        let err: io::Error = BzError::unexpected_eof(8).into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err: io::Error = BzError::crc_mismatch(CrcKind::Stream, 1, 2).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err: io::Error = BzError::sequence("run after finish").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_classification() {
        assert!(BzError::crc_mismatch(CrcKind::Block, 0, 1).is_integrity());
        assert!(!BzError::crc_mismatch(CrcKind::Block, 0, 1).is_structural());
        assert!(BzError::data_error(0, "x").is_structural());
        assert!(BzError::bad_magic("x").is_structural());
        assert!(!BzError::unexpected_eof(1).is_structural());
    }

    #[test]
    fn test_duplicate_keeps_variant() {
        let err = BzError::crc_mismatch(CrcKind::Stream, 7, 9);
        assert!(matches!(
            err.duplicate(),
            BzError::CrcMismatch {
                kind: CrcKind::Stream,
                expected: 7,
                computed: 9
            }
        ));
        let err = BzError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        match err.duplicate() {
            BzError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {other:?}"),
        }
    }
}
