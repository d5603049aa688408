//! Initial run-length encoding (RLE1) for BZip2.
//!
//! Runs of 4 to 259 identical bytes are stored as four copies of the byte
//! followed by a count byte holding the number of extra copies (0-255).
//! Shorter runs are stored verbatim. The encoder side also maintains the
//! block CRC over the original bytes and the set of byte values in use,
//! both of which the block header needs.

use oxibz_core::crc::BzCrc32;
use oxibz_core::error::{BzError, Result};

/// Longest run a single `4 copies + count` group can describe.
pub const MAX_RUN_LENGTH: usize = 259;

/// Run length at which the next RLE1 byte is a count.
const RUN_THRESHOLD: u8 = 4;

/// Bytes a block can take past its limit: the group written by the push
/// that fills it, then the group written when the pending run is flushed.
const LIMIT_SLACK: usize = 2 * (RUN_THRESHOLD as usize + 1);

/// A block of RLE1 output waiting to be sorted.
#[derive(Debug, Clone)]
pub struct LiteralBlock {
    data: Vec<u8>,
    in_use: [bool; 256],
    crc: BzCrc32,
    limit: usize,
}

impl LiteralBlock {
    /// Allocate a block that holds at most `limit` encoded bytes.
    ///
    /// The buffer is reserved up front and never grows afterwards.
    pub fn with_limit(limit: usize) -> Result<Self> {
        let size = limit + LIMIT_SLACK;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| BzError::out_of_memory(size))?;
        Ok(Self {
            data,
            in_use: [false; 256],
            crc: BzCrc32::new(),
            limit,
        })
    }

    /// A block without a size limit, for whole-slice helpers.
    fn unbounded() -> Self {
        Self {
            data: Vec::new(),
            in_use: [false; 256],
            crc: BzCrc32::new(),
            limit: usize::MAX,
        }
    }

    /// Append a run of `len` copies of `byte` (1..=259).
    pub fn add_run(&mut self, byte: u8, len: usize) {
        debug_assert!((1..=MAX_RUN_LENGTH).contains(&len));
        self.crc.update_repeated(byte, len);
        self.in_use[byte as usize] = true;
        match len {
            1..=3 => self.data.extend(std::iter::repeat_n(byte, len)),
            _ => {
                let extra = (len - RUN_THRESHOLD as usize) as u8;
                self.data.extend_from_slice(&[byte; RUN_THRESHOLD as usize]);
                self.data.push(extra);
                self.in_use[extra as usize] = true;
            }
        }
    }

    /// Encoded bytes in the block.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte values that occur in the encoded block.
    pub fn in_use(&self) -> &[bool; 256] {
        &self.in_use
    }

    /// CRC of the original bytes added so far.
    pub fn crc(&self) -> u32 {
        self.crc.value()
    }

    /// Number of encoded bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no run has been added since the last reset.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the block reached its limit.
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.limit
    }

    /// Reset for the next block, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.in_use = [false; 256];
        self.crc.reset();
    }
}

/// Accumulates the current run of equal input bytes.
#[derive(Debug, Clone, Default)]
pub struct RunLengthEncoder {
    current: Option<u8>,
    run_len: usize,
}

impl RunLengthEncoder {
    /// Create an encoder with no pending run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run is waiting to be written.
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Feed one input byte.
    ///
    /// The pending run is written to `block` when `byte` differs from it or
    /// when it already has the maximum length.
    #[inline]
    pub fn push(&mut self, byte: u8, block: &mut LiteralBlock) {
        match self.current {
            Some(current) if current == byte && self.run_len < MAX_RUN_LENGTH => {
                self.run_len += 1;
            }
            Some(current) => {
                block.add_run(current, self.run_len);
                self.current = Some(byte);
                self.run_len = 1;
            }
            None => {
                self.current = Some(byte);
                self.run_len = 1;
            }
        }
    }

    /// Write the pending run, if any.
    pub fn flush(&mut self, block: &mut LiteralBlock) {
        if let Some(current) = self.current.take() {
            block.add_run(current, self.run_len);
            self.run_len = 0;
        }
    }
}

/// Undoes RLE1 one inverse-BWT byte at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunExpander {
    last: u8,
    run: u8,
}

impl RunExpander {
    /// Create an expander at the start of a block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next RLE1 byte and return `(byte, copies)` to emit.
    ///
    /// After four equal bytes the next input is a count, so `copies` can be
    /// anything from 0 to 255.
    #[inline]
    pub fn expand(&mut self, input: u8) -> (u8, usize) {
        if self.run == RUN_THRESHOLD {
            self.run = 0;
            return (self.last, input as usize);
        }
        if self.run > 0 && self.last == input {
            self.run += 1;
        } else {
            self.last = input;
            self.run = 1;
        }
        (input, 1)
    }
}

/// Encode data with initial RLE (rle1).
pub fn rle1_encode(data: &[u8]) -> Vec<u8> {
    let mut block = LiteralBlock::unbounded();
    let mut encoder = RunLengthEncoder::new();
    for &byte in data {
        encoder.push(byte, &mut block);
    }
    encoder.flush(&mut block);
    block.data
}

/// Decode RLE1-encoded data.
///
/// A trailing run of four without its count byte decodes to the four bytes.
pub fn rle1_decode(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() * 2);
    let mut expander = RunExpander::new();
    for &input in data {
        let (byte, copies) = expander.expand(input);
        result.extend(std::iter::repeat_n(byte, copies));
    }
    result
}
