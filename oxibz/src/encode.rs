//! BZip2 encoder.
//!
//! [`BzEncoder`] is a resumable push-style compressor. Each call to
//! [`BzEncoder::step`] consumes as much input and fills as much output as
//! the caller's slices allow and reports how far it got. Compressed blocks
//! are staged in an internal buffer and drained across as many calls as
//! the output slices require.

use crate::block::{BlockEncoder, HuffmanBlockEncoder};
use crate::header::StreamHeader;
use crate::rle::{LiteralBlock, RunLengthEncoder};
use crate::{BLOCK_MAGIC, CompressionLevel, EOS_MAGIC};
use log::{debug, warn};
use oxibz_core::error::{BzError, Result};
use oxibz_core::traits::{Action, CompressStatus, Compressor};
use oxibz_core::{BitWriter, combine_stream_crc};

/// What the encoder is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The stream trailer has been delivered; no further calls are valid.
    Idle,
    /// Accepting input.
    Running,
    /// Closing the current block on request.
    Flushing,
    /// Closing the last block and writing the trailer.
    Finishing,
    /// A block could not be encoded; every call reports that error.
    Failed,
}

/// Whether the staged output or the literal block is being worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Input,
    Output,
}

/// Resumable bzip2 compressor.
#[derive(Debug)]
pub struct BzEncoder<E: BlockEncoder = HuffmanBlockEncoder> {
    level: CompressionLevel,
    block: LiteralBlock,
    rle: RunLengthEncoder,
    block_encoder: E,
    /// Compressed bytes of the current block; partial bits stay pending.
    staged: BitWriter<Vec<u8>>,
    staged_pos: usize,
    mode: Mode,
    phase: Phase,
    /// Input still owed by the caller during a flush or finish.
    avail_in_expect: usize,
    combined_crc: u32,
    failure: Option<BzError>,
    header_written: bool,
    blocks: u64,
    total_in: u64,
    total_out: u64,
}

impl BzEncoder<HuffmanBlockEncoder> {
    /// Create an encoder with the standard block coder.
    ///
    /// All block-sized buffers are allocated here; the encoder does not
    /// allocate while running.
    pub fn new(level: CompressionLevel) -> Result<Self> {
        let block_encoder = HuffmanBlockEncoder::new(level.block_size())?;
        Self::with_block_encoder(level, block_encoder)
    }
}

impl<E: BlockEncoder> BzEncoder<E> {
    /// Create an encoder that hands filled blocks to `block_encoder`.
    pub fn with_block_encoder(level: CompressionLevel, block_encoder: E) -> Result<Self> {
        let capacity = level.block_capacity();
        let block = LiteralBlock::with_limit(capacity)?;

        // Room for a block that does not compress, plus the table overhead
        let staged_size = capacity + capacity / 8 + 1024;
        let mut staged = Vec::new();
        staged
            .try_reserve_exact(staged_size)
            .map_err(|_| BzError::out_of_memory(staged_size))?;

        debug!(
            "encoder start: level {}, block capacity {}",
            level.level(),
            capacity
        );

        Ok(Self {
            level,
            block,
            rle: RunLengthEncoder::new(),
            block_encoder,
            staged: BitWriter::new(staged),
            staged_pos: 0,
            mode: Mode::Running,
            phase: Phase::Input,
            avail_in_expect: 0,
            combined_crc: 0,
            failure: None,
            header_written: false,
            blocks: 0,
            total_in: 0,
            total_out: 0,
        })
    }

    /// The compression level.
    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// The current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Total input bytes consumed.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Total compressed bytes delivered.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Number of non-empty blocks compressed so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Advance the encoder.
    ///
    /// Returns `(consumed, produced, status)`. For [`Action::Flush`] and
    /// [`Action::Finish`], every follow-up call must pass exactly the input
    /// not yet consumed, with the same action, until the status reports
    /// completion.
    ///
    /// # Errors
    ///
    /// [`BzError::Sequence`] when the action or the input length breaks the
    /// protocol, or when the stream has already ended.
    pub fn step(
        &mut self,
        action: Action,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(usize, usize, CompressStatus)> {
        match self.mode {
            Mode::Idle => Err(BzError::sequence("stream has already ended")),
            Mode::Failed => Err(self.failure()),
            Mode::Running => match action {
                Action::Run => {
                    let (consumed, produced) = self.handle_or_fail(input, output)?;
                    Ok((consumed, produced, CompressStatus::RunOk))
                }
                Action::Flush => {
                    self.avail_in_expect = input.len();
                    self.mode = Mode::Flushing;
                    self.step(action, input, output)
                }
                Action::Finish => {
                    self.avail_in_expect = input.len();
                    self.mode = Mode::Finishing;
                    self.step(action, input, output)
                }
            },
            Mode::Flushing => {
                self.check_follow_up(action, Action::Flush, input.len())?;
                let (consumed, produced) = self.handle_or_fail(input, output)?;
                if self.has_pending_work() {
                    Ok((consumed, produced, CompressStatus::FlushOk))
                } else {
                    self.mode = Mode::Running;
                    Ok((consumed, produced, CompressStatus::RunOk))
                }
            }
            Mode::Finishing => {
                self.check_follow_up(action, Action::Finish, input.len())?;
                let (consumed, produced) = self.handle_or_fail(input, output)?;
                if self.has_pending_work() {
                    Ok((consumed, produced, CompressStatus::FinishOk))
                } else {
                    self.mode = Mode::Idle;
                    debug!(
                        "encoder end: {} blocks, {} bytes in, {} bytes out, crc {:#010x}",
                        self.blocks, self.total_in, self.total_out, self.combined_crc
                    );
                    Ok((consumed, produced, CompressStatus::StreamEnd))
                }
            }
        }
    }

    /// Release the encoder. Dropping it has the same effect.
    pub fn end(self) {}

    fn check_follow_up(&self, action: Action, expected: Action, avail_in: usize) -> Result<()> {
        if action != expected {
            return Err(BzError::sequence(format!(
                "{action:?} requested while a {expected:?} is in progress"
            )));
        }
        if avail_in != self.avail_in_expect {
            return Err(BzError::sequence(format!(
                "input length changed during {expected:?}: expected {}, got {avail_in}",
                self.avail_in_expect
            )));
        }
        Ok(())
    }

    /// Run [`Self::handle`], moving to [`Mode::Failed`] if it errors.
    ///
    /// Staged output and consumed input are no longer consistent after a
    /// failed block, so the stream cannot be continued.
    fn handle_or_fail(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize)> {
        self.handle(input, output).map_err(|err| {
            warn!("block {}: encoding failed: {err}", self.blocks + 1);
            self.failure = Some(err.duplicate());
            self.mode = Mode::Failed;
            err
        })
    }

    fn failure(&self) -> BzError {
        self.failure
            .as_ref()
            .map(BzError::duplicate)
            .unwrap_or_else(|| BzError::sequence("encoder failed"))
    }

    fn has_pending_work(&self) -> bool {
        self.avail_in_expect > 0 || !self.rle.is_empty() || self.staged_pos < self.staged_len()
    }

    fn staged_len(&self) -> usize {
        self.staged.get_ref().len()
    }

    /// Alternate between filling the block and draining staged output
    /// until neither can make progress.
    fn handle(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize)> {
        let mut consumed = 0;
        let mut produced = 0;

        loop {
            if self.phase == Phase::Output {
                produced += self.drain(&mut output[produced..]);
                if self.staged_pos < self.staged_len() {
                    break;
                }
                if self.mode == Mode::Finishing && self.avail_in_expect == 0 && self.rle.is_empty()
                {
                    break;
                }
                self.prepare_new_block();
                self.phase = Phase::Input;
                if self.mode == Mode::Flushing && self.avail_in_expect == 0 && self.rle.is_empty()
                {
                    break;
                }
            }

            consumed += self.copy_input(&input[consumed..]);
            if self.mode != Mode::Running && self.avail_in_expect == 0 {
                self.rle.flush(&mut self.block);
                self.compress_block(self.mode == Mode::Finishing)?;
                self.phase = Phase::Output;
            } else if self.block.is_full() {
                self.compress_block(false)?;
                self.phase = Phase::Output;
            } else if consumed == input.len() {
                break;
            }
        }

        Ok((consumed, produced))
    }

    /// Feed input through RLE1 into the block until it is full.
    fn copy_input(&mut self, input: &[u8]) -> usize {
        let limit = if self.mode == Mode::Running {
            input.len()
        } else {
            self.avail_in_expect.min(input.len())
        };

        let mut n = 0;
        while n < limit && !self.block.is_full() {
            self.rle.push(input[n], &mut self.block);
            n += 1;
        }

        if self.mode != Mode::Running {
            self.avail_in_expect -= n;
        }
        self.total_in += n as u64;
        n
    }

    /// Copy staged bytes into `output`.
    fn drain(&mut self, output: &mut [u8]) -> usize {
        let staged = &self.staged.get_ref()[self.staged_pos..];
        let n = staged.len().min(output.len());
        output[..n].copy_from_slice(&staged[..n]);
        self.staged_pos += n;
        self.total_out += n as u64;
        n
    }

    fn prepare_new_block(&mut self) {
        self.block.clear();
        self.staged.get_mut().clear();
        self.staged_pos = 0;
    }

    /// Encode the literal block into the staging buffer.
    ///
    /// Empty blocks produce no block record; the stream header and, for the
    /// last block, the trailer are still written.
    fn compress_block(&mut self, is_last: bool) -> Result<()> {
        if !self.header_written {
            for byte in StreamHeader::new(self.level).to_bytes() {
                self.staged.write_u8(byte)?;
            }
            self.header_written = true;
        }

        if !self.block.is_empty() {
            let block_crc = self.block.crc();
            let orig_ptr = self.block_encoder.sort(self.block.data())?;

            self.staged.write_bits((BLOCK_MAGIC >> 24) as u32, 24)?;
            self.staged.write_bits((BLOCK_MAGIC & 0xFF_FFFF) as u32, 24)?;
            self.staged.write_u32(block_crc)?;
            // Randomised flag, never set by modern encoders
            self.staged.write_bit(false)?;
            self.staged.write_bits(orig_ptr, 24)?;
            self.block_encoder
                .write_body(self.block.in_use(), &mut self.staged)?;

            self.combined_crc = combine_stream_crc(self.combined_crc, block_crc);
            self.blocks += 1;

            debug!(
                "block {}: {} bytes, crc {:#010x}, combined {:#010x}, primary index {}",
                self.blocks,
                self.block.len(),
                block_crc,
                self.combined_crc,
                orig_ptr
            );
        }

        if is_last {
            self.staged.write_bits((EOS_MAGIC >> 24) as u32, 24)?;
            self.staged.write_bits((EOS_MAGIC & 0xFF_FFFF) as u32, 24)?;
            self.staged.write_u32(self.combined_crc)?;
            self.staged.align_to_byte()?;
        }
        Ok(())
    }
}

impl<E: BlockEncoder> Compressor for BzEncoder<E> {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        action: Action,
    ) -> Result<(usize, usize, CompressStatus)> {
        self.step(action, input, output)
    }

    fn is_finished(&self) -> bool {
        self.mode == Mode::Idle
    }
}

/// Compress data in one call.
pub fn compress(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(level)?;
    encoder.compress_all(data)
}
