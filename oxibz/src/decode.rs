//! BZip2 decoder.
//!
//! [`BzDecoder`] pulls compressed bytes from a reader and writes
//! decompressed bytes into caller-sized buffers. A block is Huffman-decoded
//! and linked for the inverse BWT in one go, then emitted lazily across as
//! many [`BzDecoder::read`] calls as the output buffers require.

use crate::bwt::link_successors;
use crate::header::StreamHeader;
use crate::huffman::{HuffmanTable, MAX_CODE_LEN};
use crate::mtf::MtfList;
use crate::rle::RunExpander;
use crate::{BLOCK_MAGIC, EOS_MAGIC, GROUP_SIZE, MAX_ALPHA_SIZE, MAX_GROUPS, MIN_GROUPS, RUNB};
use log::{debug, warn};
use oxibz_core::error::{BzError, CrcKind, Result};
use oxibz_core::traits::{DecompressStatus, Decompressor};
use oxibz_core::{BitReader, BzCrc32, combine_stream_crc};
use std::io::{self, ErrorKind, Read, Write};

/// Largest selector count the 15-bit field can hold.
const MAX_SELECTORS: usize = (1 << 15) - 1;

#[derive(Debug)]
enum State {
    /// Between blocks; the next call reads a block or the trailer.
    NeedBlock,
    /// A decoded block is being written out.
    Emitting,
    /// The trailer was read and the stream CRC matched.
    Done,
    /// A previous call failed; every later call reports the same error.
    Failed(BzError),
}

/// Position of the output walk through the current block.
#[derive(Debug, Default)]
struct Walk {
    pos: usize,
    remaining: usize,
    expander: RunExpander,
    byte: u8,
    copies: usize,
}

impl Walk {
    fn is_finished(&self) -> bool {
        self.remaining == 0 && self.copies == 0
    }
}

/// BZip2 decoder.
#[derive(Debug)]
pub struct BzDecoder<R: Read> {
    reader: BitReader<R>,
    header: StreamHeader,
    capacity: usize,
    /// Huffman/MTF output of the current block (the BWT column).
    bytes: Vec<u8>,
    /// Inverse BWT successor links.
    next: Vec<u32>,
    byte_counts: [u32; 256],
    sym_to_byte: [u8; 256],
    selectors: Vec<u8>,
    tables: Vec<HuffmanTable>,
    mtf: MtfList,
    walk: Walk,
    block_crc: BzCrc32,
    stored_block_crc: u32,
    combined_crc: u32,
    state: State,
    blocks: u64,
    total_out: u64,
}

fn alloc<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| BzError::out_of_memory(len * std::mem::size_of::<T>()))?;
    Ok(buf)
}

impl<R: Read> BzDecoder<R> {
    /// Create a new decoder and read the stream header.
    ///
    /// Block-sized buffers are allocated only after the header is valid.
    ///
    /// # Errors
    ///
    /// [`BzError::DataErrorMagic`] when the input does not start with a
    /// bzip2 header, [`BzError::UnexpectedEof`] when it is shorter than one,
    /// and [`BzError::OutOfMemory`] when the buffers cannot be allocated.
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = BitReader::new(reader);
        let mut magic = [0u8; StreamHeader::SIZE];
        for byte in &mut magic {
            *byte = reader.read_bits(8)? as u8;
        }
        let header = StreamHeader::parse(magic)?;
        let capacity = header.block_size();

        let bytes = alloc::<u8>(capacity)?;
        let mut next = alloc::<u32>(capacity)?;
        next.resize(capacity, 0);
        let selectors = alloc::<u8>(MAX_SELECTORS)?;

        debug!("stream header: block size {}", capacity);

        Ok(Self {
            reader,
            header,
            capacity,
            bytes,
            next,
            byte_counts: [0; 256],
            sym_to_byte: [0; 256],
            selectors,
            tables: Vec::with_capacity(MAX_GROUPS),
            mtf: MtfList::new(),
            walk: Walk::default(),
            block_crc: BzCrc32::new(),
            stored_block_crc: 0,
            combined_crc: 0,
            state: State::NeedBlock,
            blocks: 0,
            total_out: 0,
        })
    }

    /// The parsed stream header.
    pub fn header(&self) -> StreamHeader {
        self.header
    }

    /// Get the block size.
    pub fn block_size(&self) -> usize {
        self.capacity
    }

    /// Number of blocks started so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Total decompressed bytes delivered.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Whether the trailer has been read and verified.
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Input read from the source but not consumed by the stream.
    ///
    /// After the trailer this is the start of whatever follows the stream.
    pub fn unused_input(&self) -> &[u8] {
        self.reader.unused_input()
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Consume the decoder, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Decompress into `out`.
    ///
    /// Returns the number of bytes written and whether the stream has ended.
    /// If a block fails its CRC check after some of its bytes were written
    /// in this call, those bytes are returned first and the error is
    /// reported by the next call. Once an error is reported the decoder
    /// keeps reporting it.
    pub fn read(&mut self, out: &mut [u8]) -> Result<(usize, DecompressStatus)> {
        let mut written = 0;
        loop {
            match self.state {
                State::Done => return Ok((written, DecompressStatus::Done)),
                State::Failed(ref err) => {
                    if written > 0 {
                        return Ok((written, DecompressStatus::NeedsOutput));
                    }
                    return Err(err.duplicate());
                }
                State::Emitting => {
                    written += self.emit(&mut out[written..]);
                    if !self.walk.is_finished() {
                        return Ok((written, DecompressStatus::NeedsOutput));
                    }
                    self.state = match self.finish_block() {
                        Ok(()) => State::NeedBlock,
                        Err(err) => State::Failed(err),
                    };
                }
                State::NeedBlock => {
                    self.state = match self.start_block() {
                        Ok(true) => State::Emitting,
                        Ok(false) => State::Done,
                        Err(err) => {
                            warn!("bzip2 stream rejected: {err}");
                            State::Failed(err)
                        }
                    };
                }
            }
        }
    }

    /// Write as much of the current block as fits into `out`.
    fn emit(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while n < out.len() {
            if self.walk.copies > 0 {
                let take = self.walk.copies.min(out.len() - n);
                out[n..n + take].fill(self.walk.byte);
                n += take;
                self.walk.copies -= take;
                continue;
            }
            if self.walk.remaining == 0 {
                break;
            }
            let input = self.bytes[self.walk.pos];
            self.walk.pos = self.next[self.walk.pos] as usize;
            self.walk.remaining -= 1;
            let (byte, copies) = self.walk.expander.expand(input);
            self.walk.byte = byte;
            self.walk.copies = copies;
        }
        self.block_crc.update(&out[..n]);
        self.total_out += n as u64;
        n
    }

    /// Check the CRC of the block that was just emitted.
    fn finish_block(&mut self) -> Result<()> {
        let computed = self.block_crc.value();
        self.combined_crc = combine_stream_crc(self.combined_crc, computed);
        if computed != self.stored_block_crc {
            warn!(
                "block {}: crc mismatch, stored {:#010x}, computed {:#010x}",
                self.blocks, self.stored_block_crc, computed
            );
            return Err(BzError::crc_mismatch(
                CrcKind::Block,
                self.stored_block_crc,
                computed,
            ));
        }
        Ok(())
    }

    /// Read the next block, or the trailer.
    ///
    /// Returns `false` when the trailer was read and verified.
    fn start_block(&mut self) -> Result<bool> {
        let hi = u64::from(self.reader.read_bits(24)?);
        let lo = u64::from(self.reader.read_bits(24)?);
        let magic = (hi << 24) | lo;

        if magic == EOS_MAGIC {
            let stored = self.reader.read_u32()?;
            if stored != self.combined_crc {
                return Err(BzError::crc_mismatch(
                    CrcKind::Stream,
                    stored,
                    self.combined_crc,
                ));
            }
            self.reader.align_to_byte();
            debug!(
                "end of stream: {} blocks, {} bytes, crc {:#010x}",
                self.blocks, self.total_out, stored
            );
            return Ok(false);
        }
        if magic != BLOCK_MAGIC {
            return Err(BzError::bad_magic(format!(
                "expected block or end-of-stream magic, found {magic:#014x}"
            )));
        }

        self.stored_block_crc = self.reader.read_u32()?;
        if self.reader.read_bit()? {
            return Err(BzError::Obsolete);
        }
        let orig_ptr = self.reader.read_bits(24)? as usize;
        if orig_ptr >= self.capacity {
            return Err(self.corrupt(format!(
                "primary index {orig_ptr} exceeds block size {}",
                self.capacity
            )));
        }

        let symbols_in_use = self.read_symbol_map()?;
        let alpha_size = symbols_in_use + 2;
        let n_groups = self.read_selectors()?;
        self.read_tables(n_groups, alpha_size)?;
        self.decode_symbols(symbols_in_use)?;

        let len = self.bytes.len();
        if len > 0 && orig_ptr >= len {
            return Err(self.corrupt(format!(
                "primary index {orig_ptr} outside block of {len} bytes"
            )));
        }
        if len > 0 {
            link_successors(&self.bytes, &self.byte_counts, &mut self.next[..len]);
        }

        self.walk = Walk {
            pos: if len > 0 { self.next[orig_ptr] as usize } else { 0 },
            remaining: len,
            ..Walk::default()
        };
        self.block_crc.reset();
        self.blocks += 1;

        debug!(
            "block {}: {} symbols in use, {} tables, {} selectors, {} bytes, primary index {}",
            self.blocks,
            symbols_in_use,
            n_groups,
            self.selectors.len(),
            len,
            orig_ptr
        );
        Ok(true)
    }

    fn corrupt(&self, message: impl Into<String>) -> BzError {
        BzError::data_error(self.reader.bit_position(), message)
    }

    /// Read the two-level bitmap of byte values used by the block.
    fn read_symbol_map(&mut self) -> Result<usize> {
        let ranges = self.reader.read_bits(16)?;
        let mut count = 0;
        for range in 0..16 {
            if ranges & (0x8000 >> range) == 0 {
                continue;
            }
            let bits = self.reader.read_bits(16)?;
            for j in 0..16 {
                if bits & (0x8000 >> j) != 0 {
                    self.sym_to_byte[count] = (range * 16 + j) as u8;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return Err(self.corrupt("block uses no symbols"));
        }
        Ok(count)
    }

    /// Read the table count and the MTF/unary coded selector list.
    fn read_selectors(&mut self) -> Result<usize> {
        let n_groups = self.reader.read_bits(3)? as usize;
        if !(MIN_GROUPS..=MAX_GROUPS).contains(&n_groups) {
            return Err(self.corrupt(format!("invalid Huffman table count {n_groups}")));
        }
        let n_selectors = self.reader.read_bits(15)? as usize;
        if n_selectors == 0 {
            return Err(self.corrupt("block has no selectors"));
        }

        let mut order: [u8; MAX_GROUPS] = std::array::from_fn(|i| i as u8);
        self.selectors.clear();
        for _ in 0..n_selectors {
            let mut pos = 0;
            while self.reader.read_bit()? {
                pos += 1;
                if pos >= n_groups {
                    return Err(self.corrupt("selector refers to a missing table"));
                }
            }
            let selector = order[pos];
            order[..=pos].rotate_right(1);
            self.selectors.push(selector);
        }
        Ok(n_groups)
    }

    /// Read the delta-coded code lengths of every table.
    fn read_tables(&mut self, n_groups: usize, alpha_size: usize) -> Result<()> {
        let mut lengths = [0u8; MAX_ALPHA_SIZE];
        self.tables.clear();
        for _ in 0..n_groups {
            let mut len = self.reader.read_bits(5)? as i32;
            for slot in lengths[..alpha_size].iter_mut() {
                loop {
                    if !(1..=i32::from(MAX_CODE_LEN)).contains(&len) {
                        return Err(self.corrupt(format!("code length {len} out of range")));
                    }
                    let bits = self.reader.peek_bits(2)?;
                    if bits < 0b10 {
                        self.reader.consume(1);
                        break;
                    }
                    self.reader.consume(2);
                    len += if bits == 0b10 { 1 } else { -1 };
                }
                *slot = len as u8;
            }
            let table = HuffmanTable::from_lengths(&lengths[..alpha_size]).map_err(|err| match err {
                BzError::DataError { message, .. } => self.corrupt(message),
                other => other,
            })?;
            self.tables.push(table);
        }
        Ok(())
    }

    /// Huffman, zero-run and MTF decode the block into `self.bytes`.
    fn decode_symbols(&mut self, symbols_in_use: usize) -> Result<()> {
        let eob = symbols_in_use + 1;
        self.bytes.clear();
        self.byte_counts = [0; 256];
        self.mtf.reset();

        let mut run_len = 0usize;
        let mut run_weight = 0usize;
        let mut selector_index = 0;
        let mut group_left = 0;
        let mut table = 0;

        loop {
            if group_left == 0 {
                let Some(&selector) = self.selectors.get(selector_index) else {
                    return Err(self.corrupt("ran out of selectors"));
                };
                table = selector as usize;
                selector_index += 1;
                group_left = GROUP_SIZE;
            }
            group_left -= 1;

            let symbol = self.tables[table].decode(&mut self.reader)? as usize;

            if symbol <= RUNB as usize {
                if run_weight == 0 {
                    run_weight = 1;
                    run_len = 0;
                }
                run_len += run_weight << symbol;
                if run_len > self.capacity {
                    return Err(self.corrupt("zero run exceeds block size"));
                }
                run_weight <<= 1;
                continue;
            }

            if run_weight != 0 {
                run_weight = 0;
                if self.bytes.len() + run_len > self.capacity {
                    return Err(self.corrupt("zero run exceeds block size"));
                }
                let byte = self.sym_to_byte[self.mtf.front() as usize];
                self.byte_counts[byte as usize] += run_len as u32;
                let new_len = self.bytes.len() + run_len;
                self.bytes.resize(new_len, byte);
            }

            if symbol >= eob {
                break;
            }

            if self.bytes.len() >= self.capacity {
                return Err(self.corrupt("block exceeds declared size"));
            }
            let byte = self.sym_to_byte[self.mtf.move_to_front(symbol - 1) as usize];
            self.byte_counts[byte as usize] += 1;
            self.bytes.push(byte);
        }
        Ok(())
    }
}

impl<R: Read> Decompressor for BzDecoder<R> {
    fn decompress(&mut self, output: &mut [u8]) -> Result<(usize, DecompressStatus)> {
        self.read(output)
    }

    fn is_finished(&self) -> bool {
        self.is_done()
    }
}

impl<R: Read> Read for BzDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match BzDecoder::read(self, buf) {
            Ok((n, _)) => Ok(n),
            Err(err) => Err(err.into()),
        }
    }
}

/// Decompress BZip2 data.
pub fn decompress<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(reader)?;
    decoder.decompress_all()
}

/// Decompress a stream into a writer, returning the number of bytes written.
///
/// # Errors
///
/// Besides decoding errors, [`BzError::OutputEof`] when the writer stops
/// accepting bytes.
pub fn decompress_to<R: Read, W: Write>(reader: R, mut writer: W) -> Result<u64> {
    let mut decoder = BzDecoder::new(reader)?;
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let (produced, status) = decoder.read(&mut buffer)?;
        let mut chunk = &buffer[..produced];
        while !chunk.is_empty() {
            match writer.write(chunk) {
                Ok(0) => return Err(BzError::output_eof(chunk.len())),
                Ok(n) => chunk = &chunk[n..],
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if status == DecompressStatus::Done {
            break;
        }
    }
    writer.flush()?;
    Ok(decoder.total_out())
}
