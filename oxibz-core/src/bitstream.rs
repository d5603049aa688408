//! Bit-level I/O for the bzip2 format.
//!
//! This module provides `BitReader` and `BitWriter` for reading and writing
//! data at the bit level.
//!
//! # Bit Ordering
//!
//! bzip2 is MSB-first: the first bit of the stream is the most significant
//! bit of the first byte, and multi-bit fields are stored big-endian.
//!
//! # Example
//!
//! ```
//! use oxibz_core::bitstream::{BitReader, BitWriter};
//! use std::io::Cursor;
//!
//! let mut writer = BitWriter::new(Vec::new());
//! writer.write_bits(0b101, 3).unwrap();
//! writer.write_bits(0b1100, 4).unwrap();
//! let output = writer.finish().unwrap();
//! assert_eq!(output, vec![0b1011_1000]);
//!
//! let mut reader = BitReader::new(Cursor::new(output));
//! assert_eq!(reader.read_bits(3).unwrap(), 0b101);
//! assert_eq!(reader.read_bits(4).unwrap(), 0b1100);
//! ```

use crate::error::{BzError, Result};
use std::io::{ErrorKind, Read, Write};

/// Size of the fixed input window a `BitReader` refills from its source.
pub const INPUT_WINDOW_SIZE: usize = 4096;

/// A bit-level reader that pulls bytes from any `Read` implementation.
///
/// Input is staged through a fixed window of [`INPUT_WINDOW_SIZE`] bytes.
/// Bits are moved from the window into a 64-bit accumulator one byte at a
/// time, only when a request needs them.
#[derive(Debug)]
pub struct BitReader<R: Read> {
    /// Underlying reader.
    reader: R,
    /// Staged input bytes.
    window: Box<[u8]>,
    /// Next unread byte in `window`.
    window_pos: usize,
    /// Number of valid bytes in `window`.
    window_len: usize,
    /// Bit accumulator; the valid bits are the low `bits_in_buffer` bits,
    /// oldest bit highest.
    buffer: u64,
    /// Number of valid bits in the accumulator.
    bits_in_buffer: u8,
    /// Total bits consumed (for error reporting).
    total_bits_read: u64,
}

impl<R: Read> BitReader<R> {
    /// Create a new `BitReader` wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            window: vec![0u8; INPUT_WINDOW_SIZE].into_boxed_slice(),
            window_pos: 0,
            window_len: 0,
            buffer: 0,
            bits_in_buffer: 0,
            total_bits_read: 0,
        }
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Get a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consume this `BitReader` and return the underlying reader.
    ///
    /// Bytes already staged in the window are lost; see
    /// [`BitReader::unused_input`].
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Get the current bit position (for error reporting).
    pub fn bit_position(&self) -> u64 {
        self.total_bits_read
    }

    /// Staged bytes that have not been moved into the bit accumulator.
    pub fn unused_input(&self) -> &[u8] {
        &self.window[self.window_pos..self.window_len]
    }

    /// Fetch the next input byte, refilling the window if it is empty.
    fn next_byte(&mut self, needed_bits: u32) -> Result<u8> {
        if self.window_pos == self.window_len {
            loop {
                match self.reader.read(&mut self.window) {
                    Ok(0) => return Err(BzError::unexpected_eof(needed_bits)),
                    Ok(n) => {
                        self.window_pos = 0;
                        self.window_len = n;
                        break;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        let byte = self.window[self.window_pos];
        self.window_pos += 1;
        Ok(byte)
    }

    /// Ensure at least `count` bits are in the accumulator.
    #[inline]
    fn fill_buffer(&mut self, count: u8) -> Result<()> {
        while self.bits_in_buffer < count {
            let missing = u32::from(count - self.bits_in_buffer);
            let byte = self.next_byte(missing)?;
            self.buffer = (self.buffer << 8) | u64::from(byte);
            self.bits_in_buffer += 8;
        }
        Ok(())
    }

    /// Read up to 32 bits from the stream, MSB-first.
    #[inline]
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        let value = self.peek_bits(count)?;
        self.consume(count);
        Ok(value)
    }

    /// Peek at up to 32 bits without consuming them.
    #[inline]
    pub fn peek_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= 32, "Cannot peek more than 32 bits at once");

        if count == 0 {
            return Ok(0);
        }

        self.fill_buffer(count)?;

        let mask = (1u64 << count) - 1;
        Ok(((self.buffer >> (self.bits_in_buffer - count)) & mask) as u32)
    }

    /// Drop `count` bits that a previous peek made available.
    #[inline]
    pub fn consume(&mut self, count: u8) {
        debug_assert!(count <= self.bits_in_buffer);
        self.bits_in_buffer -= count;
        self.total_bits_read += u64::from(count);
    }

    /// Read a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Read a 32-bit big-endian field.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bits(32)
    }

    /// Discard bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let remainder = self.bits_in_buffer % 8;
        self.consume(remainder);
    }
}

/// A bit-level writer that wraps any `Write` implementation.
///
/// Complete bytes are written through as soon as they are formed; up to
/// seven bits stay pending until more bits arrive or [`BitWriter::finish`]
/// pads them out.
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    /// Underlying writer.
    writer: W,
    /// Bit buffer; pending bits are the low `bits_in_buffer` bits.
    buffer: u64,
    /// Number of pending bits.
    bits_in_buffer: u8,
    /// Total bits written.
    total_bits_written: u64,
}

impl<W: Write> BitWriter<W> {
    /// Create a new `BitWriter` wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: 0,
            bits_in_buffer: 0,
            total_bits_written: 0,
        }
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Get the total number of bits written so far.
    pub fn bits_written(&self) -> u64 {
        self.total_bits_written
    }

    /// Write up to 32 bits, MSB-first.
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u8) -> Result<()> {
        debug_assert!(count <= 32, "Cannot write more than 32 bits at once");

        if count == 0 {
            return Ok(());
        }

        let mask = if count == 32 {
            u32::MAX
        } else {
            (1u32 << count) - 1
        };

        self.buffer = (self.buffer << count) | u64::from(value & mask);
        self.bits_in_buffer += count;
        self.total_bits_written += u64::from(count);

        while self.bits_in_buffer >= 8 {
            let byte = (self.buffer >> (self.bits_in_buffer - 8)) as u8;
            self.writer.write_all(&[byte])?;
            self.bits_in_buffer -= 8;
        }
        Ok(())
    }

    /// Write a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(u32::from(bit), 1)
    }

    /// Write a byte (not necessarily aligned).
    pub fn write_u8(&mut self, byte: u8) -> Result<()> {
        self.write_bits(u32::from(byte), 8)
    }

    /// Write a 32-bit big-endian field.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bits(value, 32)
    }

    /// Pad to the next byte boundary with zero bits.
    pub fn align_to_byte(&mut self) -> Result<()> {
        if self.bits_in_buffer > 0 {
            let padding = 8 - self.bits_in_buffer;
            self.write_bits(0, padding)?;
        }
        Ok(())
    }

    /// Pad the final byte, flush the writer and return it.
    pub fn finish(mut self) -> Result<W> {
        self.align_to_byte()?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bitreader_basic() {
        // 0b10110101 = 0xB5
        let data = vec![0xB5];
        let mut reader = BitReader::new(Cursor::new(data));

        assert!(reader.read_bit().unwrap()); // MSB first
        assert!(!reader.read_bit().unwrap());
        assert!(reader.read_bit().unwrap());
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(4).unwrap(), 0b0101);
        assert_eq!(reader.bit_position(), 8);
    }

    #[test]
    fn test_bitreader_multi_byte() {
        let data = vec![0xFF, 0x00, 0x31, 0x41, 0x59];
        let mut reader = BitReader::new(Cursor::new(data));

        assert_eq!(reader.read_bits(4).unwrap(), 0xF);
        assert_eq!(reader.read_bits(8).unwrap(), 0xF0); // Crosses byte boundary
        assert_eq!(reader.read_bits(4).unwrap(), 0x0);
        assert_eq!(reader.read_bits(24).unwrap(), 0x314159);
    }

    #[test]
    fn test_bitreader_peek() {
        let data = vec![0xAB];
        let mut reader = BitReader::new(Cursor::new(data));

        assert_eq!(reader.peek_bits(4).unwrap(), 0xA);
        assert_eq!(reader.peek_bits(4).unwrap(), 0xA); // Same value
        assert_eq!(reader.read_bits(4).unwrap(), 0xA); // Now consume
        assert_eq!(reader.peek_bits(4).unwrap(), 0xB);
    }

    #[test]
    fn test_bitreader_eof() {
        let mut reader = BitReader::new(Cursor::new(vec![0x12]));
        assert_eq!(reader.read_bits(4).unwrap(), 0x1);
        let err = reader.read_bits(12).unwrap_err();
        assert!(matches!(err, BzError::UnexpectedEof { needed_bits: 8 }));
    }

    #[test]
    fn test_bitreader_read_u32_across_refill() {
        // Larger than one window so the read straddles a refill
        let mut data = vec![0u8; INPUT_WINDOW_SIZE - 2];
        data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let mut reader = BitReader::new(Cursor::new(data));
        for _ in 0..INPUT_WINDOW_SIZE - 2 {
            assert_eq!(reader.read_bits(8).unwrap(), 0);
        }
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_bitreader_unused_input() {
        let mut reader = BitReader::new(Cursor::new(vec![0xF0, 0x01, 0x02]));
        reader.read_bits(3).unwrap();
        reader.align_to_byte();
        assert_eq!(reader.unused_input(), &[0x01, 0x02]);
    }

    #[test]
    fn test_bitwriter_basic() {
        let mut writer = BitWriter::new(Vec::new());
        for bit in [true, false, true, true, false, true, false, true] {
            writer.write_bit(bit).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), vec![0xB5]);
    }

    #[test]
    fn test_bitwriter_partial_byte_padding() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bits(0b11, 2).unwrap();
        assert!(writer.get_ref().is_empty());
        writer.write_u32(0x1234_5678).unwrap();
        assert_eq!(writer.get_ref().len(), 4);
        assert_eq!(writer.bits_written(), 34);
        let out = writer.finish().unwrap();
        // 11 | 0001 0010 0011 0100 0101 0110 0111 1000 | 000000
        assert_eq!(out, vec![0xC4, 0x8D, 0x15, 0x9E, 0x00]);
    }

    #[test]
    fn test_roundtrip() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bits(0b101, 3).unwrap();
        writer.write_bits(0b1111, 4).unwrap();
        writer.write_bits(0b10, 2).unwrap();
        writer.write_bits(0x26_5359, 24).unwrap();
        writer.write_bits(0b110011, 6).unwrap();
        let output = writer.finish().unwrap();

        let mut reader = BitReader::new(Cursor::new(&output));
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1111);
        assert_eq!(reader.read_bits(2).unwrap(), 0b10);
        assert_eq!(reader.read_bits(24).unwrap(), 0x26_5359);
        assert_eq!(reader.read_bits(6).unwrap(), 0b110011);
    }
}
