//! Block encoding: BWT, MTF/zero-run coding and multi-table Huffman.
//!
//! The stream encoder hands each filled RLE1 block to a [`BlockEncoder`].
//! Encoding happens in two phases so the stream encoder can write the block
//! header (which carries the BWT primary index) between them.

use crate::bwt::{RotationSorter, last_column};
use crate::huffman::{MAX_ENCODE_CODE_LEN, assign_codes, build_code_lengths};
use crate::mtf::encode_symbols;
use crate::{GROUP_SIZE, MAX_ALPHA_SIZE, MAX_GROUPS};
use log::trace;
use oxibz_core::BitWriter;
use oxibz_core::error::{BzError, Result};

/// Turns one RLE1 block into its compressed bit representation.
pub trait BlockEncoder {
    /// Sort `block` and return the BWT primary index.
    fn sort(&mut self, block: &[u8]) -> Result<u32>;

    /// Write everything after the block header for the block last passed to
    /// [`BlockEncoder::sort`]: symbol map, tables, selectors and coded data.
    ///
    /// `in_use` marks the byte values present in that block.
    fn write_body(&mut self, in_use: &[bool; 256], out: &mut BitWriter<Vec<u8>>) -> Result<()>;
}

/// Code length given to symbols inside a table's initial frequency band.
const LESSER_ICOST: u8 = 0;
/// Code length given to symbols outside it.
const GREATER_ICOST: u8 = 15;
/// Refinement passes over the table assignment.
const ITERATIONS: usize = 4;

/// Number of Huffman tables to use for a block of `n_symbols` coded symbols.
fn group_count(n_symbols: usize) -> usize {
    match n_symbols {
        0..200 => 2,
        200..600 => 3,
        600..1200 => 4,
        1200..2400 => 5,
        _ => 6,
    }
}

/// The standard bzip2 block coder.
#[derive(Debug)]
pub struct HuffmanBlockEncoder {
    sorter: RotationSorter,
    bwt: Vec<u8>,
    symbols: Vec<u16>,
    selectors: Vec<u8>,
}

impl HuffmanBlockEncoder {
    /// Allocate working buffers for blocks of up to `block_size` bytes.
    pub fn new(block_size: usize) -> Result<Self> {
        let mut bwt = Vec::new();
        bwt.try_reserve_exact(block_size)
            .map_err(|_| BzError::out_of_memory(block_size))?;
        let mut symbols = Vec::new();
        symbols
            .try_reserve_exact(block_size + 1)
            .map_err(|_| BzError::out_of_memory(2 * (block_size + 1)))?;
        Ok(Self {
            sorter: RotationSorter::with_capacity(block_size)?,
            bwt,
            symbols,
            selectors: Vec::new(),
        })
    }

    /// Initial table lengths: table `t` is cheap for one contiguous band of
    /// symbols holding roughly `1 / n_groups` of the frequency mass.
    fn initial_lengths(
        freqs: &[u32; MAX_ALPHA_SIZE],
        alpha_size: usize,
        n_symbols: usize,
        n_groups: usize,
        lengths: &mut [[u8; MAX_ALPHA_SIZE]; MAX_GROUPS],
    ) {
        let mut remaining = n_symbols as i64;
        let mut band_start = 0i64;
        for n_part in (1..=n_groups).rev() {
            let target = remaining / n_part as i64;
            let mut band_end = band_start - 1;
            let mut acc = 0i64;
            while acc < target && band_end < alpha_size as i64 - 1 {
                band_end += 1;
                acc += i64::from(freqs[band_end as usize]);
            }
            if band_end > band_start
                && n_part != n_groups
                && n_part != 1
                && (n_groups - n_part) % 2 == 1
            {
                acc -= i64::from(freqs[band_end as usize]);
                band_end -= 1;
            }

            for (v, len) in lengths[n_part - 1][..alpha_size].iter_mut().enumerate() {
                let v = v as i64;
                *len = if v >= band_start && v <= band_end {
                    LESSER_ICOST
                } else {
                    GREATER_ICOST
                };
            }

            band_start = band_end + 1;
            remaining -= acc;
        }
    }

    /// Choose a table for every group of 50 symbols and refine the tables
    /// towards the symbols they end up coding.
    fn optimise_tables(
        &mut self,
        freqs: &[u32; MAX_ALPHA_SIZE],
        alpha_size: usize,
        n_groups: usize,
    ) -> [[u8; MAX_ALPHA_SIZE]; MAX_GROUPS] {
        let mut lengths = [[0u8; MAX_ALPHA_SIZE]; MAX_GROUPS];
        Self::initial_lengths(freqs, alpha_size, self.symbols.len(), n_groups, &mut lengths);

        for iteration in 0..ITERATIONS {
            let mut table_freqs = [[0u32; MAX_ALPHA_SIZE]; MAX_GROUPS];
            let mut chosen = [0usize; MAX_GROUPS];
            self.selectors.clear();

            for group in self.symbols.chunks(GROUP_SIZE) {
                let mut costs = [0u32; MAX_GROUPS];
                for &s in group {
                    for (cost, table) in costs[..n_groups].iter_mut().zip(&lengths) {
                        *cost += u32::from(table[s as usize]);
                    }
                }
                // First cheapest table wins ties
                let mut best = 0;
                for t in 1..n_groups {
                    if costs[t] < costs[best] {
                        best = t;
                    }
                }
                chosen[best] += 1;
                self.selectors.push(best as u8);
                for &s in group {
                    table_freqs[best][s as usize] += 1;
                }
            }

            trace!(
                "table pass {}: groups per table {:?}",
                iteration,
                &chosen[..n_groups]
            );

            for (table, counts) in lengths.iter_mut().zip(&table_freqs).take(n_groups) {
                let built = build_code_lengths(&counts[..alpha_size], MAX_ENCODE_CODE_LEN);
                table[..alpha_size].copy_from_slice(&built);
            }
        }

        lengths
    }
}

impl BlockEncoder for HuffmanBlockEncoder {
    fn sort(&mut self, block: &[u8]) -> Result<u32> {
        let order = self.sorter.sort(block);
        Ok(last_column(block, order, &mut self.bwt))
    }

    fn write_body(&mut self, in_use: &[bool; 256], out: &mut BitWriter<Vec<u8>>) -> Result<()> {
        let mut freqs = [0u32; MAX_ALPHA_SIZE];
        let alpha_size = encode_symbols(&self.bwt, in_use, &mut self.symbols, &mut freqs);

        // Symbol map: which 16-byte ranges are used, then each used range
        let mut ranges = 0u32;
        for (i, chunk) in in_use.chunks(16).enumerate() {
            if chunk.iter().any(|&used| used) {
                ranges |= 1 << (15 - i);
            }
        }
        out.write_bits(ranges, 16)?;
        for chunk in in_use.chunks(16).filter(|c| c.iter().any(|&used| used)) {
            let bits = chunk
                .iter()
                .fold(0u32, |acc, &used| (acc << 1) | u32::from(used));
            out.write_bits(bits, 16)?;
        }

        let n_groups = group_count(self.symbols.len());
        let lengths = self.optimise_tables(&freqs, alpha_size, n_groups);

        out.write_bits(n_groups as u32, 3)?;
        out.write_bits(self.selectors.len() as u32, 15)?;

        // Selectors are MTF coded, then written in unary
        let mut order: [u8; MAX_GROUPS] = std::array::from_fn(|i| i as u8);
        for &selector in &self.selectors {
            let mut pos = 0;
            while order[pos] != selector {
                pos += 1;
            }
            order[..=pos].rotate_right(1);
            for _ in 0..pos {
                out.write_bit(true)?;
            }
            out.write_bit(false)?;
        }

        // Code lengths as deltas: 10 = +1, 11 = -1, 0 = next symbol
        for table in lengths.iter().take(n_groups) {
            let mut current = table[0];
            out.write_bits(u32::from(current), 5)?;
            for &len in &table[..alpha_size] {
                while current < len {
                    out.write_bits(0b10, 2)?;
                    current += 1;
                }
                while current > len {
                    out.write_bits(0b11, 2)?;
                    current -= 1;
                }
                out.write_bit(false)?;
            }
        }

        let codes: Vec<Vec<u32>> = lengths
            .iter()
            .take(n_groups)
            .map(|table| assign_codes(&table[..alpha_size]))
            .collect();

        for (group, &selector) in self.symbols.chunks(GROUP_SIZE).zip(&self.selectors) {
            let table_codes = &codes[selector as usize];
            let table_lengths = &lengths[selector as usize];
            for &s in group {
                out.write_bits(table_codes[s as usize], table_lengths[s as usize])?;
            }
        }

        trace!(
            "block body: {} symbols, alphabet {}, {} tables, {} selectors",
            self.symbols.len(),
            alpha_size,
            n_groups,
            self.selectors.len()
        );
        Ok(())
    }
}
