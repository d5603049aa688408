//! Huffman coding for BZip2.
//!
//! BZip2 uses multiple Huffman tables (up to 6) and can switch between them
//! every 50 symbols for better compression. Codes are canonical: within a
//! length, codes increase with the symbol value, so a table is fully
//! described by its code lengths.

use oxibz_core::BitReader;
use oxibz_core::error::{BzError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Read;

/// Maximum code length a decoder accepts.
pub const MAX_CODE_LEN: u8 = 20;

/// Maximum code length the encoder produces.
pub const MAX_ENCODE_CODE_LEN: u8 = 17;

const TABLE_SLOTS: usize = MAX_CODE_LEN as usize + 2;

/// A decoding table built from code lengths.
///
/// `limit[len]` is the largest `max_len`-bit peek value whose code has
/// length `len` or less; `base[len]` maps a `len`-bit code to its index in
/// `permute`, which lists symbols sorted by (length, symbol).
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    min_len: u8,
    max_len: u8,
    limit: [i32; TABLE_SLOTS],
    base: [i32; TABLE_SLOTS],
    permute: Vec<u16>,
}

impl HuffmanTable {
    /// Create a new Huffman table from code lengths.
    ///
    /// Every length must be in `1..=20`. Oversubscribed or incomplete
    /// length sets are accepted here; codes that fall outside the table are
    /// rejected while decoding.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        if lengths.is_empty() {
            return Err(BzError::data_error(0, "empty Huffman table"));
        }
        if let Some(&bad) = lengths.iter().find(|&&l| l == 0 || l > MAX_CODE_LEN) {
            return Err(BzError::data_error(
                0,
                format!("Huffman code length {bad} out of range"),
            ));
        }

        let min_len = lengths.iter().copied().min().unwrap_or(1);
        let max_len = lengths.iter().copied().max().unwrap_or(1);

        // Count symbols at each length
        let mut count = [0i32; TABLE_SLOTS];
        for &len in lengths {
            count[len as usize] += 1;
        }

        let mut permute = Vec::with_capacity(lengths.len());
        for len in min_len..=max_len {
            permute.extend(
                lengths
                    .iter()
                    .enumerate()
                    .filter(|&(_, &l)| l == len)
                    .map(|(sym, _)| sym as u16),
            );
        }

        let (lo, hi) = (min_len as usize, max_len as usize);
        let mut limit = [0i32; TABLE_SLOTS];
        let mut base = [0i32; TABLE_SLOTS];
        let mut code = 0i32;
        let mut seen = 0i32;
        for len in lo..hi {
            code += count[len];
            limit[len] = (code << (hi - len)) - 1;
            code <<= 1;
            seen += count[len];
            base[len + 1] = code - seen;
        }
        limit[hi] = code + count[hi] - 1;
        limit[hi + 1] = i32::MAX;
        base[lo] = 0;

        Ok(Self {
            min_len,
            max_len,
            limit,
            base,
            permute,
        })
    }

    /// Shortest code length in the table.
    pub fn min_len(&self) -> u8 {
        self.min_len
    }

    /// Longest code length in the table.
    pub fn max_len(&self) -> u8 {
        self.max_len
    }

    /// Decode a symbol from the bit stream.
    #[inline]
    pub fn decode<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u16> {
        let max_len = self.max_len as usize;
        let peek = reader.peek_bits(self.max_len)? as i32;

        let mut len = self.min_len as usize;
        while peek > self.limit[len] {
            len += 1;
        }
        if len > max_len {
            return Err(BzError::data_error(
                reader.bit_position(),
                "Huffman code not in table",
            ));
        }
        reader.consume(len as u8);

        let index = (peek >> (max_len - len)) - self.base[len];
        usize::try_from(index)
            .ok()
            .and_then(|i| self.permute.get(i))
            .copied()
            .ok_or_else(|| {
                BzError::data_error(reader.bit_position(), "Huffman code index out of range")
            })
    }
}

/// Sum two weights: frequencies add, depth becomes one more than the deeper.
///
/// The low 8 bits of a weight hold the subtree depth, so equal frequencies
/// prefer the shallower subtree.
fn add_weights(a: u32, b: u32) -> u32 {
    ((a & !0xff) + (b & !0xff)) | (1 + (a & 0xff).max(b & 0xff))
}

/// Code length of every leaf of a Huffman tree built over `weights`.
fn tree_depths(weights: &[u32]) -> Vec<usize> {
    let n = weights.len();
    if n < 2 {
        return vec![1; n];
    }

    let mut parent = vec![usize::MAX; 2 * n - 1];
    let mut heap: BinaryHeap<Reverse<(u32, usize)>> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| Reverse((w, i)))
        .collect();

    let mut next_node = n;
    while heap.len() > 1 {
        let (Some(Reverse((w1, n1))), Some(Reverse((w2, n2)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        parent[n1] = next_node;
        parent[n2] = next_node;
        heap.push(Reverse((add_weights(w1, w2), next_node)));
        next_node += 1;
    }

    (0..n)
        .map(|leaf| {
            let mut depth = 0;
            let mut node = leaf;
            while parent[node] != usize::MAX {
                node = parent[node];
                depth += 1;
            }
            depth
        })
        .collect()
}

/// Build length-limited code lengths from symbol frequencies.
///
/// Zero frequencies are treated as one so every symbol of the alphabet
/// gets a code. When the tree is deeper than `max_len`, all frequencies are
/// halved and the tree is rebuilt.
pub fn build_code_lengths(freqs: &[u32], max_len: u8) -> Vec<u8> {
    let mut weights: Vec<u32> = freqs.iter().map(|&f| f.max(1) << 8).collect();

    loop {
        let depths = tree_depths(&weights);
        if depths.iter().all(|&d| d <= max_len as usize) {
            return depths.into_iter().map(|d| d as u8).collect();
        }
        for w in weights.iter_mut() {
            *w = (1 + (*w >> 8) / 2) << 8;
        }
    }
}

/// Assign canonical codes for the given code lengths.
pub fn assign_codes(lengths: &[u8]) -> Vec<u32> {
    let mut codes = vec![0u32; lengths.len()];
    let (Some(min_len), Some(max_len)) =
        (lengths.iter().copied().min(), lengths.iter().copied().max())
    else {
        return codes;
    };

    let mut next = 0u32;
    for len in min_len..=max_len {
        for (code, _) in codes
            .iter_mut()
            .zip(lengths)
            .filter(|&(_, &l)| l == len)
        {
            *code = next;
            next += 1;
        }
        next <<= 1;
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxibz_core::BitWriter;
    use std::io::Cursor;

    fn encode_all(lengths: &[u8], symbols: &[u16]) -> Vec<u8> {
        let codes = assign_codes(lengths);
        let mut writer = BitWriter::new(Vec::new());
        for &s in symbols {
            writer
                .write_bits(codes[s as usize], lengths[s as usize])
                .unwrap();
        }
        // Padding so the final peek has bits to look at
        writer.write_u32(0).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_canonical_codes() {
        let codes = assign_codes(&[2, 1, 3, 3]);
        assert_eq!(codes, [0b10, 0b0, 0b110, 0b111]);
    }

    #[test]
    fn test_huffman_table_decode() {
        let lengths = [2, 1, 3, 3];
        let table = HuffmanTable::from_lengths(&lengths).unwrap();
        assert_eq!(table.min_len(), 1);
        assert_eq!(table.max_len(), 3);

        let symbols = [1, 0, 3, 2, 1, 1, 3];
        let data = encode_all(&lengths, &symbols);
        let mut reader = BitReader::new(Cursor::new(data));
        for &expected in &symbols {
            assert_eq!(table.decode(&mut reader).unwrap(), expected);
        }
    }

    #[test]
    fn test_incomplete_table_rejects_unused_code() {
        // Single code "0" of length 1 (plus an unused length-2 slot)
        let table = HuffmanTable::from_lengths(&[1, 2]).unwrap();
        let mut reader = BitReader::new(Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF]));
        let err = table.decode(&mut reader).unwrap_err();
        assert!(matches!(err, BzError::DataError { .. }));
    }

    #[test]
    fn test_length_out_of_range() {
        assert!(HuffmanTable::from_lengths(&[]).is_err());
        assert!(HuffmanTable::from_lengths(&[0, 1]).is_err());
        assert!(HuffmanTable::from_lengths(&[21, 1]).is_err());
    }

    #[test]
    fn test_build_code_lengths() {
        let freqs = [10, 5, 3, 1, 1];
        let lengths = build_code_lengths(&freqs, 17);
        assert_eq!(lengths.len(), 5);
        assert!(lengths[0] <= lengths[1]);
        assert!(lengths[1] <= lengths[3]);

        // Kraft sum of a full tree is exactly 1
        let kraft: f64 = lengths.iter().map(|&l| 0.5f64.powi(l as i32)).sum();
        assert!((kraft - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_frequencies_still_get_codes() {
        let lengths = build_code_lengths(&[100, 0, 0, 0], 17);
        assert!(lengths.iter().all(|&l| l >= 1));
    }

    #[test]
    fn test_length_limit() {
        // Fibonacci frequencies produce a maximally skewed tree
        let mut freqs = vec![1u32, 1];
        while freqs.len() < 30 {
            let n = freqs.len();
            freqs.push(freqs[n - 1] + freqs[n - 2]);
        }
        let lengths = build_code_lengths(&freqs, MAX_ENCODE_CODE_LEN);
        assert!(lengths.iter().all(|&l| l <= MAX_ENCODE_CODE_LEN));

        let table = HuffmanTable::from_lengths(&lengths).unwrap();
        let symbols: Vec<u16> = (0..30).collect();
        let data = encode_all(&lengths, &symbols);
        let mut reader = BitReader::new(Cursor::new(data));
        for &expected in &symbols {
            assert_eq!(table.decode(&mut reader).unwrap(), expected);
        }
    }
}
