//! Move-to-Front Transform for BZip2.
//!
//! MTF transforms a stream by replacing each byte with its position
//! in a dynamic list. After each byte, that byte is moved to the front
//! of the list. This converts local byte clusters into many zeros, which
//! the block coder then folds into RUNA/RUNB runs.
//!
//! BZip2 runs MTF over the compact alphabet of byte values actually used
//! in the block, so position `i` always refers to the `i`-th used byte.

use crate::{MAX_ALPHA_SIZE, RUNA, RUNB};

/// The decoder's MTF list over compact symbol indices.
#[derive(Debug, Clone)]
pub struct MtfList {
    symbols: [u8; 256],
}

impl MtfList {
    /// A list in identity order.
    pub fn new() -> Self {
        Self {
            symbols: std::array::from_fn(|i| i as u8),
        }
    }

    /// Restore identity order for a new block.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// The entry at position 0.
    #[inline]
    pub fn front(&self) -> u8 {
        self.symbols[0]
    }

    /// Remove the entry at `index`, move it to the front and return it.
    #[inline]
    pub fn move_to_front(&mut self, index: usize) -> u8 {
        let symbol = self.symbols[index];
        self.symbols[..=index].rotate_right(1);
        symbol
    }
}

impl Default for MtfList {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the RUNA/RUNB digits for a run of `count` zeros.
///
/// The run is written in bijective base 2, least significant digit first:
/// RUNA adds `1 << position`, RUNB adds `2 << position`.
pub fn push_zero_run(mut count: usize, symbols: &mut Vec<u16>, freqs: &mut [u32]) {
    while count > 0 {
        let symbol = if count & 1 == 1 { RUNA } else { RUNB };
        symbols.push(symbol);
        freqs[symbol as usize] += 1;
        count = (count - 1) >> 1;
    }
}

/// MTF + zero-run encode the BWT column of a block.
///
/// Fills `symbols` with the coded symbol stream (ending with EOB) and
/// `freqs` with per-symbol counts. Returns the alphabet size, which is the
/// number of used byte values plus two.
pub fn encode_symbols(
    bwt: &[u8],
    in_use: &[bool; 256],
    symbols: &mut Vec<u16>,
    freqs: &mut [u32; MAX_ALPHA_SIZE],
) -> usize {
    let mut seq_of = [0u8; 256];
    let mut used = 0usize;
    for (byte, _) in in_use.iter().enumerate().filter(|(_, used)| **used) {
        seq_of[byte] = used as u8;
        used += 1;
    }

    let eob = used + 1;
    let alpha_size = used + 2;
    freqs.fill(0);
    symbols.clear();

    let mut list: [u8; 256] = std::array::from_fn(|i| i as u8);
    let mut zeros = 0usize;

    for &byte in bwt {
        let seq = seq_of[byte as usize];
        if list[0] == seq {
            zeros += 1;
            continue;
        }
        push_zero_run(zeros, symbols, freqs);
        zeros = 0;

        // The byte was marked in use, so it is in list[..used]
        let mut pos = 1;
        while list[pos] != seq {
            pos += 1;
        }
        list[..=pos].rotate_right(1);

        let symbol = pos + 1;
        symbols.push(symbol as u16);
        freqs[symbol] += 1;
    }
    push_zero_run(zeros, symbols, freqs);

    symbols.push(eob as u16);
    freqs[eob] += 1;
    alpha_size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_use_of(data: &[u8]) -> [bool; 256] {
        let mut in_use = [false; 256];
        for &b in data {
            in_use[b as usize] = true;
        }
        in_use
    }

    fn zero_run_symbols(count: usize) -> Vec<u16> {
        let mut symbols = Vec::new();
        let mut freqs = [0u32; MAX_ALPHA_SIZE];
        push_zero_run(count, &mut symbols, &mut freqs);
        symbols
    }

    /// Decode RUNA/RUNB digits back into a run length.
    fn run_length(symbols: &[u16]) -> usize {
        symbols
            .iter()
            .enumerate()
            .map(|(pos, &s)| (s as usize + 1) << pos)
            .sum()
    }

    #[test]
    fn test_zero_run_digits() {
        assert_eq!(zero_run_symbols(0), Vec::<u16>::new());
        assert_eq!(zero_run_symbols(1), [RUNA]);
        assert_eq!(zero_run_symbols(2), [RUNB]);
        assert_eq!(zero_run_symbols(3), [RUNA, RUNA]);
        assert_eq!(zero_run_symbols(4), [RUNB, RUNA]);
        for count in 1..600 {
            assert_eq!(run_length(&zero_run_symbols(count)), count);
        }
    }

    #[test]
    fn test_mtf_list() {
        let mut list = MtfList::new();
        assert_eq!(list.front(), 0);
        assert_eq!(list.move_to_front(3), 3);
        assert_eq!(list.front(), 3);
        assert_eq!(list.move_to_front(1), 0);
        assert_eq!(list.move_to_front(2), 3);
        assert_eq!(list.move_to_front(0), 3);
        list.reset();
        assert_eq!(list.front(), 0);
    }

    #[test]
    fn test_encode_symbols() {
        let bwt = b"bbaac";
        let mut symbols = Vec::new();
        let mut freqs = [0u32; MAX_ALPHA_SIZE];
        let alpha_size = encode_symbols(bwt, &in_use_of(bwt), &mut symbols, &mut freqs);

        // a=0, b=1, c=2 in the compact alphabet; EOB = 4
        assert_eq!(alpha_size, 5);
        // b -> pos 1 (sym 2), b -> zero, a -> pos 1 (sym 2), a -> zero, c -> pos 2 (sym 3)
        assert_eq!(symbols, [2, RUNA, 2, RUNA, 3, 4]);
        assert_eq!(freqs[RUNA as usize], 2);
        assert_eq!(freqs[2], 2);
        assert_eq!(freqs[4], 1);
    }

    #[test]
    fn test_encode_symbols_leading_zero_run() {
        // The first used byte is already at the front of the list
        let bwt = b"aaab";
        let mut symbols = Vec::new();
        let mut freqs = [0u32; MAX_ALPHA_SIZE];
        encode_symbols(bwt, &in_use_of(bwt), &mut symbols, &mut freqs);
        assert_eq!(symbols, [RUNA, RUNA, 2, 3]);
    }

    #[test]
    fn test_decoder_list_inverts_encoder() {
        let bwt = b"mississippi river banks";
        let in_use = in_use_of(bwt);
        let mut symbols = Vec::new();
        let mut freqs = [0u32; MAX_ALPHA_SIZE];
        let alpha_size = encode_symbols(bwt, &in_use, &mut symbols, &mut freqs);

        let sym_to_byte: Vec<u8> = (0..=255u8).filter(|&b| in_use[b as usize]).collect();
        let mut list = MtfList::new();
        let mut out = Vec::new();
        let mut run = Vec::new();
        for &s in &symbols {
            if s == RUNA || s == RUNB {
                run.push(s);
                continue;
            }
            let zeros = run_length(&run);
            run.clear();
            out.extend(std::iter::repeat_n(sym_to_byte[list.front() as usize], zeros));
            if s as usize == alpha_size - 1 {
                break;
            }
            out.push(sym_to_byte[list.move_to_front(s as usize - 1) as usize]);
        }
        assert_eq!(out, bwt);
    }
}
