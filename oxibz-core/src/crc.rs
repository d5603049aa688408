//! CRC-32 as used by bzip2.
//!
//! bzip2 uses the CRC-32 polynomial 0x04C11DB7 without bit reflection
//! (CRC-32/BZIP2): bytes are shifted in at the most significant end, the
//! register starts at all ones and the result is inverted.
//!
//! Each block carries the CRC of its original (pre-RLE) bytes. The stream
//! trailer carries a combined CRC obtained by rotating the running value
//! left by one bit and XOR-ing in every block CRC, in block order.
//!
//! ## Performance Optimization
//!
//! Data of at least 16 bytes goes through a slicing-by-8 loop over eight
//! pre-computed tables; shorter slices use the single table.

/// CRC-32/BZIP2 polynomial (not reflected).
const POLY: u32 = 0x04C1_1DB7;

/// Single-byte lookup table, MSB-first.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Slicing-by-8 tables. `CRC32_TABLE_SLICE[t][b]` is the register effect of
/// byte `b` followed by `t` zero bytes.
const CRC32_TABLE_SLICE: [[u32; 256]; 8] = {
    let mut tables = [[0u32; 256]; 8];

    let mut i = 0usize;
    while i < 256 {
        tables[0][i] = CRC32_TABLE[i];
        i += 1;
    }

    let mut t = 1;
    while t < 8 {
        let mut i = 0usize;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = (prev << 8) ^ tables[0][(prev >> 24) as usize];
            i += 1;
        }
        t += 1;
    }

    tables
};

/// CRC-32/BZIP2 calculator.
///
/// - Polynomial: 0x04C11DB7
/// - Initial value: 0xFFFFFFFF
/// - Final XOR: 0xFFFFFFFF
/// - Reflected input/output: No
///
/// # Example
///
/// ```
/// use oxibz_core::crc::BzCrc32;
///
/// let mut crc = BzCrc32::new();
/// crc.update(b"123456789");
/// assert_eq!(crc.finalize(), 0xFC891918);
/// ```
#[derive(Debug, Clone)]
pub struct BzCrc32 {
    crc: u32,
}

impl BzCrc32 {
    /// Create a new calculator seeded with all ones.
    pub fn new() -> Self {
        Self { crc: 0xFFFF_FFFF }
    }

    /// Reset the CRC to its initial state.
    pub fn reset(&mut self) {
        self.crc = 0xFFFF_FFFF;
    }

    /// Update the CRC with a single byte.
    #[inline(always)]
    pub fn update_byte(&mut self, byte: u8) {
        self.crc = (self.crc << 8) ^ CRC32_TABLE[((self.crc >> 24) ^ byte as u32) as usize];
    }

    /// Update the CRC with `count` copies of `byte`.
    #[inline]
    pub fn update_repeated(&mut self, byte: u8, count: usize) {
        for _ in 0..count {
            self.update_byte(byte);
        }
    }

    /// Update the CRC with more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        if data.len() >= 16 {
            crc32_slice8(&mut self.crc, data);
        } else {
            for &byte in data {
                self.update_byte(byte);
            }
        }
    }

    /// Get the current CRC value (without finalizing).
    #[inline(always)]
    pub fn value(&self) -> u32 {
        !self.crc
    }

    /// Finalize and return the CRC value.
    #[inline(always)]
    pub fn finalize(self) -> u32 {
        !self.crc
    }

    /// Compute the CRC of a slice in one call.
    #[inline]
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

impl Default for BzCrc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold a block CRC into the running combined stream CRC.
#[inline]
pub fn combine_stream_crc(combined: u32, block_crc: u32) -> u32 {
    combined.rotate_left(1) ^ block_crc
}

/// Slicing-by-8 update, MSB-first.
#[inline]
fn crc32_slice8(crc: &mut u32, data: &[u8]) {
    let mut c = *crc;
    let mut chunks = data.chunks_exact(8);

    for chunk in &mut chunks {
        let head = c ^ u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        c = CRC32_TABLE_SLICE[7][(head >> 24) as usize]
            ^ CRC32_TABLE_SLICE[6][((head >> 16) & 0xFF) as usize]
            ^ CRC32_TABLE_SLICE[5][((head >> 8) & 0xFF) as usize]
            ^ CRC32_TABLE_SLICE[4][(head & 0xFF) as usize]
            ^ CRC32_TABLE_SLICE[3][chunk[4] as usize]
            ^ CRC32_TABLE_SLICE[2][chunk[5] as usize]
            ^ CRC32_TABLE_SLICE[1][chunk[6] as usize]
            ^ CRC32_TABLE_SLICE[0][chunk[7] as usize];
    }

    for &byte in chunks.remainder() {
        c = (c << 8) ^ CRC32_TABLE[((c >> 24) ^ byte as u32) as usize];
    }

    *crc = c;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_empty() {
        assert_eq!(BzCrc32::compute(b""), 0x0000_0000);
    }

    #[test]
    fn test_crc_check() {
        // CRC-32/BZIP2 check value for "123456789"
        assert_eq!(BzCrc32::compute(b"123456789"), 0xFC89_1918);
    }

    #[test]
    fn test_crc_incremental() {
        let mut crc = BzCrc32::new();
        crc.update(b"1234");
        crc.update(b"5");
        crc.update(b"6789");
        assert_eq!(crc.finalize(), 0xFC89_1918);
    }

    #[test]
    fn test_update_byte_and_repeated() {
        let data = [b'z'; 300];
        let mut a = BzCrc32::new();
        a.update_repeated(b'z', 300);
        let mut b = BzCrc32::new();
        for &byte in &data {
            b.update_byte(byte);
        }
        assert_eq!(a.value(), b.value());
        assert_eq!(a.value(), BzCrc32::compute(&data));
    }

    #[test]
    fn test_table_correctness() {
        assert_eq!(CRC32_TABLE[0], 0x0000_0000);
        assert_eq!(CRC32_TABLE[1], 0x04C1_1DB7);
        assert_eq!(CRC32_TABLE[2], 0x0982_3B6E);
    }

    #[test]
    fn test_slice8_table_correctness() {
        for t in 1..8 {
            for i in 0..256 {
                let prev = CRC32_TABLE_SLICE[t - 1][i];
                let expected = (prev << 8) ^ CRC32_TABLE[(prev >> 24) as usize];
                assert_eq!(
                    CRC32_TABLE_SLICE[t][i], expected,
                    "Table {} entry {} mismatch",
                    t, i
                );
            }
        }
    }

    #[test]
    fn test_crc_various_sizes() {
        // Boundary conditions around the slicing-by-8 threshold
        for size in [1, 7, 8, 15, 16, 17, 31, 32, 63, 64, 127, 128, 255, 256] {
            let data: Vec<u8> = (0..size).map(|i| (i * 7 + size) as u8).collect();
            let crc1 = BzCrc32::compute(&data);

            let mut crc2 = BzCrc32::new();
            for &byte in &data {
                crc2.update(&[byte]);
            }

            assert_eq!(crc1, crc2.finalize(), "CRC mismatch for size {}", size);
        }
    }

    #[test]
    fn test_combine_stream_crc() {
        assert_eq!(combine_stream_crc(0, 0xDEAD_BEEF), 0xDEAD_BEEF);
        assert_eq!(combine_stream_crc(0x8000_0001, 0), 0x0000_0003);
        let combined = [0x1111_1111u32, 0x2222_2222, 0x3333_3333]
            .iter()
            .fold(0, |acc, &c| combine_stream_crc(acc, c));
        assert_eq!(
            combined,
            ((0x1111_1111u32.rotate_left(1) ^ 0x2222_2222).rotate_left(1)) ^ 0x3333_3333
        );
    }
}
