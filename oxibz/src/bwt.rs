//! Burrows-Wheeler Transform for BZip2.
//!
//! The BWT is a reversible transformation that groups similar bytes together,
//! making the data more compressible.
//!
//! The forward transform sorts all cyclic rotations of a block by prefix
//! doubling: rotations are first ordered by their leading four bytes, then
//! repeatedly by `(rank[i], rank[i + h])` with `h` doubling each round,
//! until every rank is distinct or `h` covers the block. Worst case is
//! `O(n log^2 n)` regardless of how repetitive the block is.

use oxibz_core::error::{BzError, Result};

/// Reusable buffers for sorting block rotations.
#[derive(Debug, Default)]
pub struct RotationSorter {
    order: Vec<u32>,
    rank: Vec<u32>,
    next_rank: Vec<u32>,
    keys: Vec<u64>,
}

fn reserve<T>(buf: &mut Vec<T>, len: usize) -> Result<()> {
    buf.try_reserve_exact(len)
        .map_err(|_| BzError::out_of_memory(len * std::mem::size_of::<T>()))
}

impl RotationSorter {
    /// Allocate buffers for blocks of up to `n` bytes.
    pub fn with_capacity(n: usize) -> Result<Self> {
        let mut sorter = Self::default();
        reserve(&mut sorter.order, n)?;
        reserve(&mut sorter.rank, n)?;
        reserve(&mut sorter.next_rank, n)?;
        reserve(&mut sorter.keys, n)?;
        Ok(sorter)
    }

    /// Sort the rotations of `data`, returning their start offsets in order.
    ///
    /// Identical rotations (periodic blocks) are ordered by start offset.
    pub fn sort(&mut self, data: &[u8]) -> &[u32] {
        let n = data.len();
        self.order.clear();
        self.order.extend(0..n as u32);
        if n < 2 {
            return &self.order;
        }

        self.rank.clear();
        self.rank.resize(n, 0);
        self.next_rank.clear();
        self.next_rank.resize(n, 0);
        self.keys.clear();
        self.keys.extend((0..n).map(|i| {
            (0..4).fold(0u64, |key, j| (key << 8) | u64::from(data[(i + j) % n]))
        }));

        let mut h = 4usize;
        loop {
            sort_by_keys(&mut self.order, &self.keys);

            let mut distinct = 0u32;
            self.next_rank[self.order[0] as usize] = 0;
            for w in 1..n {
                let (prev, cur) = (self.order[w - 1] as usize, self.order[w] as usize);
                if self.keys[cur] != self.keys[prev] {
                    distinct += 1;
                }
                self.next_rank[cur] = distinct;
            }
            std::mem::swap(&mut self.rank, &mut self.next_rank);

            if distinct as usize == n - 1 || h >= n {
                break;
            }
            for i in 0..n {
                self.keys[i] =
                    (u64::from(self.rank[i]) << 32) | u64::from(self.rank[(i + h) % n]);
            }
            h *= 2;
        }

        &self.order
    }
}

#[cfg(feature = "parallel")]
fn sort_by_keys(order: &mut [u32], keys: &[u64]) {
    use rayon::prelude::*;
    order.par_sort_unstable_by_key(|&i| (keys[i as usize], i));
}

#[cfg(not(feature = "parallel"))]
fn sort_by_keys(order: &mut [u32], keys: &[u64]) {
    order.sort_unstable_by_key(|&i| (keys[i as usize], i));
}

/// Write the last column of the sorted rotation matrix into `out`.
///
/// Returns the primary index: the row holding the unrotated block.
pub fn last_column(data: &[u8], order: &[u32], out: &mut Vec<u8>) -> u32 {
    let n = data.len();
    out.clear();
    let mut orig_ptr = 0;
    for (row, &start) in order.iter().enumerate() {
        if start == 0 {
            orig_ptr = row as u32;
        }
        out.push(data[(start as usize + n - 1) % n]);
    }
    orig_ptr
}

/// Perform the Burrows-Wheeler Transform.
/// Returns the transformed data and the index of the original string.
pub fn transform(data: &[u8]) -> (Vec<u8>, u32) {
    let mut sorter = RotationSorter::default();
    let mut out = Vec::with_capacity(data.len());
    let order = sorter.sort(data);
    let orig_ptr = last_column(data, order, &mut out);
    (out, orig_ptr)
}

/// Fill `next` with the successor chain of a BWT column.
///
/// `byte_counts` must hold the occurrences of every byte in `bytes`. After
/// the call, following `next` from `next[orig_ptr]` visits the column in
/// original order.
pub fn link_successors(bytes: &[u8], byte_counts: &[u32; 256], next: &mut [u32]) {
    let mut slot = [0u32; 256];
    let mut total = 0u32;
    for (start, &count) in slot.iter_mut().zip(byte_counts) {
        *start = total;
        total += count;
    }

    for (i, &byte) in bytes.iter().enumerate() {
        let pos = &mut slot[byte as usize];
        next[*pos as usize] = i as u32;
        *pos += 1;
    }
}

/// Perform inverse Burrows-Wheeler Transform.
/// Reconstructs the original data from the transformed data and origin pointer.
pub fn inverse_transform(data: &[u8], orig_ptr: u32) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut counts = [0u32; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }
    let mut next = vec![0u32; data.len()];
    link_successors(data, &counts, &mut next);

    let mut result = Vec::with_capacity(data.len());
    let mut pos = next[orig_ptr as usize] as usize;
    for _ in 0..data.len() {
        result.push(data[pos]);
        pos = next[pos] as usize;
    }
    result
}
