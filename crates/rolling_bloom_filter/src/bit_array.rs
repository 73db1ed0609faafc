// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fixed-length bit storage with the external store's byte codec.
//!
//! The shared store exposes an interval's bitmap as a byte string in which
//! bit offset 0 is the most significant bit of byte 0. [`BitArray`] uses the
//! same convention for its indices, so a filter index and a store bitfield
//! offset are the same number; the codec below only clamps the stream to the
//! configured length and converts between bytes and bits.

use std::cmp::Ordering;

use bit_vec::BitVec;

/// A dense bit array of fixed length.
///
/// Bits only ever transition from 0 to 1; the only way to clear bits is to
/// discard the whole array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitArray {
    bits: BitVec,
}

impl BitArray {
    /// Creates an all-zero array of `m` bits.
    #[must_use]
    pub fn new(m: usize) -> Self {
        Self {
            bits: BitVec::from_elem(m, false),
        }
    }

    /// Decodes a store bitmap into an array of exactly `m` bits.
    ///
    /// The store may extend the value beyond `m` bits (its bitfield writes
    /// grow the value in byte units); excess bits are dropped. A short or
    /// missing stream is zero-filled.
    #[must_use]
    pub fn from_store_bytes(bytes: &[u8], m: usize) -> Self {
        let mut bits = BitVec::from_bytes(bytes);

        match bits.len().cmp(&m) {
            Ordering::Greater => bits.truncate(m),
            Ordering::Less => bits.grow(m - bits.len(), false),
            Ordering::Equal => {}
        }

        Self { bits }
    }

    /// Encodes the array in the store's byte convention.
    ///
    /// The result is `ceil(m / 8)` bytes; trailing pad bits are zero.
    #[must_use]
    pub fn to_store_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }

    /// The number of bits in the array.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns true if the array holds no bits at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Returns the value of bit `i`, or false when `i` is out of range.
    #[must_use]
    pub fn get(&self, i: usize) -> bool {
        self.bits.get(i).unwrap_or(false)
    }

    /// Sets bit `i`, returning true if the bit transitioned from 0 to 1.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn set(&mut self, i: usize) -> bool {
        if self.bits.get(i) == Some(true) {
            return false;
        }

        self.bits.set(i, true);
        true
    }

    /// The number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.bits
            .to_bytes()
            .iter()
            .map(|byte| byte.count_ones() as usize)
            .sum()
    }

    /// Bitwise OR of `other` into `self`, returning true if any bit changed.
    ///
    /// Works on the byte encoding, eight bits at a time.
    pub fn union(&mut self, other: &Self) -> bool {
        debug_assert_eq!(self.len(), other.len(), "unioned arrays must match in length");

        let mut bytes = self.bits.to_bytes();
        let mut changed = false;
        for (mine, theirs) in bytes.iter_mut().zip(other.bits.to_bytes()) {
            let merged = *mine | theirs;
            changed |= merged != *mine;
            *mine = merged;
        }

        if changed {
            let len = self.bits.len();
            self.bits = BitVec::from_bytes(&bytes);
            self.bits.truncate(len);
        }

        changed
    }
}
