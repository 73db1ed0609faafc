// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The Bloom filter kernel.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::bit_array::BitArray;
use crate::error::{Error, Result};
use crate::locations::locations;

// Identities for the merge lock order. The counter only ever grows, so two
// distinct filters always have distinct ids.
static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(0);

/// A mergeable Bloom filter with fixed parameters.
///
/// `m` is the bit count and `k` the number of hash-derived locations per
/// string; both are fixed at construction, and two filters are mergeable only
/// when both match. Membership answers carry the usual one-sided error: a
/// false result is definitive, a true result may be a false positive.
///
/// All operations are thread safe. Reads (`check`, `test_location`,
/// `approx_count`, `clone`) take a shared lock on the bit array; writes
/// (`add`, the target side of `merge`) take it exclusively.
///
/// # Examples
///
/// ```
/// use rolling_bloom_filter::BloomFilter;
///
/// let filter = BloomFilter::new(10_001, 3)?;
/// filter.add("abcd");
///
/// assert!(filter.check("abcd"));
/// assert!(!filter.check("plmqx"));
/// # Ok::<(), rolling_bloom_filter::Error>(())
/// ```
#[derive(Debug)]
pub struct BloomFilter {
    id: u64,
    m: usize,
    k: usize,
    bits: RwLock<BitArray>,
}

impl BloomFilter {
    /// Creates an empty filter of `m` bits probed at `k` locations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] when `m` or `k` is zero.
    pub fn new(m: usize, k: usize) -> Result<Self> {
        Self::validate(m, k)?;
        Ok(Self::with_bits(m, k, BitArray::new(m)))
    }

    /// Creates a filter from a store bitmap (see [`BitArray::from_store_bytes`]).
    ///
    /// This is how remote state downloaded from the shared store enters the
    /// process: decode the raw bytes with the parameters the fleet agreed on,
    /// then [`merge`][Self::merge] the result into a local filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] when `m` or `k` is zero.
    pub fn from_store_bytes(bytes: &[u8], m: usize, k: usize) -> Result<Self> {
        Self::validate(m, k)?;
        Ok(Self::with_bits(m, k, BitArray::from_store_bytes(bytes, m)))
    }

    fn validate(m: usize, k: usize) -> Result<()> {
        if m == 0 || k == 0 {
            return Err(Error::InvalidShape { m, k });
        }
        Ok(())
    }

    fn with_bits(m: usize, k: usize, bits: BitArray) -> Self {
        Self {
            id: NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed),
            m,
            k,
            bits: RwLock::new(bits),
        }
    }

    /// Inserts `s`, returning the locations this call newly set.
    ///
    /// The returned indices are exactly those that transitioned from 0 to 1
    /// during this call; locations that were already set (by an earlier
    /// insert or a merge) are omitted. The caller replicates the returned set
    /// to the shared store.
    pub fn add(&self, s: &str) -> Vec<usize> {
        let locs = locations(s, self.m, self.k);

        let mut bits = self.bits.write();
        locs.into_iter().filter(|&loc| bits.set(loc)).collect()
    }

    /// Returns true iff every location of `s` is set.
    ///
    /// A false result means `s` was never inserted (no false negatives).
    #[must_use]
    pub fn check(&self, s: &str) -> bool {
        let locs = locations(s, self.m, self.k);

        let bits = self.bits.read();
        locs.into_iter().all(|loc| bits.get(loc))
    }

    /// Returns the value of a single bit.
    #[must_use]
    pub fn test_location(&self, loc: usize) -> bool {
        self.bits.read().get(loc)
    }

    /// Bitwise OR of `other` into `self`. The source is not modified.
    ///
    /// Safe to call concurrently from both directions: the two bit-array
    /// locks are always taken in filter-id order, so `a.merge(&b)` racing
    /// `b.merge(&a)` cannot deadlock. Merging a filter into itself is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] when the parameters differ.
    pub fn merge(&self, other: &Self) -> Result<()> {
        if self.m != other.m || self.k != other.k {
            return Err(Error::SizeMismatch {
                m: self.m,
                k: self.k,
                other_m: other.m,
                other_k: other.k,
            });
        }

        if self.id == other.id {
            return Ok(());
        }

        if self.id < other.id {
            let mut mine = self.bits.write();
            let theirs = other.bits.read();
            mine.union(&theirs);
        } else {
            let theirs = other.bits.read();
            let mut mine = self.bits.write();
            mine.union(&theirs);
        }

        Ok(())
    }

    /// Estimates the number of distinct strings inserted so far.
    ///
    /// Uses the standard fill-ratio estimate `-(m/k) · ln(1 - c/m)` where `c`
    /// is the number of set bits. A saturated array substitutes `c = m - 1`
    /// to avoid the singularity.
    #[must_use]
    pub fn approx_count(&self) -> f64 {
        let mut count = self.bits.read().count_ones();
        if count == self.m {
            count = self.m - 1;
        }

        let m = self.m as f64;
        let k = self.k as f64;
        let c = count as f64;

        -m / k * (1.0 - c / m).ln()
    }

    /// The number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.bits.read().count_ones()
    }

    /// Encodes the current bit array in the store's byte convention.
    #[must_use]
    pub fn to_store_bytes(&self) -> Vec<u8> {
        self.bits.read().to_store_bytes()
    }

    /// The number of hash locations per string.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// The number of bits.
    #[must_use]
    pub fn m(&self) -> usize {
        self.m
    }
}

impl Clone for BloomFilter {
    /// Snapshots the filter: same `m` and `k`, an independent copy of the
    /// bits, and a fresh identity.
    fn clone(&self) -> Self {
        let snapshot = self.bits.read().clone();
        Self::with_bits(self.m, self.k, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(BloomFilter: Send, Sync);
    }

    #[test]
    fn new_rejects_zero_parameters() {
        assert!(matches!(
            BloomFilter::new(0, 3),
            Err(Error::InvalidShape { m: 0, k: 3 })
        ));
        assert!(matches!(
            BloomFilter::new(128, 0),
            Err(Error::InvalidShape { m: 128, k: 0 })
        ));
    }

    #[test]
    fn add_and_check() {
        let filter = BloomFilter::new(10_001, 3).unwrap();

        filter.add("abcd");
        filter.add("1234");

        assert!(filter.check("abcd"));
        assert!(filter.check("1234"));
        assert!(!filter.check("plmqx"));
    }

    #[test]
    fn add_returns_newly_set_locations_only() {
        let filter = BloomFilter::new(10_001, 3).unwrap();

        let first = filter.add("abcd");
        assert_eq!(first.len(), 3);

        // A second insert of the same string sets nothing new.
        assert!(filter.add("abcd").is_empty());

        for loc in first {
            assert!(filter.test_location(loc));
        }
    }

    #[test]
    fn merge_does_not_mutate_source() {
        let b1 = BloomFilter::new(10_001, 3).unwrap();
        let b2 = BloomFilter::new(10_001, 3).unwrap();

        b1.add("abcd");
        b2.add("1234");

        b1.merge(&b2).unwrap();

        assert!(b1.check("abcd"));
        assert!(b1.check("1234"));
        assert!(!b1.check("plmqx"));

        assert!(!b2.check("abcd"));
        assert!(b2.check("1234"));
        assert!(!b2.check("plmqx"));
    }

    #[test]
    fn merge_rejects_mismatched_parameters() {
        let b1 = BloomFilter::new(10_001, 3).unwrap();
        let b2 = BloomFilter::new(10_001, 4).unwrap();
        let b3 = BloomFilter::new(137, 3).unwrap();

        assert!(matches!(b1.merge(&b2), Err(Error::SizeMismatch { .. })));
        assert!(matches!(b1.merge(&b3), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn merge_with_self_is_noop() {
        let filter = BloomFilter::new(1_024, 3).unwrap();
        filter.add("abcd");

        let before = filter.to_store_bytes();
        filter.merge(&filter).unwrap();

        assert_eq!(filter.to_store_bytes(), before);
    }

    #[test]
    fn clone_is_independent_snapshot() {
        let original = BloomFilter::new(10_001, 3).unwrap();
        original.add("abcd");

        let snapshot = original.clone();
        original.add("1234");

        assert!(snapshot.check("abcd"));
        assert!(!snapshot.check("1234"));
        assert!(original.check("1234"));
    }

    #[test]
    fn from_store_bytes_round_trips() {
        let original = BloomFilter::new(10_001, 3).unwrap();
        original.add("abcd");
        original.add("1234");

        let copy = BloomFilter::from_store_bytes(&original.to_store_bytes(), 10_001, 3).unwrap();

        assert!(copy.check("abcd"));
        assert!(copy.check("1234"));
        assert!(!copy.check("plmqx"));
        assert_eq!(copy.to_store_bytes(), original.to_store_bytes());
    }

    #[test]
    fn approx_count_of_empty_filter_is_zero() {
        let filter = BloomFilter::new(10_001, 3).unwrap();

        assert!(filter.approx_count().abs() < f64::EPSILON);
    }

    #[test]
    fn approx_count_saturated_filter_is_finite() {
        let filter = BloomFilter::new(2, 1).unwrap();

        filter.add("a");
        filter.add("b");
        filter.add("c");
        filter.add("d");

        // Even a fully saturated array must not hit the log singularity.
        assert!(filter.approx_count().is_finite());
    }
}
