// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mergeable Bloom filters with a shared-store-compatible bit layout.
//!
//! This crate is the kernel of the `rolling_bloom` framework: a fixed-parameter,
//! concurrency-safe bit array supporting insert, membership test, union,
//! snapshot, and approximate cardinality. Its distinguishing feature is the
//! byte codec of [`bit_array`]: filter bit `i` corresponds to bitfield offset
//! `i` of an external key/value store (most significant bit of byte 0 first),
//! so many machines can collaboratively set bits on one shared key and every
//! machine can decode the result.
//!
//! # Examples
//!
//! ## Insert and test
//!
//! ```
//! use rolling_bloom_filter::BloomFilter;
//!
//! let filter = BloomFilter::new(10_001, 3)?;
//! filter.add("abcd");
//! filter.add("1234");
//!
//! assert!(filter.check("abcd"));
//! assert!(!filter.check("plmqx"));
//! # Ok::<(), rolling_bloom_filter::Error>(())
//! ```
//!
//! ## Replicate through a shared bitmap
//!
//! ```
//! use rolling_bloom_filter::BloomFilter;
//!
//! let local = BloomFilter::new(10_001, 3)?;
//!
//! // The locations newly set by an insert are what gets uploaded.
//! let newly_set = local.add("abcd");
//! assert_eq!(newly_set.len(), 3);
//!
//! // A peer decodes the shared bitmap with the same parameters and merges.
//! let remote = BloomFilter::from_store_bytes(&local.to_store_bytes(), 10_001, 3)?;
//! let peer = BloomFilter::new(10_001, 3)?;
//! peer.merge(&remote)?;
//!
//! assert!(peer.check("abcd"));
//! # Ok::<(), rolling_bloom_filter::Error>(())
//! ```

pub mod bit_array;
pub mod error;
pub mod filter;
mod locations;

#[doc(inline)]
pub use bit_array::BitArray;
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use filter::BloomFilter;
