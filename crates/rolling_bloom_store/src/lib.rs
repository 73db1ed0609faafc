// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Store abstractions for fleet-shared Bloom filter bitmaps.
//!
//! This crate defines the [`BitmapStore`] trait that the `rolling_bloom`
//! coordinator synchronizes through, along with the [`Error`] type for store
//! operations. A store maps string keys (one per time interval) to bitmaps
//! that every process in a fleet writes concurrently; the only operations a
//! backend must provide are a raw fetch, a batched set of individual bits,
//! and a delete.
//!
//! # Implementing a Store
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//!
//! use rolling_bloom_store::{BitmapStore, Error};
//!
//! struct SimpleStore(RwLock<HashMap<String, Vec<u8>>>);
//!
//! impl BitmapStore for SimpleStore {
//!     async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
//!         Ok(self.0.read().expect("poisoned").get(key).cloned())
//!     }
//!
//!     async fn set_bits(&self, key: &str, offsets: &[usize]) -> Result<(), Error> {
//!         let mut data = self.0.write().expect("poisoned");
//!         let value = data.entry(key.to_owned()).or_default();
//!         for &offset in offsets {
//!             let byte = offset / 8;
//!             if byte >= value.len() {
//!                 value.resize(byte + 1, 0);
//!             }
//!             value[byte] |= 0x80 >> (offset % 8);
//!         }
//!         Ok(())
//!     }
//!
//!     async fn remove(&self, key: &str) -> Result<(), Error> {
//!         self.0.write().expect("poisoned").remove(key);
//!         Ok(())
//!     }
//! }
//! ```
//!
//! The production Redis implementation lives in `rolling_bloom_redis`; an
//! in-process implementation with operation recording and failure injection
//! is available under [`testing`] with the `test-util` feature.

pub mod error;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use store::BitmapStore;
