// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock bitmap store for testing.
//!
//! This module provides `MemoryStore`, an in-process store that records all
//! operations and supports failure injection for testing error paths.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{BitmapStore, Error};

/// Recorded store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A fetch was performed for the given key.
    Fetch(String),
    /// A batched bit write was performed.
    SetBits {
        /// The key that was written.
        key: String,
        /// The bit offsets that were set.
        offsets: Vec<usize>,
    },
    /// A key was deleted.
    Remove(String),
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A configurable in-process bitmap store for testing.
///
/// Values live in a shared map with the same bit-offset semantics as a real
/// bitfield store: offset 0 is the most significant bit of byte 0, and writes
/// past the end of a value grow it in whole bytes. Clones share the
/// underlying map, so a single `MemoryStore` cloned into several coordinators
/// models the one store an entire fleet synchronizes through.
///
/// All operations are recorded for later verification, and a failure
/// predicate can force any subset of them to fail.
///
/// # Examples
///
/// ```
/// use rolling_bloom_store::{BitmapStore, testing::{MemoryStore, StoreOp}};
///
/// # futures::executor::block_on(async {
/// let store = MemoryStore::new();
///
/// store.set_bits("counts-60", &[0, 9]).await?;
/// assert_eq!(store.fetch("counts-60").await?, Some(vec![0b1000_0000, 0b0100_0000]));
///
/// assert_eq!(store.operations().len(), 2);
/// # Ok::<(), rolling_bloom_store::Error>(())
/// # });
/// ```
///
/// # Failure injection
///
/// ```
/// use rolling_bloom_store::{BitmapStore, testing::{MemoryStore, StoreOp}};
///
/// # futures::executor::block_on(async {
/// let store = MemoryStore::new();
///
/// // Take the store down for writes only.
/// store.fail_when(|op| matches!(op, StoreOp::SetBits { .. }));
/// assert!(store.set_bits("counts-60", &[3]).await.is_err());
/// assert!(store.fetch("counts-60").await.is_ok());
/// # });
/// ```
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets a predicate that determines when operations should fail.
    ///
    /// The predicate receives the operation and returns `true` if it should
    /// fail. Failed operations are still recorded but leave the stored data
    /// untouched.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns a copy of the raw value stored under `key`.
    #[must_use]
    pub fn bitmap(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().get(key).cloned()
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().push(op);
    }

    fn should_fail(&self, op: &StoreOp) -> bool {
        self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(op))
    }
}

impl BitmapStore for MemoryStore {
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let op = StoreOp::Fetch(key.to_owned());
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::unavailable("injected fetch failure"));
        }
        self.record(op);
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set_bits(&self, key: &str, offsets: &[usize]) -> Result<(), Error> {
        let op = StoreOp::SetBits {
            key: key.to_owned(),
            offsets: offsets.to_vec(),
        };
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::unavailable("injected set_bits failure"));
        }
        self.record(op);

        if offsets.is_empty() {
            return Ok(());
        }

        let mut data = self.data.lock();
        let value = data.entry(key.to_owned()).or_default();
        for &offset in offsets {
            let byte = offset / 8;
            if byte >= value.len() {
                // Bitfield writes grow the value in whole bytes.
                value.resize(byte + 1, 0);
            }
            value[byte] |= 0x80 >> (offset % 8);
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let op = StoreOp::Remove(key.to_owned());
        if self.should_fail(&op) {
            self.record(op);
            return Err(Error::unavailable("injected remove failure"));
        }
        self.record(op);
        self.data.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(MemoryStore: Send, Sync, Clone);
    }

    #[test]
    fn fetch_missing_key_is_none() {
        block_on(async {
            let store = MemoryStore::new();

            assert_eq!(store.fetch("absent").await.unwrap(), None);
        });
    }

    #[test]
    fn set_bits_uses_msb_first_offsets() {
        block_on(async {
            let store = MemoryStore::new();

            store.set_bits("key", &[0, 9, 23]).await.unwrap();

            assert_eq!(
                store.fetch("key").await.unwrap(),
                Some(vec![0b1000_0000, 0b0100_0000, 0b0000_0001])
            );
        });
    }

    #[test]
    fn set_bits_grows_value_and_is_idempotent() {
        block_on(async {
            let store = MemoryStore::new();

            store.set_bits("key", &[3]).await.unwrap();
            assert_eq!(store.bitmap("key").unwrap().len(), 1);

            store.set_bits("key", &[63]).await.unwrap();
            assert_eq!(store.bitmap("key").unwrap().len(), 8);

            let before = store.bitmap("key");
            store.set_bits("key", &[3, 63]).await.unwrap();
            assert_eq!(store.bitmap("key"), before);
        });
    }

    #[test]
    fn empty_batch_writes_nothing() {
        block_on(async {
            let store = MemoryStore::new();

            store.set_bits("key", &[]).await.unwrap();

            assert_eq!(store.key_count(), 0);
        });
    }

    #[test]
    fn remove_deletes_key() {
        block_on(async {
            let store = MemoryStore::new();

            store.set_bits("key", &[1]).await.unwrap();
            store.remove("key").await.unwrap();

            assert_eq!(store.fetch("key").await.unwrap(), None);
        });
    }

    #[test]
    fn clones_share_data() {
        block_on(async {
            let store = MemoryStore::new();
            let peer = store.clone();

            store.set_bits("key", &[5]).await.unwrap();

            assert_eq!(peer.fetch("key").await.unwrap(), store.fetch("key").await.unwrap());
        });
    }

    #[test]
    fn operations_are_recorded_in_order() {
        block_on(async {
            let store = MemoryStore::new();

            store.set_bits("key", &[1, 2]).await.unwrap();
            let _ = store.fetch("key").await.unwrap();
            store.remove("key").await.unwrap();

            assert_eq!(
                store.operations(),
                vec![
                    StoreOp::SetBits {
                        key: "key".to_owned(),
                        offsets: vec![1, 2],
                    },
                    StoreOp::Fetch("key".to_owned()),
                    StoreOp::Remove("key".to_owned()),
                ]
            );
        });
    }

    #[test]
    fn injected_failures_leave_data_untouched() {
        block_on(async {
            let store = MemoryStore::new();
            store.set_bits("key", &[1]).await.unwrap();

            store.fail_when(|op| matches!(op, StoreOp::SetBits { .. } | StoreOp::Remove(_)));

            assert!(store.set_bits("key", &[2]).await.is_err());
            assert!(store.remove("key").await.is_err());
            assert_eq!(store.bitmap("key"), Some(vec![0b0100_0000]));

            store.clear_failures();
            store.set_bits("key", &[0]).await.unwrap();
            assert_eq!(store.bitmap("key"), Some(vec![0b1100_0000]));
        });
    }
}
