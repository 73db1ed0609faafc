// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The shared-bitfield store trait.

use crate::Error;

/// A key/value store exposing per-key bitmaps that many processes write
/// concurrently.
///
/// Every process in a fleet talks to the same store under the same keys;
/// correctness relies solely on set-bit idempotence, so no coordination
/// beyond these three operations is required. Bit offsets use the store's
/// native ordering: offset 0 is the most significant bit of byte 0, which is
/// also the index convention of `rolling_bloom_filter`, so filter indices are
/// passed through unchanged.
pub trait BitmapStore: Send + Sync {
    /// Fetches the raw bitmap stored under `key`.
    ///
    /// A missing key yields `Ok(None)` and is treated by callers as an
    /// all-zeros bitmap. The returned value may be longer than the bitmap a
    /// caller expects; stores extend values in whole bytes.
    fn fetch(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Error>> + Send;

    /// Sets the listed bit offsets to 1 under `key`, as one batched write.
    ///
    /// Offsets past the end of the current value grow it; writing a bit that
    /// is already set is a no-op. An empty batch must succeed without
    /// touching the store.
    fn set_bits(&self, key: &str, offsets: &[usize]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes `key`.
    ///
    /// Used by tests and for explicit eviction; production deployments
    /// normally let interval keys lapse through the store's own expiry.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;
}
