// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Two-way synchronization with the shared store, and ring rotation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rolling_bloom_filter::BloomFilter;
use rolling_bloom_store::BitmapStore;

use crate::coordinator::{Inner, merge_filters};

// Scanning the pending set stops once this many times the per-sync upload
// budget has been gathered, bounding sync work under a large backlog. The
// seed-nearest selection below is therefore approximate: it orders only the
// scanned prefix, not the whole set.
const CANDIDATE_SCAN_FACTOR: usize = 5;

/// Picks which pending locations to upload.
///
/// Locations the remote bitmap already carries are returned separately as
/// redundant; they need no upload and can be dropped from the pending set
/// outright. When not selecting everything, the candidates are ordered by
/// distance above `seed` on the ring `[0, m)` and capped at `upload_per_sync`,
/// so processes with different seeds tend to upload disjoint subsets.
fn select_candidates(
    pending: &HashSet<usize>,
    remote: Option<&BloomFilter>,
    seed: usize,
    m: usize,
    upload_per_sync: usize,
    select_all: bool,
) -> (Vec<usize>, Vec<usize>) {
    let mut candidates = Vec::new();
    let mut redundant = Vec::new();
    let scan_limit = upload_per_sync.saturating_mul(CANDIDATE_SCAN_FACTOR);

    for &location in pending {
        if remote.is_some_and(|filter| filter.test_location(location)) {
            redundant.push(location);
        } else {
            candidates.push(location);
            if !select_all && candidates.len() >= scan_limit {
                break;
            }
        }
    }

    if !select_all && candidates.len() > upload_per_sync {
        let seed = seed % m;
        candidates.sort_unstable_by_key(|&location| (location + m - seed) % m);
        candidates.truncate(upload_per_sync);
    }

    (candidates, redundant)
}

impl<S> Inner<S>
where
    S: BitmapStore,
{
    /// The store key for the interval containing `t`.
    ///
    /// Keys are the floored UNIX second of the interval start, in decimal,
    /// behind the shared prefix. Every fleet member derives the same key for
    /// the same moment.
    pub(crate) fn interval_key(&self, t: SystemTime) -> String {
        let unix = t
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let interval = self.config.interval.as_secs();
        let bucket = unix - (unix % interval);

        format!("{}{bucket}", self.config.key_prefix)
    }

    /// Time remaining until the next interval boundary.
    pub(crate) fn next_boundary_delay(&self) -> Duration {
        let since_epoch = self
            .clock
            .system_time()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let interval = self.config.interval.as_secs();
        let into_interval = since_epoch.as_secs() % interval;

        Duration::from_secs(interval - into_interval)
            .saturating_sub(Duration::new(0, since_epoch.subsec_nanos()))
    }

    /// Downloads and decodes the bitmap under `key`.
    ///
    /// A missing key, a store failure, and an undecodable value all yield
    /// `None`; failures are logged and the next scheduled cycle is the
    /// retry.
    async fn download(&self, key: &str) -> Option<BloomFilter> {
        match self.store.fetch(key).await {
            Ok(Some(bytes)) => {
                match BloomFilter::from_store_bytes(&bytes, self.config.bits, self.config.hashes) {
                    Ok(remote) => Some(remote),
                    Err(error) => {
                        tracing::warn!(key, %error, "remote bitmap not decodable");
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(key, %error, "bitmap download failed");
                None
            }
        }
    }

    /// One incremental synchronization cycle.
    ///
    /// Holds the meta lock in shared mode throughout, so a concurrent
    /// rotation waits for the cycle to finish; inserts and queries are not
    /// blocked.
    pub(crate) async fn sync_once(&self) {
        let meta = self.meta.read().await;

        let now = self.clock.system_time();
        let key = self.interval_key(now);
        tracing::debug!(%key, pending = self.pending.lock().len(), "incremental sync");

        // Pull: fold the fleet's bits for this interval into the current
        // filter.
        let remote = self.download(&key).await;
        if let Some(remote) = &remote {
            merge_filters(&meta.current, remote);
        }

        // Push: choose a bounded, seed-disjoint slice of the pending set.
        let (candidates, mut uploaded_or_redundant) = {
            let pending = self.pending.lock();
            select_candidates(
                &pending,
                remote.as_ref(),
                meta.upload_seed,
                self.config.bits,
                self.config.upload_per_sync,
                false,
            )
        };

        if !candidates.is_empty() {
            match self.store.set_bits(&key, &candidates).await {
                Ok(()) => uploaded_or_redundant.extend_from_slice(&candidates),
                Err(error) => {
                    // Leave the candidates pending; the next cycle retries.
                    tracing::warn!(%key, count = candidates.len(), %error, "bit upload failed");
                }
            }
        }

        if !uploaded_or_redundant.is_empty() {
            let mut pending = self.pending.lock();
            for location in &uploaded_or_redundant {
                pending.remove(location);
            }
        }
    }

    /// One rotation at an interval boundary.
    ///
    /// Retires the current filter into the ring, flushes the finished
    /// interval to the store, waits out the settle delay, folds the
    /// finalized fleet-wide bitmap back into the retired filter, and
    /// rebuilds the aggregate. Rotation happens unconditionally; store
    /// failures degrade individual steps but never skip the rotation
    /// itself, so interval alignment is maintained.
    pub(crate) async fn rotate_once(&self) {
        let now = self.clock.system_time();
        let previous_key = self.interval_key(now - self.config.interval);
        tracing::debug!(key = %previous_key, "rotating the interval ring");

        // Swap identities. Exclusive, but pointer work only; no store I/O
        // happens under the exclusive lock.
        let (retired, previous_pending) = {
            let mut meta = self.meta.write().await;

            let previous_pending = std::mem::take(&mut *self.pending.lock());

            let retired = Arc::clone(&meta.current);
            let oldest = meta.oldest;
            meta.ring[oldest] = Some(Arc::clone(&retired));
            meta.current = Arc::new(self.blank_filter());
            meta.oldest = (oldest + 1) % meta.ring.len();
            meta.upload_seed = fastrand::usize(..self.config.bits);

            (retired, previous_pending)
        };

        self.flush_previous(&previous_key, &retired, &previous_pending)
            .await;

        self.rebuild_aggregate().await;
    }

    /// Flushes the just-finished interval and folds in the finalized bitmap.
    ///
    /// Mutates only the retired filter's bits, never an identity, so no meta
    /// lock is needed. Bits that arrive in the retired filter after the
    /// upload below stay local; they are not re-uploaded to the finalized
    /// key.
    async fn flush_previous(
        &self,
        key: &str,
        retired: &BloomFilter,
        previous_pending: &HashSet<usize>,
    ) {
        // Upload everything the interval still owes, minus what the fleet
        // already has. No seed throttling here; the interval is closing.
        let remote = self.download(key).await;
        let (candidates, _) = select_candidates(
            previous_pending,
            remote.as_ref(),
            0,
            self.config.bits,
            self.config.upload_per_sync,
            true,
        );

        if !candidates.is_empty() {
            if let Err(error) = self.store.set_bits(key, &candidates).await {
                tracing::warn!(key, count = candidates.len(), %error, "final flush upload failed");
            }
        }

        // Give the rest of the fleet time to finish their own flush, then
        // take the finalized union.
        tick::Delay::new(&self.clock, self.config.settle_delay).await;

        if let Some(finalized) = self.download(key).await {
            merge_filters(retired, &finalized);
        }
    }

    /// Rebuilds the aggregate from the ring and installs it.
    async fn rebuild_aggregate(&self) {
        let slots: Vec<Arc<BloomFilter>> = {
            let meta = self.meta.read().await;
            meta.ring.iter().flatten().cloned().collect()
        };

        let aggregate = self.blank_filter();
        for slot in &slots {
            merge_filters(&aggregate, slot);
        }

        let mut meta = self.meta.write().await;
        meta.aggregate = Arc::new(aggregate);
    }

    /// Best-effort upload of everything still pending, used at shutdown.
    pub(crate) async fn final_flush(&self) {
        // Shared, so a still-running rotation cannot swap filters mid-flush.
        let _meta = self.meta.read().await;
        let key = self.interval_key(self.clock.system_time());

        let candidates: Vec<usize> = self.pending.lock().iter().copied().collect();
        if candidates.is_empty() {
            return;
        }

        match self.store.set_bits(&key, &candidates).await {
            Ok(()) => self.pending.lock().clear(),
            Err(error) => {
                tracing::warn!(%key, count = candidates.len(), %error, "shutdown flush failed");
            }
        }
    }
}
