// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The rotational coordinator.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rolling_bloom_filter::BloomFilter;
use rolling_bloom_store::BitmapStore;
use tick::Clock;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::runtime;

/// Merges `source` into `target`, logging instead of failing on a shape
/// mismatch.
///
/// Every filter a coordinator handles is created with the configured shape,
/// so a mismatch cannot arise from this module; dropping the merge loses
/// nothing but remote bits for one cycle, which the next download repairs.
pub(crate) fn merge_filters(target: &BloomFilter, source: &BloomFilter) {
    if let Err(error) = target.merge(source) {
        tracing::warn!(%error, "filter merge skipped");
    }
}

/// The filter identities of one coordinator.
///
/// The surrounding `RwLock` guards exactly these identities (which `Arc`
/// points where), not the bits inside the filters; each filter carries its
/// own reader/writer lock for those. Rotation takes this lock exclusively to
/// swap pointers, while queries and synchronization hold it shared.
pub(crate) struct Meta {
    /// The filter collecting inserts for the interval containing "now".
    pub(crate) current: Arc<BloomFilter>,

    /// Completed intervals, one slot per interval. `None` until the ring has
    /// wrapped once.
    pub(crate) ring: Vec<Option<Arc<BloomFilter>>>,

    /// Index of the slot the next rotation overwrites, which is also the
    /// oldest completed interval.
    pub(crate) oldest: usize,

    /// Cached union of every ring slot, rebuilt after each rotation. Purely
    /// a query accelerator; the ring remains the source of truth.
    pub(crate) aggregate: Arc<BloomFilter>,

    /// Offset in `[0, m)` perturbing which pending locations this process
    /// uploads first, so fleet members tend to pick disjoint subsets.
    /// Reselected at each rotation.
    pub(crate) upload_seed: usize,
}

impl Meta {
    /// The completed intervals, oldest first.
    fn history_oldest_first(&self) -> Vec<Arc<BloomFilter>> {
        let len = self.ring.len();
        (0..len)
            .filter_map(|i| self.ring[(self.oldest + i) % len].clone())
            .collect()
    }

    /// Resizes the ring to `n` slots.
    ///
    /// Growth adds empty slots; shrinkage drops the oldest completed
    /// intervals, which narrows the window immediately.
    pub(crate) fn reshape_ring(&mut self, n: usize) {
        let mut history = self.history_oldest_first();
        if history.len() > n {
            history.drain(..history.len() - n);
        }

        let kept = history.len();
        let mut ring = vec![None; n];
        for (slot, filter) in ring.iter_mut().zip(history) {
            *slot = Some(filter);
        }

        self.ring = ring;
        self.oldest = kept % n;
    }
}

/// Shared state between the public handle and the background tasks.
pub(crate) struct Inner<S> {
    pub(crate) config: Config,
    pub(crate) store: S,
    pub(crate) clock: Clock,

    /// An empty filter with the configured shape, validated once at start.
    /// Rotation and aggregation clone it whenever they need a fresh filter,
    /// so filter construction cannot fail after startup.
    pub(crate) blank: BloomFilter,

    /// Guards filter identities. Held shared across store I/O by the sync
    /// routine; exclusive acquisitions are pointer swaps only and never
    /// overlap an `.await` on the store.
    pub(crate) meta: RwLock<Meta>,

    /// Locations set locally but not yet uploaded. Acquired after `meta`
    /// and never held across an `.await`.
    pub(crate) pending: Mutex<HashSet<usize>>,
}

impl<S> Inner<S>
where
    S: BitmapStore,
{
    /// A fresh empty filter with the coordinator's shape.
    pub(crate) fn blank_filter(&self) -> BloomFilter {
        self.blank.clone()
    }

    /// The insert path: set bits in the current filter and remember what
    /// this process newly contributed.
    pub(crate) async fn ingest(&self, s: &str) {
        let meta = self.meta.read().await;

        let newly_set = meta.current.add(s);
        if !newly_set.is_empty() {
            self.pending.lock().extend(newly_set);
        }
    }

    /// Membership over the whole window: the current filter, the aggregate,
    /// or any ring slot.
    pub(crate) async fn check(&self, s: &str) -> bool {
        let meta = self.meta.read().await;

        if meta.current.check(s) || meta.aggregate.check(s) {
            return true;
        }
        meta.ring.iter().flatten().any(|slot| slot.check(s))
    }

    /// Distinct-count estimate over the whole window.
    ///
    /// Snapshots the current filter and folds the aggregate into the
    /// snapshot under the shared lock; the logarithm runs outside it.
    pub(crate) async fn approx_count(&self) -> f64 {
        let snapshot = {
            let meta = self.meta.read().await;

            let snapshot = meta.current.as_ref().clone();
            merge_filters(&snapshot, &meta.aggregate);
            snapshot
        };

        snapshot.approx_count()
    }
}

/// A distributed rolling-window approximate-count cache.
///
/// Each coordinator keeps a *current* Bloom filter plus a ring of historical
/// filters covering the last `interval × interval_num` of wall-clock time.
/// Inserts land in the current filter; a background task rotates the ring at
/// every interval boundary; another periodically exchanges bits with the
/// shared [`BitmapStore`] so that every process in the fleet converges on the
/// union of all processes' inserts for each interval.
///
/// Membership ([`check`][Self::check]) and cardinality
/// ([`approx_count`][Self::approx_count]) are answered over the whole window
/// with the usual Bloom guarantees: no false negatives for locally processed
/// inserts, bounded false positives, approximate counts.
///
/// # Examples
///
/// ```
/// use rolling_bloom::{Config, RollingBloom};
/// use rolling_bloom_store::testing::MemoryStore;
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), rolling_bloom::Error> {
/// let cache = RollingBloom::start(Config::new("visitors-"), MemoryStore::new(), Clock::new_frozen())?;
///
/// cache.add("alice").await;
///
/// // Inserts are fire-and-forget; a worker picks them up asynchronously.
/// while !cache.check("alice").await {
///     tokio::task::yield_now().await;
/// }
///
/// assert!(!cache.check("mallory").await);
/// cache.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct RollingBloom<S> {
    inner: Arc<Inner<S>>,
    add_tx: mpsc::Sender<String>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S> std::fmt::Debug for RollingBloom<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingBloom")
            .field("key_prefix", &self.inner.config.key_prefix)
            .finish_non_exhaustive()
    }
}

impl<S> RollingBloom<S>
where
    S: BitmapStore + 'static,
{
    /// Validates `config` and starts a coordinator with its background
    /// tasks: the insert workers, the incremental sync timer, and the
    /// rotation timer.
    ///
    /// The clock drives every timer and all interval-key derivation, which
    /// is what makes the coordinator testable with a controlled clock.
    ///
    /// # Errors
    ///
    /// Returns a configuration error without starting anything when
    /// `config` is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn start(config: Config, store: S, clock: Clock) -> Result<Self> {
        config.validate()?;

        let blank = BloomFilter::new(config.bits, config.hashes)?;

        let meta = Meta {
            current: Arc::new(blank.clone()),
            ring: vec![None; config.interval_num],
            oldest: 0,
            aggregate: Arc::new(blank.clone()),
            upload_seed: fastrand::usize(..config.bits),
        };

        let (add_tx, add_rx) = mpsc::channel(config.add_buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            config,
            store,
            clock,
            blank,
            meta: RwLock::new(meta),
            pending: Mutex::new(HashSet::new()),
        });

        let tasks = runtime::spawn_tasks(&inner, add_rx, &shutdown_rx);

        Ok(Self {
            inner,
            add_tx,
            shutdown_tx,
            tasks,
        })
    }

    /// Queues `s` for insertion into the current filter.
    ///
    /// Fire-and-forget: the call returns once the string is on the bounded
    /// add queue, blocking briefly only when the workers are behind by
    /// [`Config::add_buffer`] strings. A subsequent [`check`][Self::check]
    /// observes the insert only after a worker has processed it.
    pub async fn add(&self, s: impl Into<String>) {
        // The channel only closes on shutdown, which consumes the handle.
        let _ = self.add_tx.send(s.into()).await;
    }

    /// Returns true iff `s` was (probably) observed anywhere in the window.
    ///
    /// Probes the current filter, the aggregate, and every ring slot, so
    /// bits that reached a slot but are not yet folded into the aggregate
    /// still count. False positives are possible; false negatives are not,
    /// once the insert has been processed.
    pub async fn check(&self, s: &str) -> bool {
        self.inner.check(s).await
    }

    /// Estimates the number of distinct strings observed in the window.
    ///
    /// Snapshots the current filter and folds the aggregate into the
    /// snapshot under the shared lock, then computes the estimate outside
    /// it, so concurrent inserts are neither blocked nor double-counted.
    pub async fn approx_count(&self) -> f64 {
        self.inner.approx_count().await
    }

    /// Reshapes the ring to `n` interval slots.
    ///
    /// Growth zero-fills the new slots; shrinkage drops the oldest
    /// completed intervals, narrowing the window immediately. The aggregate
    /// is rebuilt before the call returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooFewIntervals`] when `n < 2`.
    pub async fn set_interval_num(&self, n: usize) -> Result<()> {
        if n < 2 {
            return Err(Error::TooFewIntervals { got: n });
        }

        let mut meta = self.inner.meta.write().await;
        meta.reshape_ring(n);

        let aggregate = self.inner.blank_filter();
        for slot in meta.ring.iter().flatten() {
            merge_filters(&aggregate, slot);
        }
        meta.aggregate = Arc::new(aggregate);

        Ok(())
    }

    /// Returns the coordinator's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the clock the coordinator schedules with.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Stops the coordinator: closes the add queue so the workers drain the
    /// backlog and exit, cancels the timers, joins every background task,
    /// and makes one best-effort upload of the remaining pending locations.
    pub async fn shutdown(self) {
        let Self {
            inner,
            add_tx,
            shutdown_tx,
            tasks,
        } = self;

        drop(add_tx);
        let _ = shutdown_tx.send(true);

        for task in tasks {
            if let Err(error) = task.await {
                tracing::warn!(%error, "background task ended abnormally");
            }
        }

        inner.final_flush().await;
    }
}

#[cfg(any(feature = "test-util", test))]
impl<S> RollingBloom<S>
where
    S: BitmapStore + 'static,
{
    /// Runs one incremental synchronization cycle, exactly as the sync
    /// timer would.
    pub async fn run_sync_once(&self) {
        self.inner.sync_once().await;
    }

    /// Runs one rotation, exactly as the rotation timer would at an
    /// interval boundary.
    pub async fn run_rotation_once(&self) {
        self.inner.rotate_once().await;
    }

    /// Inserts `s` synchronously, bypassing the add queue and the workers.
    pub async fn ingest(&self, s: &str) {
        self.inner.ingest(s).await;
    }

    /// The number of locations waiting to be uploaded.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }
}
