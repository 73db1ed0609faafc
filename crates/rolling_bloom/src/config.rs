// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coordinator configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for a [`RollingBloom`][crate::RollingBloom] coordinator.
///
/// The measured window is `interval × interval_num`. Every fleet member
/// sharing a `key_prefix` must agree on `interval`, `bits`, and `hashes`;
/// the remaining fields are per-process tuning.
///
/// All fields are public: build one with [`Config::new`] and adjust what you
/// need. Validation happens when the coordinator starts, not here, so a
/// half-adjusted value never panics.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rolling_bloom::Config;
///
/// let mut config = Config::new("visitors-");
/// config.interval = Duration::from_secs(60);
/// config.interval_num = 10;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared key namespace on the external store. All fleet members must
    /// agree on it.
    pub key_prefix: String,

    /// Rotation period, which is also the interval-key granularity.
    /// Must be at least [`Config::MIN_INTERVAL`]; 60 seconds is a good pick.
    pub interval: Duration,

    /// Ring size; the window covers `interval × interval_num`.
    pub interval_num: usize,

    /// Cadence of the incremental synchronization with the store.
    /// Must be shorter than `interval`.
    pub sync_interval: Duration,

    /// Soft cap on the number of bit locations uploaded per incremental sync.
    pub upload_per_sync: usize,

    /// Filter bit count (`m`). Constant over the window and fleet-wide.
    pub bits: usize,

    /// Hash locations per string (`k`). Constant over the window and
    /// fleet-wide.
    pub hashes: usize,

    /// Grace period after the rotation flush before the finalized
    /// prior-interval bitmap is re-downloaded, covering store processing
    /// time and clock discrepancy between fleet members.
    pub settle_delay: Duration,

    /// Capacity of the bounded add queue. Inserts block briefly once this
    /// many strings are waiting for a worker.
    pub add_buffer: usize,

    /// Number of workers draining the add queue.
    pub insert_workers: usize,
}

impl Config {
    /// The smallest supported rotation interval.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(10);

    /// Creates a configuration with the given key prefix and defaults for
    /// everything else: a 10-minute window of ten 60-second intervals,
    /// syncing every 10 seconds with at most 64 uploads per sync.
    #[must_use]
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            interval: Duration::from_secs(60),
            interval_num: 10,
            sync_interval: Duration::from_secs(10),
            upload_per_sync: 64,
            bits: 100_003,
            hashes: 3,
            settle_delay: Duration::from_secs(10),
            add_buffer: 1_024,
            insert_workers: 1,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.interval < Self::MIN_INTERVAL {
            return Err(Error::IntervalTooShort {
                got: self.interval,
                min: Self::MIN_INTERVAL,
            });
        }
        if self.interval_num < 2 {
            return Err(Error::TooFewIntervals {
                got: self.interval_num,
            });
        }
        if self.sync_interval.is_zero() || self.sync_interval >= self.interval {
            return Err(Error::InvalidSyncInterval {
                got: self.sync_interval,
            });
        }
        if self.bits == 0 || self.hashes == 0 {
            return Err(Error::InvalidFilterShape {
                bits: self.bits,
                hashes: self.hashes,
            });
        }
        if self.upload_per_sync == 0 {
            return Err(Error::InvalidUploadLimit);
        }
        if self.add_buffer == 0 || self.insert_workers == 0 {
            return Err(Error::InvalidIngestQueue);
        }

        Ok(())
    }
}
