// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for the rotational coordinator.

use std::time::Duration;

/// A specialized `Result` type for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from constructing or reconfiguring a coordinator.
///
/// Every variant is a configuration mistake caught before any background
/// task starts. Transient store failures are never surfaced through this
/// type; the synchronization routines log and absorb them, and the next
/// scheduled cycle is the retry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The rotation interval is below the supported minimum.
    ///
    /// Interval keys have whole-second granularity and the fleet needs the
    /// settle window to fit inside an interval, so very short intervals
    /// cannot work.
    #[error("rotation interval must be at least {min:?} (got {got:?})")]
    IntervalTooShort {
        /// The configured interval.
        got: Duration,
        /// The smallest supported interval.
        min: Duration,
    },

    /// Fewer than two ring slots were requested.
    ///
    /// One slot is always the write target of the next rotation, so a window
    /// needs at least two.
    #[error("the ring needs at least 2 interval slots (got {got})")]
    TooFewIntervals {
        /// The requested slot count.
        got: usize,
    },

    /// The sync cadence is zero or does not fit inside the rotation interval.
    #[error("sync interval must be positive and shorter than the rotation interval (got {got:?})")]
    InvalidSyncInterval {
        /// The configured sync interval.
        got: Duration,
    },

    /// The filter parameters are unusable (zero bits or zero hash locations).
    #[error("filter parameters must be positive (got m = {bits}, k = {hashes})")]
    InvalidFilterShape {
        /// The configured bit count.
        bits: usize,
        /// The configured hash count.
        hashes: usize,
    },

    /// The per-sync upload cap is zero, which would starve replication.
    #[error("upload_per_sync must be at least 1")]
    InvalidUploadLimit,

    /// The ingest path is configured with no buffer or no workers.
    #[error("the add queue needs a positive capacity and at least one worker")]
    InvalidIngestQueue,

    /// The filter kernel rejected the configured parameters.
    #[error(transparent)]
    Filter(#[from] rolling_bloom_filter::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn display_carries_values() {
        let error = Error::IntervalTooShort {
            got: Duration::from_secs(1),
            min: Duration::from_secs(10),
        };

        assert!(error.to_string().contains("1s"));
        assert!(error.to_string().contains("10s"));
    }
}
