// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Distributed rolling-window approximate-count cache.
//!
//! This crate estimates the number of distinct string identifiers observed
//! across a fleet of processes during a sliding time window ("unique visitors
//! in the last 10 minutes"), and answers membership queries over that window
//! with one-sided Bloom error: no false negatives, bounded false positives.
//! Estimation is approximate and cheap; exactness is not offered.
//!
//! Each process runs a [`RollingBloom`] coordinator holding a *current* Bloom
//! filter plus a ring of historical filters, one per completed interval. A
//! background task rotates the ring at every interval boundary; another
//! periodically exchanges newly set bit locations with a shared bitfield
//! store (one key per interval) so every process eventually observes the
//! union of all processes' inserts. Correctness across the fleet relies only
//! on set-bit idempotence; no other coordination exists.
//!
//! The store is abstracted by `rolling_bloom_store`; production deployments
//! use the Redis implementation from `rolling_bloom_redis`, while tests use
//! its in-process `MemoryStore`.
//!
//! # Examples
//!
//! ```no_run
//! use rolling_bloom::{Config, RollingBloom};
//! use rolling_bloom_redis::RedisStore;
//! use tick::Clock;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::connect("redis://127.0.0.1/").await?;
//! let cache = RollingBloom::start(Config::new("visitors-"), store, Clock::new_tokio())?;
//!
//! cache.add("alice").await;
//! cache.add("bob").await;
//!
//! let uniques = cache.approx_count().await;
//! # let _ = uniques;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod coordinator;
pub mod error;
mod runtime;
mod sync;

#[doc(inline)]
pub use config::Config;
#[doc(inline)]
pub use coordinator::RollingBloom;
#[doc(inline)]
pub use error::{Error, Result};
