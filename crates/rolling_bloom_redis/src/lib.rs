// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Redis-backed bitmap store.
//!
//! [`RedisStore`] implements the `BitmapStore` trait on top of the `redis`
//! crate's [`ConnectionManager`], which multiplexes one automatically
//! reconnecting connection across any number of clones. Bit writes use the
//! `BITFIELD` command with unsigned single-bit fields, whose offset numbering
//! (most significant bit of byte 0 is offset 0) is the index convention the
//! whole framework shares, so filter locations are sent verbatim.
//!
//! # Examples
//!
//! ```no_run
//! use rolling_bloom_redis::RedisStore;
//! use rolling_bloom_store::BitmapStore;
//!
//! # async fn example() -> Result<(), rolling_bloom_store::Error> {
//! let store = RedisStore::connect("redis://127.0.0.1/").await?;
//!
//! store.set_bits("visitors-1700000040", &[17, 4_099]).await?;
//! let bitmap = store.fetch("visitors-1700000040").await?;
//! # Ok(())
//! # }
//! ```

use redis::aio::ConnectionManager;
use rolling_bloom_store::{BitmapStore, Error};

/// A `BitmapStore` backed by a shared Redis instance.
///
/// Cloning is cheap and clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Creates a store over an existing connection manager.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Connects to the Redis instance at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL cannot be parsed or the initial
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(Error::other)?;
        let connection = client.get_connection_manager().await.map_err(Error::other)?;

        Ok(Self::new(connection))
    }
}

// One BITFIELD invocation carrying a SET subcommand per offset.
fn bitfield_command(key: &str, offsets: &[usize]) -> redis::Cmd {
    let mut cmd = redis::cmd("BITFIELD");
    cmd.arg(key);
    for &offset in offsets {
        cmd.arg("SET").arg("u1").arg(offset).arg(1);
    }
    cmd
}

impl BitmapStore for RedisStore {
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut connection = self.connection.clone();

        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(Error::other)?;

        Ok(value)
    }

    async fn set_bits(&self, key: &str, offsets: &[usize]) -> Result<(), Error> {
        if offsets.is_empty() {
            return Ok(());
        }

        let mut connection = self.connection.clone();

        let _: redis::Value = bitfield_command(key, offsets)
            .query_async(&mut connection)
            .await
            .map_err(Error::other)?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let mut connection = self.connection.clone();

        let _: redis::Value = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(Error::other)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        count_occurrences(haystack, needle) > 0
    }

    fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|window| *window == needle).count()
    }

    #[test]
    fn bitfield_command_packs_one_set_per_offset() {
        let cmd = bitfield_command("prefix-1700000040", &[0, 9, 23]);
        let packed = cmd.get_packed_command();

        assert!(contains(&packed, b"BITFIELD"));
        assert!(contains(&packed, b"prefix-1700000040"));
        assert!(contains(&packed, b"u1"));
        assert!(contains(&packed, b"23"));
        assert_eq!(count_occurrences(&packed, b"SET"), 3);
    }

    // Ports the original compatibility check against a live instance; run
    // with `cargo test -- --ignored` next to a local Redis.
    #[tokio::test]
    #[ignore = "requires a running redis on localhost:6379"]
    async fn round_trips_filter_bits_through_redis() {
        use rolling_bloom_filter::BloomFilter;

        let store = RedisStore::connect("redis://127.0.0.1/").await.unwrap();
        let key = "rolling_bloom_redis-round_trip";
        store.remove(key).await.unwrap();

        let local = BloomFilter::new(10_001, 3).unwrap();
        let mut locations = local.add("abcd");
        locations.extend(local.add("1234"));

        store.set_bits(key, &locations).await.unwrap();
        let bitmap = store.fetch(key).await.unwrap().unwrap();

        let remote = BloomFilter::from_store_bytes(&bitmap, 10_001, 3).unwrap();
        assert!(remote.check("abcd"));
        assert!(remote.check("1234"));
        assert!(!remote.check("plmqx"));

        store.remove(key).await.unwrap();
    }
}
