//! Decoded tile cache with single-flight decoding.
//!
//! Entries are keyed by level and native tile coordinate and bounded by
//! both a byte budget and an entry count, evicting least recently used
//! first. Callers always receive their own copy of a cached buffer, so
//! eviction never affects a tile that has already been handed out.
//!
//! # Single flight
//!
//! The first request to miss on a key becomes its leader and runs the
//! compute future. Requests for the same key that arrive while it runs
//! wait on a `watch` channel for the leader's outcome instead of decoding
//! again. If the leader is dropped before finishing, its slot is released
//! and one of the waiters takes over.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::error::TileError;

use super::buffer::DecodedTile;

/// Default byte budget: 256 MiB
pub const DEFAULT_CACHE_BYTES: usize = 256 * 1024 * 1024;

/// Default entry limit
pub const DEFAULT_CACHE_ENTRIES: usize = 4096;

type Outcome = Result<Arc<DecodedTile>, TileError>;
type Flight = watch::Receiver<Option<Outcome>>;

/// Identifies one native tile of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub level: usize,
    pub col: u32,
    pub row: u32,
}

impl TileKey {
    pub const fn new(level: usize, col: u32, row: u32) -> Self {
        Self { level, col, row }
    }
}

/// Counters describing cache behaviour since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Requests that ran a compute
    pub misses: u64,
    /// Requests served by another request's compute
    pub coalesced: u64,
    pub entries: usize,
    pub bytes: usize,
}

struct Entries {
    lru: LruCache<TileKey, Arc<DecodedTile>>,
    bytes: usize,
}

/// Removes a leader's in-flight slot however the leader exits. Runs in
/// `Drop`, so the in-flight map needs a lock that can be taken synchronously.
struct FlightSlot<'a> {
    cache: &'a TileCache,
    key: TileKey,
}

impl Drop for FlightSlot<'_> {
    fn drop(&mut self) {
        lock(&self.cache.in_flight).remove(&self.key);
    }
}

/// LRU cache of decoded native tiles.
///
/// Locks are held only for map operations and never across an `.await`.
pub struct TileCache {
    entries: Mutex<Entries>,
    in_flight: Mutex<HashMap<TileKey, Flight>>,
    max_bytes: usize,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave the maps half-updated.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TileCache {
    /// A cache with the default byte and entry limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CACHE_BYTES, DEFAULT_CACHE_ENTRIES)
    }

    /// A cache holding at most `max_bytes` of pixel data in at most
    /// `max_entries` tiles. Either limit at zero disables retention;
    /// concurrent requests are still collapsed.
    pub fn with_limits(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::unbounded(),
                bytes: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
            max_bytes,
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Return the tile for `key`, computing it at most once across all
    /// concurrent callers.
    ///
    /// Successful results are cached; errors are returned to the leader
    /// and everyone waiting on it, then forgotten.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: TileKey,
        compute: F,
    ) -> Result<DecodedTile, TileError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DecodedTile, TileError>>,
    {
        let mut compute = Some(compute);

        loop {
            let flight = {
                let mut in_flight = lock(&self.in_flight);
                // Checked under the in-flight lock: a leader caches its
                // result before releasing its slot.
                if let Some(tile) = self.lookup(&key) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(tile);
                }
                match in_flight.get(&key) {
                    Some(flight) => Err(flight.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        in_flight.insert(key, rx);
                        Ok(tx)
                    }
                }
            };

            match flight {
                Ok(tx) => {
                    let _slot = FlightSlot { cache: self, key };
                    let Some(compute) = compute.take() else {
                        // Only reachable if a previous iteration led, which returns.
                        continue;
                    };

                    self.misses.fetch_add(1, Ordering::Relaxed);
                    debug!(level = key.level, col = key.col, row = key.row, "tile cache miss");

                    let outcome: Outcome = compute().await.map(Arc::new);
                    if let Ok(tile) = &outcome {
                        self.insert(key, Arc::clone(tile));
                    }
                    tx.send_replace(Some(outcome.clone()));
                    return outcome.map(|tile| (*tile).clone());
                }
                Err(mut rx) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    let shared = match rx.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        // Leader dropped without a result
                        Err(_) => None,
                    };
                    match shared {
                        Some(Ok(tile)) => return Ok((*tile).clone()),
                        Some(Err(err)) => return Err(err),
                        None => {
                            self.coalesced.fetch_sub(1, Ordering::Relaxed);
                            tokio::task::yield_now().await;
                        }
                    }
                }
            }
        }
    }

    /// Copy of the cached tile for `key`, marking it recently used.
    pub fn get(&self, key: &TileKey) -> Option<DecodedTile> {
        self.lookup(key)
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        lock(&self.entries).lru.contains(key)
    }

    /// Drop one entry. Returns whether it was present.
    pub fn remove(&self, key: &TileKey) -> bool {
        let mut entries = lock(&self.entries);
        match entries.lru.pop(key) {
            Some(tile) => {
                entries.bytes -= tile.byte_size();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut entries = lock(&self.entries);
        entries.lru.clear();
        entries.bytes = 0;
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of pixel data currently held.
    pub fn size(&self) -> usize {
        lock(&self.entries).bytes
    }

    pub fn capacity(&self) -> usize {
        self.max_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let entries = lock(&self.entries);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            entries: entries.lru.len(),
            bytes: entries.bytes,
        }
    }

    fn lookup(&self, key: &TileKey) -> Option<DecodedTile> {
        let tile = lock(&self.entries).lru.get(key).cloned()?;
        Some((*tile).clone())
    }

    fn insert(&self, key: TileKey, tile: Arc<DecodedTile>) {
        let size = tile.byte_size();
        if size > self.max_bytes || self.max_entries == 0 {
            debug!(level = key.level, col = key.col, row = key.row, size, "tile not retained");
            return;
        }

        let mut entries = lock(&self.entries);
        if let Some(old) = entries.lru.pop(&key) {
            entries.bytes -= old.byte_size();
        }
        while entries.lru.len() >= self.max_entries || entries.bytes + size > self.max_bytes {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => entries.bytes -= evicted.byte_size(),
                None => break,
            }
        }
        entries.bytes += size;
        entries.lru.put(key, tile);
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
