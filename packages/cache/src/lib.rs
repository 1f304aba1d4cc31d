#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Bounded TTL cache for viewport-scoped plot snapshots.
//!
//! Entries are keyed by a fingerprint of the viewport bounds (rounded to
//! 4 decimal places, so near-identical viewports collapse to one entry)
//! combined with the active filter params. An entry is valid while
//! younger than the TTL; expired entries are evicted lazily on lookup and
//! on every insert, and when the store still exceeds its size limit the
//! oldest entries go first. The whole store is cleared after any
//! successful mutation, since server-side results become stale across all
//! viewports at once.
//!
//! Timestamps use `tokio::time::Instant` so tests can drive expiry with
//! the paused test clock.

use std::collections::HashMap;

use plot_pulse_filter::FilterParams;
use plot_pulse_geo::MapBounds;
use plot_pulse_plot_models::Plot;
use tokio::time::{Duration, Instant};

/// Default entry time-to-live: 30 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Default maximum number of entries.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Decimal places bounds coordinates are rounded to when composing keys.
const KEY_PRECISION: usize = 4;

/// One cached viewport snapshot.
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<Plot>,
    bounds: MapBounds,
    inserted_at: Instant,
}

/// Keyed store of viewport-scoped plot snapshots.
#[derive(Debug)]
pub struct PlotCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_size: usize,
}

impl Default for PlotCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_SIZE)
    }
}

impl PlotCache {
    /// Creates a cache with the given TTL and entry limit.
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_size,
        }
    }

    /// Composes the cache key for a viewport and filter set.
    ///
    /// Bounds coordinates are rounded to [`KEY_PRECISION`] decimal places
    /// so sub-meter viewport jitter still hits the same entry.
    #[must_use]
    pub fn fingerprint(bounds: &MapBounds, params: &FilterParams) -> String {
        format!(
            "{:.p$}_{:.p$}_{:.p$}_{:.p$}|{}",
            bounds.north,
            bounds.south,
            bounds.east,
            bounds.west,
            params.fingerprint(),
            p = KEY_PRECISION,
        )
    }

    /// Looks up a live entry, evicting it if expired.
    pub fn get(&mut self, key: &str) -> Option<Vec<Plot>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                Some(entry.data.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts or overwrites an entry, then runs an eviction sweep.
    pub fn put(&mut self, key: String, data: Vec<Plot>, bounds: MapBounds) {
        self.entries.insert(
            key,
            CacheEntry {
                data,
                bounds,
                inserted_at: Instant::now(),
            },
        );
        self.evict();
    }

    /// Drops expired entries, then the oldest entries until the store is
    /// within its size limit.
    pub fn evict(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);

        while self.entries.len() > self.max_size {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    log::trace!("evicting oldest cache entry {key}");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drops every entry. Called after any successful mutation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live-or-expired entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The bounds an entry was fetched for, if the entry exists.
    #[must_use]
    pub fn bounds_of(&self, key: &str) -> Option<MapBounds> {
        self.entries.get(key).map(|entry| entry.bounds)
    }
}
