//! Scoped caches for raster handles and pixel samples.
//!
//! Nothing here is global. A [`ResultCache`] lives for one batch: it owns
//! the batch's sample cache and either a fresh [`HandleCache`] or a shared
//! one. Sharing handles across batches is the explicit
//! [`CacheScope::Process`] opt-in; samples are never shared.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;

use crate::coords::{PixelCoord, TileId};
use crate::error::{ElevationError, Result};

/// Lifetime of opened raster handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheScope {
    /// Handles are dropped when the batch finishes.
    #[default]
    Batch,
    /// Handles are kept, up to the configured capacity, for the lifetime of
    /// the service. Tile files must not change while the service runs;
    /// call `invalidate_tile` or `clear_cache` after replacing one.
    Process,
}

impl FromStr for CacheScope {
    type Err = ElevationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(CacheScope::Batch),
            "process" => Ok(CacheScope::Process),
            other => Err(ElevationError::Config {
                message: format!("unknown cache scope '{other}' (expected 'batch' or 'process')"),
            }),
        }
    }
}

/// Identity of one pixel of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelKey {
    pub tile: TileId,
    pub pixel: PixelCoord,
}

impl PixelKey {
    pub fn new(tile: TileId, pixel: PixelCoord) -> Self {
        Self { tile, pixel }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of tiles currently in the cache.
    pub entry_count: u64,
    /// Number of cache hits (requests served from cache).
    pub hit_count: u64,
    /// Number of cache misses (tiles opened from disk).
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Opened raster handles keyed by tile file name.
///
/// Loading is at-most-once per key: concurrent callers asking for the same
/// file wait for the first loader and share its handle. A failed load is not
/// cached, so the next request tries again.
pub struct HandleCache<H> {
    handles: Cache<String, Arc<H>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl<H: Send + Sync + 'static> HandleCache<H> {
    /// A cache that evicts least-recently-used handles beyond `capacity`.
    pub fn bounded(capacity: u64) -> Self {
        Self::with_cache(Cache::builder().max_capacity(capacity).build())
    }

    /// A cache without eviction, for a single batch.
    pub fn unbounded() -> Self {
        Self::with_cache(Cache::builder().build())
    }

    fn with_cache(handles: Cache<String, Arc<H>>) -> Self {
        Self {
            handles,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// Return the cached handle for `file_name`, loading it on first use.
    pub fn get_or_load<F>(&self, file_name: &str, load: F) -> Result<Arc<H>>
    where
        F: FnOnce() -> Result<H>,
    {
        let mut loaded = false;
        let handle = self
            .handles
            .try_get_with(file_name.to_string(), || {
                loaded = true;
                load().map(Arc::new)
            })
            .map_err(|e| (*e).clone())?;

        if loaded {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(handle)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.handles.contains_key(file_name)
    }

    /// Remove one handle.
    pub fn invalidate(&self, file_name: &str) {
        self.handles.invalidate(file_name);
    }

    /// Remove every handle.
    pub fn clear(&self) {
        self.handles.invalidate_all();
        self.handles.run_pending_tasks();
    }

    /// Number of handles currently held.
    pub fn entry_count(&self) -> u64 {
        self.handles.run_pending_tasks();
        self.handles.entry_count()
    }

    /// Maximum number of handles, or `None` when unbounded.
    pub fn capacity(&self) -> Option<u64> {
        self.handles.policy().max_capacity()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}

/// The cache one batch resolves through.
pub struct ResultCache<H> {
    handles: Arc<HandleCache<H>>,
    samples: Cache<PixelKey, f64>,
}

impl<H: Send + Sync + 'static> ResultCache<H> {
    /// A cache whose handles are dropped with the batch.
    pub fn per_batch() -> Self {
        Self::with_handles(Arc::new(HandleCache::unbounded()))
    }

    /// A batch cache that opens tiles through a shared handle cache.
    pub fn with_handles(handles: Arc<HandleCache<H>>) -> Self {
        Self {
            handles,
            samples: Cache::builder().build(),
        }
    }

    pub fn handles(&self) -> &HandleCache<H> {
        &self.handles
    }

    /// See [`HandleCache::get_or_load`].
    pub fn get_or_load<F>(&self, file_name: &str, load: F) -> Result<Arc<H>>
    where
        F: FnOnce() -> Result<H>,
    {
        self.handles.get_or_load(file_name, load)
    }

    /// Return the sample for `key`, extracting it with `read` on first use.
    pub fn get_or_read<F>(&self, key: PixelKey, read: F) -> Result<f64>
    where
        F: FnOnce() -> Result<f64>,
    {
        self.samples
            .try_get_with(key, read)
            .map_err(|e| (*e).clone())
    }

    pub fn sample(&self, key: &PixelKey) -> Option<f64> {
        self.samples.get(key)
    }

    /// Number of distinct samples extracted in this batch.
    pub fn sample_count(&self) -> u64 {
        self.samples.run_pending_tasks();
        self.samples.entry_count()
    }

    /// Number of handles reachable from this batch.
    pub fn handle_count(&self) -> u64 {
        self.handles.entry_count()
    }
}
