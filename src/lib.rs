#![cfg_attr(feature = "strict", deny(warnings))]

//! Disk-backed cache for byte ranges of remote files.
//!
//! Reads of a previously cached `(path, offset, length)` are served from
//! local files; new data is persisted asynchronously and merged with
//! adjacent cached ranges. Cache state is rebuilt from empty on startup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use entry_cache::{EntryCache, EvictionListener};
pub use error::{CacheError, Result};
pub use exec::TaskPool;
pub use interface::{ReadRequest, RemotePath};
pub use manager::LocalRangeCacheManager;
pub use metrics::set_metrics_service_name;
pub use stats::CacheStats;

mod entry_cache;
mod error;
mod exec;
mod interface;
mod manager;
mod metrics;
mod range_map;
mod stats;
mod util;

/// Read/write surface a remote-file reader drives around its origin fetches.
///
/// `get` fills the caller's buffer when the cache can serve the whole
/// request; `put` offers freshly fetched bytes for later reads and may drop
/// them under memory pressure.
pub trait CacheManager: Send + Sync {
    fn get(&self, request: &ReadRequest, buffer: &mut [u8], buffer_offset: usize) -> bool;
    fn put(&self, request: &ReadRequest, data: &[u8]);
}

/// Tunables for the local range cache.
pub struct CacheConfig {
    /// Directory where cache files live.
    pub base_directory: PathBuf,
    /// Capacity of the lifecycle entry cache, in remote files.
    pub max_cached_entries: usize,
    /// Entries idle for longer than this are evicted.
    pub cache_ttl: Duration,
    /// Budget for admitted-but-unflushed write buffers, in bytes.
    pub max_in_memory_cache_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            base_directory: std::env::temp_dir().join("range_cache"),
            max_cached_entries: 1000,
            cache_ttl: Duration::from_secs(5 * 60),
            max_in_memory_cache_size: 64 * 1024 * 1024,
        }
    }
}

/// Factory method for building the cache manager together with its two
/// worker pools: one for write/flush tasks, one for deletion.
pub fn from_config(
    config: &CacheConfig,
    stats: Arc<CacheStats>,
) -> Result<Arc<LocalRangeCacheManager>> {
    let flush_pool = Arc::new(TaskPool::new("cache-flush", 4)?);
    let removal_pool = Arc::new(TaskPool::new("cache-removal", 1)?);
    LocalRangeCacheManager::new(config, stats, flush_pool, removal_pool)
}
