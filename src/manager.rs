use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entry_cache::{EntryCache, EvictionListener};
use crate::error::{CacheError, Result};
use crate::exec::TaskPool;
use crate::interface::{ReadRequest, RemotePath};
use crate::metrics::{
    CACHE_REQUESTS, EVICTED_ENTRIES, FLUSH_ERROR_COUNT, INFLIGHT_BYTES, REJECTED_WRITES,
    STATUS_HIT, STATUS_MISS,
};
use crate::range_map::RangeMap;
use crate::stats::CacheStats;
use crate::{CacheConfig, CacheManager};

const EXTENSION: &str = "cache";

/// One contiguous chunk of a remote file stored on local disk.
///
/// `offset` is the remote-file offset at which the local file starts; the
/// file's on-disk length equals the length of the interval that maps to it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LocalCacheFile {
    offset: u64,
    path: Arc<PathBuf>,
}

impl LocalCacheFile {
    fn new(offset: u64, path: PathBuf) -> LocalCacheFile {
        LocalCacheFile {
            offset,
            path: Arc::new(path),
        }
    }
}

/// Per-remote-file interval map, guarded by its own reader/writer lock.
#[derive(Debug, Default)]
struct CacheRange {
    ranges: RwLock<RangeMap<LocalCacheFile>>,
}

type PersistedRanges = DashMap<RemotePath, Arc<CacheRange>>;

/// Tears down a path's cached ranges once its lifecycle entry goes away.
struct RangeRemovalListener {
    persisted: Arc<PersistedRanges>,
    removal_pool: Arc<TaskPool>,
}

impl EvictionListener for RangeRemovalListener {
    fn on_evict(&self, path: &RemotePath) {
        let range = match self.persisted.remove(path) {
            Some((_, range)) => range,
            None => return,
        };
        EVICTED_ENTRIES.inc();
        debug!("evicting cached ranges for {}", path);
        self.removal_pool.submit(move || {
            // The range is no longer reachable, so the read lock only fences
            // against readers that are still draining.
            let files: Vec<Arc<PathBuf>> = range
                .ranges
                .read()
                .iter()
                .map(|(_, file)| file.path.clone())
                .collect();
            // A reader holding an already-open handle keeps working on
            // open-unlink semantics; late lookups miss and refetch.
            for file in files {
                try_delete_file(&file);
            }
        });
    }
}

/// Disk-backed cache of byte ranges of remote files.
///
/// `get` serves a request when a single cached range covers it; `put` admits
/// bytes against an in-flight memory budget and persists them on the flush
/// pool, merging the new file with touching neighbors. Per-path lifecycle is
/// driven entirely by the entry cache: once a path is evicted there, its
/// interval map and files go away.
///
/// Cache state lives only in memory; whatever the base directory holds at
/// startup is purged.
pub struct LocalRangeCacheManager {
    // per remote file, the interval map of its locally cached chunks
    persisted: Arc<PersistedRanges>,
    // sole lifecycle driver for `persisted`
    entry_cache: EntryCache,
    stats: Arc<CacheStats>,
    flush_pool: Arc<TaskPool>,
    removal_pool: Arc<TaskPool>,
    base_directory: PathBuf,
    max_inflight_bytes: u64,
}

impl LocalRangeCacheManager {
    pub fn new(
        config: &CacheConfig,
        stats: Arc<CacheStats>,
        flush_pool: Arc<TaskPool>,
        removal_pool: Arc<TaskPool>,
    ) -> Result<Arc<LocalRangeCacheManager>> {
        let persisted: Arc<PersistedRanges> = Arc::new(DashMap::new());
        let listener = Arc::new(RangeRemovalListener {
            persisted: persisted.clone(),
            removal_pool: removal_pool.clone(),
        });
        let entry_cache = EntryCache::new(
            config.max_cached_entries,
            config.cache_ttl,
            Some(listener),
        );

        prepare_base_directory(&config.base_directory, &removal_pool)?;

        Ok(Arc::new(LocalRangeCacheManager {
            persisted,
            entry_cache,
            stats,
            flush_pool,
            removal_pool,
            base_directory: config.base_directory.clone(),
            max_inflight_bytes: config.max_in_memory_cache_size,
        }))
    }

    /// Serves `request` from the cache into `buffer[buffer_offset..]`.
    ///
    /// On `true`, `buffer[buffer_offset..buffer_offset + length]` holds the
    /// requested bytes. On `false` the buffer contents are undefined and the
    /// caller must read from the origin.
    pub fn get(&self, request: &ReadRequest, buffer: &mut [u8], buffer_offset: usize) -> bool {
        let hit = self.read(request, buffer, buffer_offset);
        if hit {
            self.stats.increment_cache_hit();
            CACHE_REQUESTS.with_label_values(&[STATUS_HIT]).inc();
        } else {
            self.stats.increment_cache_miss();
            CACHE_REQUESTS.with_label_values(&[STATUS_MISS]).inc();
        }
        hit
    }

    /// Offers `data` as the cached bytes for `request`'s range.
    ///
    /// Admission is a hard check against the in-flight budget; rejected
    /// writes are dropped silently. Admitted writes are copied and flushed
    /// asynchronously.
    pub fn put(&self, request: &ReadRequest, data: &[u8]) {
        debug_assert_eq!(data.len(), request.length() as usize);
        if data.is_empty() {
            return;
        }
        // compare in u64 space so a budget above i64::MAX stays unbounded
        let retained = self.stats.in_memory_retained_bytes().max(0) as u64;
        if retained + data.len() as u64 >= self.max_inflight_bytes {
            REJECTED_WRITES.inc();
            return;
        }

        let len = data.len() as i64;
        self.stats.add_in_memory_retained_bytes(len);
        INFLIGHT_BYTES.add(len);
        self.entry_cache.touch(request.path());

        // The guard travels with the task so the budget is released even if
        // the pool drops the task at shutdown.
        let guard = RetainedBytesGuard {
            stats: self.stats.clone(),
            len,
        };
        // the input buffer may be reused by the caller
        let data = data.to_vec();
        let request = request.clone();
        let persisted = self.persisted.clone();
        let new_path = self
            .base_directory
            .join(format!("{}.{}", Uuid::new_v4(), EXTENSION));
        self.flush_pool.submit(move || {
            let _guard = guard;
            if let Err(e) = flush_to_disk(&persisted, &request, &data, &new_path) {
                FLUSH_ERROR_COUNT.inc();
                warn!(
                    "failed to persist cache file {:?} for {} ({} bytes): {:?}",
                    new_path,
                    request,
                    request.length(),
                    e
                );
            }
        });
    }

    /// Stops both worker pools immediately. Queued and in-flight tasks are
    /// abandoned; any files they leave behind are purged on the next startup.
    pub fn destroy(&self) {
        self.flush_pool.shutdown();
        self.removal_pool.shutdown();
    }

    fn read(&self, request: &ReadRequest, buffer: &mut [u8], buffer_offset: usize) -> bool {
        if request.length() == 0 {
            return true;
        }

        // every read counts as an access, hit or not
        self.entry_cache.touch(request.path());

        let range = match self.persisted.get(request.path()) {
            Some(range) => range.value().clone(),
            None => return false,
        };

        let file = {
            let ranges = range.ranges.read();
            let covering = ranges.overlapping(request.offset(), request.end());
            // Several entries means a hole in between; none means uncached.
            // The request must be served by a single contiguous range.
            match covering.as_slice() {
                [(_, file)] => (*file).clone(),
                _ => return false,
            }
        };

        if file.offset > request.offset() {
            // the one cached range starts past the request
            return false;
        }

        let slot = &mut buffer[buffer_offset..buffer_offset + request.length() as usize];
        match read_exact_at(&file.path, request.offset() - file.offset, slot) {
            Ok(()) => true,
            Err(e) => {
                // a concurrent eviction may have unlinked the file under us
                debug!("failed reading cached range {:?}: {:?}", file.path, e);
                false
            }
        }
    }
}

impl CacheManager for LocalRangeCacheManager {
    fn get(&self, request: &ReadRequest, buffer: &mut [u8], buffer_offset: usize) -> bool {
        LocalRangeCacheManager::get(self, request, buffer, buffer_offset)
    }

    fn put(&self, request: &ReadRequest, data: &[u8]) {
        LocalRangeCacheManager::put(self, request, data)
    }
}

/// Releases the admitted byte count when the flush task finishes or is
/// dropped unrun.
struct RetainedBytesGuard {
    stats: Arc<CacheStats>,
    len: i64,
}

impl Drop for RetainedBytesGuard {
    fn drop(&mut self) {
        self.stats.add_in_memory_retained_bytes(-self.len);
        INFLIGHT_BYTES.sub(self.len);
    }
}

/// Persists one admitted write: builds a new local file merging the incoming
/// bytes with the touching neighbors, then swaps it into the interval map if
/// the neighborhood is still what was observed.
fn flush_to_disk(
    persisted: &PersistedRanges,
    request: &ReadRequest,
    data: &[u8],
    new_path: &Path,
) -> Result<()> {
    let range = persisted
        .entry(request.path().clone())
        .or_default()
        .value()
        .clone();

    // Snapshot the entries touching either end of the incoming range. All
    // file I/O happens after the lock is dropped.
    let (prev, next) = {
        let ranges = range.ranges.read();
        let prev = request
            .offset()
            .checked_sub(1)
            .and_then(|point| ranges.get(point).map(|(_, file)| file.clone()));
        let next = ranges.get(request.end()).map(|(_, file)| file.clone());
        (prev, next)
    };

    if prev.is_some() && prev == next {
        // one existing range spans both endpoints, nothing to write
        debug!("{} is already covered by a cached range", request);
        return Ok(());
    }

    let (new_start, new_len) =
        match build_merged_file(request, data, new_path, prev.as_ref(), next.as_ref()) {
            Ok(Some(span)) => span,
            Ok(None) => {
                // the incoming range lies fully inside `prev`
                try_delete_file(new_path);
                return Ok(());
            }
            Err(e) => {
                try_delete_file(new_path);
                return Err(e);
            }
        };

    // Commit only if the neighborhood is unchanged; a concurrent flush that
    // rewrote either neighbor invalidates the file just built.
    let mut files_to_delete: HashSet<Arc<PathBuf>> = HashSet::new();
    let updated = {
        let mut ranges = range.ranges.write();
        let current_prev = request
            .offset()
            .checked_sub(1)
            .and_then(|point| ranges.get(point).map(|(_, file)| file.clone()));
        let current_next = ranges.get(request.end()).map(|(_, file)| file.clone());

        if current_prev != prev || current_next != next {
            false
        } else {
            let file = LocalCacheFile::new(new_start, new_path.to_path_buf());
            // displaced entries are the neighbors plus anything the new
            // range fully covers
            for (_, stale) in ranges.replace(new_start, new_start + new_len, file) {
                files_to_delete.insert(stale.path);
            }
            true
        }
    };

    if !updated {
        // The new file was never published, so discarding it is free.
        debug!("lost the commit race for {}, discarding {:?}", request, new_path);
        files_to_delete.clear();
        files_to_delete.insert(Arc::new(new_path.to_path_buf()));
    }
    for file in &files_to_delete {
        try_delete_file(file);
    }
    Ok(())
}

/// Writes the union of `prev`, `data` and `next` to `new_path`.
///
/// Returns the `(start, length)` of the merged range, or `None` when the
/// incoming range turns out to lie fully inside `prev`.
fn build_merged_file(
    request: &ReadRequest,
    data: &[u8],
    new_path: &Path,
    prev: Option<&LocalCacheFile>,
    next: Option<&LocalCacheFile>,
) -> Result<Option<(u64, u64)>> {
    // create-new so a name collision surfaces as an error instead of a
    // silent overwrite
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(new_path)?;

    let (new_start, mut new_len) = match prev {
        None => {
            out.write_all(data)?;
            (request.offset(), data.len() as u64)
        }
        Some(prev) => {
            // copy the previous file's data, then the part of the incoming
            // bytes it doesn't already hold
            let prev_bytes = fs::read(prev.path.as_ref())?;
            out.write_all(&prev_bytes)?;
            let prev_end = prev.offset + prev_bytes.len() as u64;
            if request.end() <= prev_end {
                return Ok(None);
            }
            let skip = (prev_end - request.offset()) as usize;
            out.write_all(&data[skip..])?;
            (prev.offset, (prev_bytes.len() + data.len() - skip) as u64)
        }
    };

    if let Some(next) = next {
        // append the part of the following file past the incoming range
        let mut file = File::open(next.path.as_ref())?;
        file.seek(SeekFrom::Start(request.end() - next.offset))?;
        let mut tail = Vec::new();
        file.read_to_end(&mut tail)?;
        out.write_all(&tail)?;
        new_len += tail.len() as u64;
    }

    Ok(Some((new_start, new_len)))
}

fn read_exact_at(path: &Path, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

/// Checks that the base directory is usable, creating it if absent. An
/// existing directory is treated as stale and its files are purged on the
/// removal pool; nothing survives a restart.
fn prepare_base_directory(base: &Path, removal_pool: &TaskPool) -> Result<()> {
    match base.metadata() {
        Ok(metadata) => {
            if !metadata.is_dir() || metadata.permissions().readonly() {
                return Err(CacheError::CacheNotWritableDirectory);
            }
            let stale: Vec<PathBuf> = match fs::read_dir(base) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .map(|entry| entry.path())
                    .collect(),
                Err(_) => return Ok(()),
            };
            if !stale.is_empty() {
                info!("purging {} stale files from cache dir {:?}", stale.len(), base);
                removal_pool.submit(move || {
                    for path in stale {
                        try_delete_file(&path);
                    }
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("cache dir {:?} doesn't exist, creating", base);
            fs::create_dir_all(base)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn try_delete_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            debug!("failed to delete cache file {:?}: {:?}", path, e);
        }
    }
}
