use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::interface::RemotePath;

/// Action to take when a path's cache entry is evicted or invalidated.
///
/// Invoked synchronously from the evicting call, so implementations must
/// return quickly and push real work onto a worker pool.
pub trait EvictionListener: Send + Sync {
    fn on_evict(&self, path: &RemotePath);
}

/// Lifecycle index over cached remote paths.
///
/// ## Eviction Policy
/// Bounded by entry count with a TTL measured from the last access; reads
/// and writes both count as access. Expired entries are purged from the LRU
/// tail on every touch, and capacity overflow evicts in LRU order.
///
/// Re-touching a live key only refreshes its access time; the listener fires
/// for capacity eviction, TTL expiry and explicit invalidation.
///
/// ## Implementation note
/// We use an `LruCache::unbounded()` because capacity enforcement has to run
/// the listener per evicted key, which the crate's own bound would bypass.
pub struct EntryCache {
    entries: Mutex<LruCache<RemotePath, Instant>>,
    capacity: usize,
    ttl: Duration,
    listener: Option<Arc<dyn EvictionListener>>,
}

impl EntryCache {
    pub fn new(
        capacity: usize,
        ttl: Duration,
        listener: Option<Arc<dyn EvictionListener>>,
    ) -> EntryCache {
        EntryCache {
            entries: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
            ttl,
            listener,
        }
    }

    /// Ensures `path` is present and marks it as just accessed.
    pub fn touch(&self, path: &RemotePath) {
        let mut evicted = Vec::new();
        {
            let mut entries = self.entries.lock();
            self.purge_expired(&mut entries, &mut evicted);
            if let Some(last_access) = entries.get_mut(path) {
                *last_access = Instant::now();
            } else {
                entries.put(path.clone(), Instant::now());
                while entries.len() > self.capacity {
                    if let Some((stale, _)) = entries.pop_lru() {
                        evicted.push(stale);
                    }
                }
            }
        }
        self.notify(&evicted);
    }

    /// Drops `path` immediately, firing the listener if it was present.
    pub fn invalidate(&self, path: &RemotePath) {
        let present = self.entries.lock().pop(path).is_some();
        if present {
            self.notify(std::slice::from_ref(path));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    // Access order doubles as access-time order, so expired entries are
    // contiguous at the LRU end.
    fn purge_expired(
        &self,
        entries: &mut LruCache<RemotePath, Instant>,
        evicted: &mut Vec<RemotePath>,
    ) {
        while let Some((_, last_access)) = entries.peek_lru() {
            if last_access.elapsed() < self.ttl {
                break;
            }
            if let Some((stale, _)) = entries.pop_lru() {
                evicted.push(stale);
            }
        }
    }

    // The lock is released before this runs so the listener can take its time
    // dispatching without stalling other touches.
    fn notify(&self, evicted: &[RemotePath]) {
        if let Some(listener) = &self.listener {
            for path in evicted {
                listener.on_evict(path);
            }
        }
    }
}
