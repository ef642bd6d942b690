use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Aggregate counters for cache activity, shareable across threads.
///
/// `in_memory_retained_bytes` is a live gauge of the bytes held by admitted
/// but not-yet-flushed writes; it returns to zero once all flush tasks have
/// run to completion or failure.
#[derive(Debug, Default)]
pub struct CacheStats {
    cache_hit: AtomicU64,
    cache_miss: AtomicU64,
    in_memory_retained_bytes: AtomicI64,
}

impl CacheStats {
    pub fn new() -> CacheStats {
        CacheStats::default()
    }

    pub fn increment_cache_hit(&self) {
        self.cache_hit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_miss(&self) {
        self.cache_miss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_in_memory_retained_bytes(&self, delta: i64) {
        self.in_memory_retained_bytes
            .fetch_add(delta, Ordering::SeqCst);
    }

    pub fn cache_hit(&self) -> u64 {
        self.cache_hit.load(Ordering::Relaxed)
    }

    pub fn cache_miss(&self) -> u64 {
        self.cache_miss.load(Ordering::Relaxed)
    }

    pub fn in_memory_retained_bytes(&self) -> i64 {
        self.in_memory_retained_bytes.load(Ordering::SeqCst)
    }
}
