use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the buffer pool.
///
/// Updated with relaxed atomics; a snapshot is consistent per counter only.
#[derive(Debug, Default)]
pub struct BufferPoolStats {
    /// Fetches served from a resident frame
    pub cache_hits: AtomicU64,
    /// Fetches that had to read from disk
    pub cache_misses: AtomicU64,
    /// Frames reclaimed through the replacer
    pub evictions: AtomicU64,
    /// Pages read from disk
    pub pages_read: AtomicU64,
    /// Pages written to disk
    pub pages_written: AtomicU64,
}

impl BufferPoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction of fetches served without I/O, 0.0 when nothing was fetched.
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pages_read: self.pages_read.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`BufferPoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub pages_read: u64,
    pub pages_written: u64,
}

impl StatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} hit_rate={:.2} evictions={} reads={} writes={}",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate(),
            self.evictions,
            self.pages_read,
            self.pages_written
        )
    }
}
