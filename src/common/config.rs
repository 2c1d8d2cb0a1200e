use super::error::{FerruleError, Result};
use super::types::{FrameId, PageId};

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Default number of entries per page table bucket
pub const DEFAULT_BUCKET_SIZE: usize = 4;

/// Upper bound on the page table's global depth.
/// Reaching it means every key in a bucket hashes identically.
pub const MAX_GLOBAL_DEPTH: u32 = 32;

/// Capacity of the disk scheduler's request queue
pub const DISK_SCHEDULER_QUEUE_DEPTH: usize = 128;

/// Tunables for a [`BufferPoolManager`](crate::buffer::BufferPoolManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool
    pub pool_size: usize,
    /// K for the LRU-K replacer
    pub replacer_k: usize,
    /// Entries per page table bucket
    pub bucket_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            replacer_k: DEFAULT_LRUK_K,
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

impl BufferPoolConfig {
    pub fn new(pool_size: usize, replacer_k: usize) -> Self {
        Self {
            pool_size,
            replacer_k,
            ..Self::default()
        }
    }

    pub fn with_bucket_size(mut self, bucket_size: usize) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    /// Rejects configurations the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(FerruleError::InvalidConfig("pool_size must be > 0".into()));
        }
        if self.pool_size >= INVALID_FRAME_ID.as_usize() {
            return Err(FerruleError::InvalidConfig(format!(
                "pool_size {} exceeds the frame id space",
                self.pool_size
            )));
        }
        if self.replacer_k == 0 {
            return Err(FerruleError::InvalidConfig("replacer_k must be > 0".into()));
        }
        if self.bucket_size == 0 {
            return Err(FerruleError::InvalidConfig("bucket_size must be > 0".into()));
        }
        Ok(())
    }
}
