use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::common::{BufferPoolConfig, FerruleError, FrameId, PageId, Result};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskIo, DiskScheduler};

use super::{BufferPoolStats, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// BufferPoolManager is responsible for fetching database pages from disk
/// and storing them in memory. It manages a fixed number of frames and uses
/// the LRU-K replacement policy to decide which pages to evict.
///
/// Every public operation runs under a single latch that also covers the
/// page table and the replacer. Disk I/O for eviction, fetch and delete runs
/// under it too; flushes pin the page and write with the latch released.
///
/// Pages handed out by [`fetch_page`](Self::fetch_page) and
/// [`new_page`](Self::new_page) stay pinned until released with
/// [`unpin_page`](Self::unpin_page). The guard-returning variants
/// ([`checked_read_page`](Self::checked_read_page),
/// [`checked_write_page`](Self::checked_write_page),
/// [`new_page_guarded`](Self::new_page_guarded)) unpin on drop.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// The buffer pool frames, indexed by frame ID
    frames: Vec<Arc<FrameHeader>>,
    /// Page table: maps resident page IDs to frame IDs
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
    /// Pool latch guarding the free list. Frames on it are always reset.
    latch: Mutex<VecDeque<FrameId>>,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
    stats: BufferPoolStats,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value for LRU-K,
    /// and page store.
    ///
    /// # Panics
    /// Panics if `pool_size` or `k` is 0.
    pub fn new(pool_size: usize, k: usize, disk: Arc<dyn DiskIo>) -> Self {
        let config = BufferPoolConfig::new(pool_size, k);
        if let Err(e) = config.validate() {
            panic!("{}", e);
        }
        Self::build(config, disk)
    }

    /// Creates a BufferPoolManager from a validated configuration.
    pub fn with_config(config: BufferPoolConfig, disk: Arc<dyn DiskIo>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, disk))
    }

    fn build(config: BufferPoolConfig, disk: Arc<dyn DiskIo>) -> Self {
        let pool_size = config.pool_size;
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        debug!(
            pool_size,
            k = config.replacer_k,
            bucket_size = config.bucket_size,
            "buffer_pool.init"
        );

        Self {
            pool_size,
            frames,
            page_table: ExtendibleHashTable::new(config.bucket_size),
            replacer: LruKReplacer::new(config.replacer_k, pool_size),
            latch: Mutex::new(free_list),
            disk_scheduler: DiskScheduler::new(disk),
            stats: BufferPoolStats::new(),
        }
    }

    /// Fetches a page and pins it.
    ///
    /// Returns `Ok(None)` when the page is not resident and every frame is
    /// pinned. The caller must balance this with `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<FrameHeader>>> {
        Ok(self
            .fetch_frame(page_id)?
            .map(|frame_id| Arc::clone(&self.frames[frame_id.as_usize()])))
    }

    /// Allocates a fresh page in a zeroed, pinned frame.
    ///
    /// Returns `Ok(None)` when every frame is pinned; no page id is consumed
    /// in that case.
    pub fn new_page(&self) -> Result<Option<(PageId, Arc<FrameHeader>)>> {
        Ok(self.new_frame()?.map(|(page_id, frame_id)| {
            (page_id, Arc::clone(&self.frames[frame_id.as_usize()]))
        }))
    }

    /// Drops one pin on a page, marking it dirty if `is_dirty`.
    ///
    /// Returns false if the page is not resident or not pinned. The dirty flag
    /// is only ever set here; flushing is what clears it.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _latch = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = self.frame(frame_id, page_id);
        if !frame.is_pinned() {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == Some(0) {
            self.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes a resident page to disk if it is dirty.
    ///
    /// Returns `Ok(false)` if the page is not resident. The write itself runs
    /// outside the pool latch, so a flush waits on a guard holder without
    /// stalling the rest of the pool.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let frame_id = {
            let _latch = self.latch.lock();

            let Some(frame_id) = self.page_table.find(&page_id) else {
                return Ok(false);
            };
            let frame = self.frame(frame_id, page_id);
            if !frame.is_dirty() {
                return Ok(true);
            }
            // Keeps the page in this frame once the latch is released
            frame.pin();
            self.set_evictable(frame_id, false);
            frame_id
        };

        let written = self.write_pinned_frame(&self.frames[frame_id.as_usize()], page_id);

        let _latch = self.latch.lock();
        if self.frames[frame_id.as_usize()].unpin() == Some(0) {
            self.set_evictable(frame_id, true);
        }
        written.map(|()| true)
    }

    /// Writes every resident dirty page to disk.
    ///
    /// A failing page does not stop the others; failures are logged and
    /// returned.
    pub fn flush_all_pages(&self) -> Vec<(PageId, FerruleError)> {
        let mut flushed = 0usize;
        let mut failures = Vec::new();
        for frame in &self.frames {
            let page_id = frame.page_id();
            if !page_id.is_valid() || !frame.is_dirty() {
                continue;
            }
            // A page that moved out of the frame meanwhile was written on eviction
            match self.flush_page(page_id) {
                Ok(_) => flushed += 1,
                Err(e) => {
                    warn!(page_id = page_id.as_u32(), error = %e, "buffer_pool.flush_failed");
                    failures.push((page_id, e));
                }
            }
        }

        debug!(flushed, failed = failures.len(), "buffer_pool.flush_all");
        failures
    }

    /// Removes a page from the pool and releases its page id.
    ///
    /// Returns `Ok(true)` if the page is gone afterwards, including when it was
    /// never resident, and `Ok(false)` if it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut free_list = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };
        let frame = self.frame(frame_id, page_id);
        if frame.is_pinned() {
            return Ok(false);
        }

        if frame.is_dirty() {
            self.write_frame(frame, page_id)?;
        }
        // Nothing in the pool has changed yet if the store refuses
        self.disk_scheduler.disk().deallocate_page(page_id)?;

        self.page_table.remove(&page_id);
        if let Err(e) = self.replacer.remove(frame_id) {
            panic!("replacer out of sync for {}: {}", frame_id, e);
        }
        frame.reset();
        free_list.push_back(frame_id);

        debug!(
            page_id = page_id.as_u32(),
            frame_id = frame_id.as_u32(),
            "buffer_pool.delete"
        );
        Ok(true)
    }

    /// Fetches a page for read access; the guard unpins on drop.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard<'_>>> {
        Ok(self
            .fetch_frame(page_id)?
            .map(|frame_id| ReadPageGuard::new(self, page_id, &self.frames[frame_id.as_usize()])))
    }

    /// Fetches a page for write access; the guard unpins on drop and reports
    /// the page dirty if it was mutated.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<Option<WritePageGuard<'_>>> {
        Ok(self
            .fetch_frame(page_id)?
            .map(|frame_id| WritePageGuard::new(self, page_id, &self.frames[frame_id.as_usize()])))
    }

    /// Allocates a fresh page and returns a write guard over it.
    pub fn new_page_guarded(&self) -> Result<Option<WritePageGuard<'_>>> {
        Ok(self.new_frame()?.map(|(page_id, frame_id)| {
            WritePageGuard::new(self, page_id, &self.frames[frame_id.as_usize()])
        }))
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _latch = self.latch.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the dirty flag for a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let _latch = self.latch.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.frames[frame_id.as_usize()].is_dirty())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.latch.lock().len()
    }

    /// Returns the number of pages currently held in frames.
    pub fn resident_page_count(&self) -> usize {
        let _latch = self.latch.lock();
        self.page_table.len()
    }

    /// Returns the number of resident pages that could be evicted right now.
    pub fn evictable_count(&self) -> usize {
        let _latch = self.latch.lock();
        self.replacer.size()
    }

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Pins `page_id` into a frame, loading it from disk on a miss.
    fn fetch_frame(&self, page_id: PageId) -> Result<Option<FrameId>> {
        if !page_id.is_valid() {
            return Err(FerruleError::InvalidPageId(page_id));
        }

        let mut free_list = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.frame(frame_id, page_id).pin();
            self.record_pin(frame_id);
            BufferPoolStats::bump(&self.stats.cache_hits);
            trace!(page_id = page_id.as_u32(), frame_id = frame_id.as_u32(), "buffer_pool.hit");
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.acquire_frame(&mut free_list)? else {
            debug!(page_id = page_id.as_u32(), "buffer_pool.no_frame");
            return Ok(None);
        };
        BufferPoolStats::bump(&self.stats.cache_misses);

        let frame = &self.frames[frame_id.as_usize()];
        let read = {
            let mut data = frame.write_data();
            self.disk_scheduler.schedule_read_sync(page_id, &mut data[..])
        };
        if let Err(e) = read {
            frame.reset();
            free_list.push_back(frame_id);
            return Err(e);
        }
        BufferPoolStats::bump(&self.stats.pages_read);

        frame.install(page_id);
        self.page_table.insert(page_id, frame_id);
        self.record_pin(frame_id);
        trace!(page_id = page_id.as_u32(), frame_id = frame_id.as_u32(), "buffer_pool.miss");
        Ok(Some(frame_id))
    }

    /// Allocates a page id and pins it into a zeroed frame.
    fn new_frame(&self) -> Result<Option<(PageId, FrameId)>> {
        let mut free_list = self.latch.lock();

        let Some(frame_id) = self.acquire_frame(&mut free_list)? else {
            debug!("buffer_pool.no_frame");
            return Ok(None);
        };

        let page_id = match self.disk_scheduler.disk().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                free_list.push_back(frame_id);
                return Err(e);
            }
        };

        self.frames[frame_id.as_usize()].install(page_id);
        self.page_table.insert(page_id, frame_id);
        self.record_pin(frame_id);
        debug!(
            page_id = page_id.as_u32(),
            frame_id = frame_id.as_u32(),
            "buffer_pool.new_page"
        );
        Ok(Some((page_id, frame_id)))
    }

    /// Gets a reset frame, either from the free list or by evicting a page.
    /// Returns None if every frame is pinned.
    fn acquire_frame(&self, free_list: &mut VecDeque<FrameId>) -> Result<Option<FrameId>> {
        if let Some(frame_id) = free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.evict() else {
            return Ok(None);
        };

        let frame = &self.frames[frame_id.as_usize()];
        let victim = frame.page_id();
        assert!(
            !frame.is_pinned(),
            "replacer chose pinned {} holding {}",
            frame_id,
            victim
        );

        if frame.is_dirty() {
            if let Err(e) = self.write_frame(frame, victim) {
                // The page stays resident. Evicting dropped its access history,
                // so it comes back as a single fresh access at the newest end.
                self.record_pin(frame_id);
                self.set_evictable(frame_id, true);
                return Err(e);
            }
        }

        self.page_table.remove(&victim);
        frame.reset();
        BufferPoolStats::bump(&self.stats.evictions);
        debug!(
            page_id = victim.as_u32(),
            frame_id = frame_id.as_u32(),
            "buffer_pool.evict"
        );
        Ok(Some(frame_id))
    }

    /// Writes a page the caller holds a pin on, without the pool latch.
    fn write_pinned_frame(&self, frame: &FrameHeader, page_id: PageId) -> Result<()> {
        let data = frame.read_data();
        // Later writes need the data lock first and report dirty on unpin
        frame.set_dirty(false);
        if let Err(e) = self.disk_scheduler.schedule_write_sync(page_id, &data[..]) {
            frame.set_dirty(true);
            return Err(e);
        }
        drop(data);

        BufferPoolStats::bump(&self.stats.pages_written);
        trace!(page_id = page_id.as_u32(), "buffer_pool.write");
        Ok(())
    }

    /// Writes an unpinned frame's bytes to disk and clears its dirty flag.
    /// Only called under the pool latch; no guard can hold an unpinned frame.
    fn write_frame(&self, frame: &FrameHeader, page_id: PageId) -> Result<()> {
        {
            let data = frame.read_data();
            self.disk_scheduler.schedule_write_sync(page_id, &data[..])?;
        }
        frame.set_dirty(false);
        BufferPoolStats::bump(&self.stats.pages_written);
        trace!(page_id = page_id.as_u32(), "buffer_pool.write");
        Ok(())
    }

    /// Looks up a frame the page table says holds `page_id`.
    fn frame(&self, frame_id: FrameId, page_id: PageId) -> &FrameHeader {
        let frame = &self.frames[frame_id.as_usize()];
        assert_eq!(
            frame.page_id(),
            page_id,
            "page table maps {} to {} which holds another page",
            page_id,
            frame_id
        );
        frame
    }

    /// Records an access and shields the frame from eviction.
    fn record_pin(&self, frame_id: FrameId) {
        if let Err(e) = self.replacer.record_access(frame_id) {
            panic!("replacer rejected pool frame {}: {}", frame_id, e);
        }
        self.set_evictable(frame_id, false);
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        if let Err(e) = self.replacer.set_evictable(frame_id, evictable) {
            panic!("replacer rejected pool frame {}: {}", frame_id, e);
        }
    }
}
