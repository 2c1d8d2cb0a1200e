use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Page bytes held by a frame
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

/// One slot of the buffer pool: a page-sized buffer plus the metadata the
/// pool needs to decide whether the slot can be reused.
///
/// Metadata is mutated while the pool latch is held, except that a flusher
/// holding a pin and the data read lock may clear the dirty flag. The atomics
/// let callers read it without taking that latch. The bytes sit behind their
/// own `RwLock` and belong to whoever holds a pin.
pub struct FrameHeader {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// Resident page, or `INVALID_PAGE_ID` while the frame is free
    page_id: AtomicU32,
    /// Number of outstanding pins
    pin_count: AtomicU32,
    /// Whether the bytes differ from the on-disk copy
    is_dirty: AtomicBool,
    data: RwLock<PageBuf>,
}

impl FrameHeader {
    /// Creates a free frame.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU32::new(INVALID_PAGE_ID.as_u32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the resident page ID, `INVALID_PAGE_ID` if free.
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u32(), Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Increments the pin count and returns the new value.
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub(crate) fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Shared access to the page bytes.
    pub fn read_data(&self) -> RwLockReadGuard<'_, PageBuf> {
        self.data.read()
    }

    /// Exclusive access to the page bytes.
    ///
    /// Writing through this guard does not mark the frame dirty; report it
    /// through `unpin_page(page_id, true)`.
    pub fn write_data(&self) -> RwLockWriteGuard<'_, PageBuf> {
        self.data.write()
    }

    /// Installs `page_id` with a pin count of one and clean bytes.
    /// The caller fills the bytes afterwards.
    pub(crate) fn install(&self, page_id: PageId) {
        self.set_page_id(page_id);
        self.pin_count.store(1, Ordering::Release);
        self.set_dirty(false);
    }

    /// Returns the frame to its free state with zeroed bytes.
    pub(crate) fn reset(&self) {
        self.set_page_id(INVALID_PAGE_ID);
        self.pin_count.store(0, Ordering::Release);
        self.set_dirty(false);
        self.data.write().fill(0);
    }
}
