use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::common::PageId;

use super::{BufferPoolManager, FrameHeader, PageBuf};

/// Holds one pin on a page and gives it back to the pool when dropped.
///
/// Guards declare their data lock before this field, so the lock is always
/// released before the pool latch is taken to unpin.
struct PagePin<'a> {
    bpm: &'a BufferPoolManager,
    /// The page ID being guarded
    page_id: PageId,
    /// Whether the page was marked dirty
    is_dirty: bool,
}

impl Drop for PagePin<'_> {
    fn drop(&mut self) {
        if !self.bpm.unpin_page(self.page_id, self.is_dirty) {
            warn!(page_id = self.page_id.as_u32(), "page_guard.unpin_failed");
        }
    }
}

/// RAII guard for read-only access to a page.
/// Automatically unpins the page when dropped.
pub struct ReadPageGuard<'a> {
    data: RwLockReadGuard<'a, PageBuf>,
    pin: PagePin<'a>,
}

impl<'a> ReadPageGuard<'a> {
    /// Wraps a page the caller has already pinned once.
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame: &'a FrameHeader) -> Self {
        Self {
            data: frame.read_data(),
            pin: PagePin {
                bpm,
                page_id,
                is_dirty: false,
            },
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// RAII guard for read-write access to a page.
/// Unpins the page when dropped, reporting it dirty if `data_mut` was called.
pub struct WritePageGuard<'a> {
    data: RwLockWriteGuard<'a, PageBuf>,
    pin: PagePin<'a>,
}

impl<'a> WritePageGuard<'a> {
    /// Wraps a page the caller has already pinned once.
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame: &'a FrameHeader) -> Self {
        Self {
            data: frame.write_data(),
            pin: PagePin {
                bpm,
                page_id,
                is_dirty: false,
            },
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Returns a mutable reference to the page data.
    /// Marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pin.is_dirty = true;
        &mut self.data[..]
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}
