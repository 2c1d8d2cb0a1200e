use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::{FerruleError, PageId, Result, PAGE_SIZE};

use super::DiskIo;

/// In-memory page store.
///
/// Keeps one immutable `Bytes` image per written page, so callers can inspect
/// exactly what the buffer pool last wrote. Writes can be made to fail on
/// demand to exercise error paths.
pub struct MemoryDisk {
    pages: Mutex<HashMap<PageId, Bytes>>,
    next_page_id: AtomicU32,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
    fail_writes: AtomicBool,
    fail_deallocations: AtomicBool,
}

impl MemoryDisk {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            next_page_id: AtomicU32::new(0),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            fail_writes: AtomicBool::new(false),
            fail_deallocations: AtomicBool::new(false),
        }
    }

    /// Returns the last image written for the page.
    pub fn page_contents(&self, page_id: PageId) -> Option<Bytes> {
        self.pages.lock().get(&page_id).cloned()
    }

    /// Makes every subsequent write fail with an I/O error until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent deallocation fail with an I/O error until reset.
    pub fn set_fail_deallocations(&self, fail: bool) {
        self.fail_deallocations.store(fail, Ordering::SeqCst);
    }

    pub fn get_num_pages(&self) -> u32 {
        self.next_page_id.load(Ordering::Relaxed)
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskIo for MemoryDisk {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        match self.pages.lock().get(&page_id) {
            Some(image) => data.copy_from_slice(image),
            None => data.fill(0),
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if !page_id.is_valid() {
            return Err(FerruleError::InvalidPageId(page_id));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure").into());
        }

        self.pages
            .lock()
            .insert(page_id, Bytes::copy_from_slice(data));
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId> {
        Ok(PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if self.fail_deallocations.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected deallocation failure").into());
        }
        self.pages.lock().remove(&page_id);
        Ok(())
    }
}
