use crate::common::{PageId, Result};

/// Block-level page storage consumed by the buffer pool.
///
/// Every call moves exactly one `PAGE_SIZE` page. A successful `write_page`
/// is durable. Page ids come from `allocate_page` and increase monotonically;
/// whether `deallocate_page` recycles them is up to the implementation.
pub trait DiskIo: Send + Sync {
    /// Reads a page into `data`. Pages never written read back as zeros.
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()>;

    /// Writes `data` as the contents of the page.
    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()>;

    /// Hands out a fresh page id.
    fn allocate_page(&self) -> Result<PageId>;

    /// Called when the buffer pool deletes a page.
    fn deallocate_page(&self, page_id: PageId) -> Result<()>;
}
