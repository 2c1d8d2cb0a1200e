//! Ferrule - a page buffer pool for disk-oriented storage engines
//!
//! This crate keeps a fixed number of page-sized frames in memory and moves
//! pages between them and a page store on demand.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Page stores behind the `DiskIo` trait
//!   - `DiskManager`: Reads and writes pages to/from a single database file
//!   - `MemoryDisk`: In-memory page store
//!   - `DiskScheduler`: Background worker that serves page I/O requests
//!
//! - **Containers** (`container`): In-memory indexes
//!   - `ExtendibleHashTable`: Thread-safe extendible hash table used as the page table
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in memory
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: Per-frame metadata and data storage
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards for thread-safe page access
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ferrule::buffer::BufferPoolManager;
//! use ferrule::storage::disk::DiskManager;
//!
//! // Create a disk manager for a database file
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//!
//! // Create a buffer pool with 100 frames and LRU-2 replacement
//! let bpm = BufferPoolManager::new(100, 2, disk_manager);
//!
//! // Allocate a new page and write to it
//! let page_id = {
//!     let mut guard = bpm.new_page_guarded().unwrap().unwrap();
//!     guard.data_mut()[..5].copy_from_slice(b"hello");
//!     guard.page_id()
//! };
//!
//! // Flush changes to disk
//! bpm.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{BufferPoolConfig, FerruleError, FrameId, PageId, Result};
