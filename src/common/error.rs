use thiserror::Error;

use super::types::{FrameId, PageId};

/// Errors raised by the buffer pool and its collaborators
#[derive(Error, Debug)]
pub enum FerruleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Invalid frame ID: {0}")]
    InvalidFrameId(FrameId),

    #[error("Frame {0} is not evictable and cannot be removed")]
    FrameNotEvictable(FrameId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FerruleError>;
