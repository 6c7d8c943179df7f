//! Buffer pool errors.

use strata_common::PageId;
use thiserror::Error;

use crate::disk::IoError;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
///
/// Routine refusals - unpinning a non-resident page, deleting a pinned one -
/// are not errors; those surface as `false` returns. Internal invariant
/// violations panic instead of appearing here.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum BufferError {
    /// Every frame is pinned; nothing can be evicted to make room.
    #[error("buffer pool exhausted: all frames are pinned")]
    PoolExhausted,

    /// Operation named the invalid page sentinel.
    #[error("invalid page id: {page_id:?}")]
    InvalidPageId { page_id: PageId },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// I/O error from the disk layer, propagated unchanged.
    #[error(transparent)]
    Io(#[from] IoError),
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if the operation may succeed once pins are released.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted)
    }
}
