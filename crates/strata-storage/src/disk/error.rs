//! I/O error types for the disk layer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for disk operations.
pub type IoResult<T> = Result<T, IoError>;

/// Errors that can occur during disk I/O.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum IoError {
    /// Standard I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Failed to open the data file.
    #[error("cannot open data file: {}", path.display())]
    Open { path: PathBuf, source: io::Error },

    /// Short read/write (less data than expected).
    #[error("short {operation}: expected {expected} bytes, got {actual}")]
    ShortIo {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The disk manager has been shut down.
    #[error("disk manager is shut down")]
    ShutDown,
}

impl IoError {
    /// Creates an open error with path context.
    pub fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Creates a ShortIo error for writes.
    pub fn short_write(expected: usize, actual: usize) -> Self {
        Self::ShortIo {
            operation: "write",
            expected,
            actual,
        }
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { source }
                if source.kind() == io::ErrorKind::Interrupted
                    || source.kind() == io::ErrorKind::WouldBlock
        )
    }
}
