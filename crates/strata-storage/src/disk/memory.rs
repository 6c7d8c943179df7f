//! In-memory disk manager for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use strata_common::PageId;

use super::error::{IoError, IoResult};
use super::manager::DiskManager;

/// Unbounded in-memory page store.
///
/// Behaves like a data file of infinite size: unwritten pages read back as
/// zeroes. Tests use it to observe write-back without touching the
/// filesystem, via [`MemoryDiskManager::page_data`] and
/// [`MemoryDiskManager::write_count`].
pub struct MemoryDiskManager {
    pages: Mutex<HashMap<PageId, Box<[u8]>>>,
    page_size: usize,
    write_count: AtomicU64,
    shut_down: AtomicBool,
}

impl MemoryDiskManager {
    /// Creates an empty store for pages of `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            page_size,
            write_count: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Returns a copy of the last bytes written for `page_id`, if any.
    pub fn page_data(&self, page_id: PageId) -> Option<Vec<u8>> {
        self.pages.lock().get(&page_id).map(|p| p.to_vec())
    }

    /// Total number of `write_page` calls accepted so far.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Acquire)
    }

    fn check_open(&self) -> IoResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(IoError::ShutDown)
        } else {
            Ok(())
        }
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> IoResult<()> {
        self.check_open()?;
        debug_assert_eq!(buf.len(), self.page_size);

        match self.pages.lock().get(&page_id) {
            Some(page) => buf.copy_from_slice(page),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> IoResult<()> {
        self.check_open()?;
        if buf.len() != self.page_size {
            return Err(IoError::short_write(self.page_size, buf.len()));
        }

        self.pages.lock().insert(page_id, buf.into());
        self.write_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for MemoryDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDiskManager")
            .field("pages", &self.pages.lock().len())
            .field("page_size", &self.page_size)
            .field("writes", &self.write_count())
            .finish()
    }
}
