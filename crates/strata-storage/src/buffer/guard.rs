//! Scoped page guards.
//!
//! Guards are the only way clients hold a page: each one owns exactly one
//! pin (and, for the latched variants, one frame latch) and gives both back
//! when it goes out of scope. Ownership makes the pin discipline a
//! type-system invariant - guards are move-only, moving one transfers its
//! pin, and a moved-from guard cannot be touched again.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use strata_common::PageId;

use super::frame::{BufferFrame, FrameReadLatch, FrameWriteLatch};
use super::pool::BufferPool;

/// Basic page guard: holds a pin, no latch.
///
/// Reads and writes through this guard take the frame latch only for the
/// duration of the access. Writing marks the guard dirty; the flag is folded
/// into the frame when the pin is released.
pub struct PageGuard {
    pool: Arc<BufferPool>,
    frame: Option<Arc<BufferFrame>>,
    dirty: bool,
}

impl PageGuard {
    pub(crate) fn new(pool: Arc<BufferPool>, frame: Arc<BufferFrame>) -> Self {
        Self {
            pool,
            frame: Some(frame),
            dirty: false,
        }
    }

    fn frame(&self) -> &Arc<BufferFrame> {
        self.frame.as_ref().expect("page guard already released")
    }

    /// Returns the id of the guarded page.
    ///
    /// # Panics
    ///
    /// Panics if the guard was already released.
    pub fn page_id(&self) -> PageId {
        self.frame().page_id()
    }

    /// Read access to the page bytes; takes the frame latch shared for the
    /// duration of the returned borrow.
    pub fn data(&self) -> impl Deref<Target = [u8]> + '_ {
        PageDataRef {
            guard: self.frame().read_data(),
        }
    }

    /// Write access to the page bytes; takes the frame latch exclusive for
    /// the duration of the returned borrow and marks the guard dirty.
    pub fn data_mut(&mut self) -> impl DerefMut<Target = [u8]> + '_ {
        self.dirty = true;
        PageDataMut {
            guard: self.frame().write_data(),
        }
    }

    /// Releases the pin now instead of at scope exit. Idempotent.
    pub fn release(&mut self) {
        if let Some(frame) = self.frame.take() {
            let _unpinned = self.pool.unpin_page(frame.page_id(), self.dirty);
            debug_assert!(_unpinned, "guard unpinned a page the pool no longer hosts");
            self.dirty = false;
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.frame.as_ref().map(|f| f.page_id()))
            .field("dirty", &self.dirty)
            .finish()
    }
}

struct PageDataRef<'a> {
    guard: RwLockReadGuard<'a, Box<[u8]>>,
}

impl Deref for PageDataRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

struct PageDataMut<'a> {
    guard: RwLockWriteGuard<'a, Box<[u8]>>,
}

impl Deref for PageDataMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for PageDataMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

/// Read guard: a pin plus the frame's reader latch, both held for the
/// guard's lifetime.
pub struct ReadPageGuard {
    guard: PageGuard,
    latch: Option<FrameReadLatch>,
}

impl ReadPageGuard {
    pub(crate) fn new(guard: PageGuard) -> Self {
        // The latch is taken after the pin is recorded and after the pool
        // lock is released; see the fetch path in the pool.
        let latch = guard.frame().latch_read();
        Self {
            guard,
            latch: Some(latch),
        }
    }

    /// Returns the id of the guarded page.
    ///
    /// # Panics
    ///
    /// Panics if the guard was already released.
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        let latch = self.latch.as_ref().expect("read guard already released");
        &latch[..]
    }

    /// Releases the latch and the pin now instead of at scope exit.
    /// Idempotent. The latch goes first so no reader is ever observed
    /// pinless while still holding the frame locked.
    pub fn release(&mut self) {
        self.latch = None;
        self.guard.release();
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ReadPageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadPageGuard")
            .field("guard", &self.guard)
            .finish()
    }
}

/// Write guard: a pin plus the frame's writer latch, both held for the
/// guard's lifetime.
pub struct WritePageGuard {
    guard: PageGuard,
    latch: Option<FrameWriteLatch>,
}

impl WritePageGuard {
    pub(crate) fn new(guard: PageGuard) -> Self {
        let latch = guard.frame().latch_write();
        Self {
            guard,
            latch: Some(latch),
        }
    }

    /// Returns the id of the guarded page.
    ///
    /// # Panics
    ///
    /// Panics if the guard was already released.
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        let latch = self.latch.as_ref().expect("write guard already released");
        &latch[..]
    }

    /// Returns the page bytes mutably and marks the guard dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.guard.dirty = true;
        let latch = self.latch.as_mut().expect("write guard already released");
        &mut latch[..]
    }

    /// Marks the page dirty without touching the bytes.
    pub fn mark_dirty(&mut self) {
        self.guard.dirty = true;
    }

    /// Releases the latch and the pin now instead of at scope exit.
    /// Idempotent.
    pub fn release(&mut self) {
        self.latch = None;
        self.guard.release();
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for WritePageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePageGuard")
            .field("guard", &self.guard)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::config::BufferPoolConfig;
    use super::super::pool::BufferPool;
    use super::super::replacer::AccessType;
    use crate::disk::MemoryDiskManager;

    fn test_pool(pool_size: usize) -> Arc<BufferPool> {
        let disk = Arc::new(MemoryDiskManager::new(4096));
        let config = BufferPoolConfig::new(pool_size).with_replacer_k(2);
        Arc::new(BufferPool::new(config, disk).unwrap())
    }

    #[test]
    fn test_basic_guard_releases_pin_on_drop() {
        let pool = test_pool(5);
        let guard = pool.new_page_guarded().unwrap();
        let page_id = guard.page_id();
        assert_eq!(pool.pin_count(page_id), Some(1));
        // A fresh page reads back zeroed through the guard.
        assert!(guard.data().iter().all(|&b| b == 0));

        drop(guard);
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_repeated_release_is_idempotent() {
        let pool = test_pool(5);
        let mut guard = pool.new_page_guarded().unwrap();
        let page_id = guard.page_id();

        guard.release();
        assert_eq!(pool.pin_count(page_id), Some(0));
        guard.release();
        assert_eq!(pool.pin_count(page_id), Some(0));
        drop(guard);
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_move_transfers_exactly_one_pin() {
        let pool = test_pool(5);
        let guard = pool.new_page_guarded().unwrap();
        let page_id = guard.page_id();
        assert_eq!(pool.pin_count(page_id), Some(1));

        let moved = guard;
        assert_eq!(pool.pin_count(page_id), Some(1));
        let moved_again = moved;
        assert_eq!(pool.pin_count(page_id), Some(1));

        drop(moved_again);
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_basic_guard_write_marks_dirty_at_release() {
        let pool = test_pool(5);
        let page_id = {
            let mut guard = pool.new_page_guarded().unwrap();
            guard.data_mut()[0] = 0x5a;
            guard.page_id()
            // New pages start clean; the guard carries the dirty bit until
            // the pin is released here.
        };
        let frame = pool.fetch_page(page_id, AccessType::Read).unwrap();
        assert!(frame.is_dirty());
        pool.unpin_page(page_id, false);
    }

    #[test]
    fn test_read_guard_data_matches_written_bytes() {
        let pool = test_pool(5);
        let page_id = {
            let mut guard = pool.new_page_guarded().unwrap();
            guard.data_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
            guard.page_id()
        };

        let read_guard = pool.fetch_page_read(page_id).unwrap();
        assert_eq!(&read_guard.data()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_write_guard_excludes_readers() {
        let pool = test_pool(5);
        let page_id = pool.new_page_guarded().unwrap().page_id();

        let mut write_guard = pool.fetch_page_write(page_id).unwrap();
        write_guard.data_mut()[0] = 9;

        // A second latched guard must wait; the pin is still visible.
        assert_eq!(pool.pin_count(page_id), Some(1));
        drop(write_guard);

        let read_guard = pool.fetch_page_read(page_id).unwrap();
        assert_eq!(read_guard.data()[0], 9);
    }

    #[test]
    fn test_two_read_guards_share_the_latch() {
        let pool = test_pool(5);
        let page_id = pool.new_page_guarded().unwrap().page_id();

        let a = pool.fetch_page_read(page_id).unwrap();
        let b = pool.fetch_page_read(page_id).unwrap();
        assert_eq!(pool.pin_count(page_id), Some(2));
        assert_eq!(a.data()[0], b.data()[0]);

        drop(a);
        drop(b);
        assert_eq!(pool.pin_count(page_id), Some(0));
    }
}
