//! Buffer frame - a slot in the buffer pool that hosts a page.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use strata_common::PageId;

/// Frame identifier - index into the buffer pool's frame array.
///
/// Frame ids are stable for the lifetime of the pool; the slot they name is
/// reused across many page residencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(usize);

impl FrameId {
    /// Creates a new frame id.
    #[inline]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the raw index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for FrameId {
    fn from(id: usize) -> Self {
        Self::new(id)
    }
}

impl From<FrameId> for usize {
    fn from(id: FrameId) -> Self {
        id.0
    }
}

/// Owned reader latch over a frame's bytes, held by read guards.
pub(crate) type FrameReadLatch = ArcRwLockReadGuard<RawRwLock, Box<[u8]>>;

/// Owned writer latch over a frame's bytes, held by write guards.
pub(crate) type FrameWriteLatch = ArcRwLockWriteGuard<RawRwLock, Box<[u8]>>;

/// A buffer frame holds a single page in memory.
///
/// Metadata (page id, pin count, dirty flag) uses atomics so the pool can
/// read it without taking the frame latch. The page bytes sit behind their
/// own reader/writer lock - the per-frame latch - which the guard layer
/// holds across a guard's lifetime and the pool takes only transiently when
/// copying bytes to or from disk.
pub struct BufferFrame {
    /// Frame id (index in the pool's frame array).
    frame_id: FrameId,
    /// Page bytes, guarded by the per-frame latch.
    data: Arc<RwLock<Box<[u8]>>>,
    /// Page hosted in this frame (`PageId::INVALID` when empty).
    page_id: AtomicU64,
    /// Number of active references preventing eviction.
    pin_count: AtomicU32,
    /// Whether the in-memory bytes differ from the on-disk version.
    dirty: AtomicBool,
}

impl BufferFrame {
    /// Creates an empty frame of `page_size` bytes.
    pub fn new(frame_id: FrameId, page_size: usize) -> Self {
        Self {
            frame_id,
            data: Arc::new(RwLock::new(vec![0u8; page_size].into_boxed_slice())),
            page_id: AtomicU64::new(PageId::INVALID.as_u64()),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Returns the frame id.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page hosted in this frame.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_u64(), Ordering::Release);
    }

    /// Returns true if no page is hosted here.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.page_id().is_valid()
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    #[inline]
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    #[inline]
    pub(crate) fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "unpinned frame with pin_count = 0");
        old - 1
    }

    /// Returns true if the frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if the frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Sets or clears the dirty flag.
    #[inline]
    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Takes the frame latch shared for the duration of the returned guard.
    #[inline]
    pub fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read()
    }

    /// Takes the frame latch exclusive for the duration of the returned guard.
    #[inline]
    pub fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.data.write()
    }

    /// Acquires an owned reader latch, for guards that outlive this borrow.
    #[inline]
    pub(crate) fn latch_read(&self) -> FrameReadLatch {
        self.data.read_arc()
    }

    /// Acquires an owned writer latch, for guards that outlive this borrow.
    #[inline]
    pub(crate) fn latch_write(&self) -> FrameWriteLatch {
        self.data.write_arc()
    }

    /// Returns the frame to its empty state: metadata cleared, bytes zeroed.
    ///
    /// Callers must ensure the frame is unpinned.
    pub(crate) fn reset(&self) {
        debug_assert!(!self.is_pinned(), "reset of a pinned frame");
        self.data.write().fill(0);
        self.page_id
            .store(PageId::INVALID.as_u64(), Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("frame_id", &self.frame_id)
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
