//! Buffer pool manager.
//!
//! The pool owns a fixed array of frames and mediates every page access:
//! lookups hit the page table, misses claim a free frame or evict a victim
//! chosen by the LRU-K replacer (writing it back first when dirty), and pin
//! counts keep resident pages from being displaced while in use.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_common::PageId;
use tracing::{debug, trace};

use super::config::BufferPoolConfig;
use super::error::{BufferError, BufferResult};
use super::frame::{BufferFrame, FrameId};
use super::guard::{PageGuard, ReadPageGuard, WritePageGuard};
use super::replacer::{AccessType, LruKReplacer};
use super::BufferPoolStats;
use crate::disk::{DiskManager, LogManager};

/// Metadata guarded by the pool mutex.
///
/// Every frame id is in exactly one place at any time: the free list, the
/// page table (as a value), or in the hands of an ongoing fetch that just
/// evicted it.
struct PoolState {
    /// Maps resident pages to the frames hosting them.
    page_table: HashMap<PageId, FrameId>,
    /// Frames hosting no page.
    free_list: VecDeque<FrameId>,
}

/// The buffer pool manager.
///
/// One non-recursive mutex guards the page table and free list; frame
/// metadata is atomic and the replacer has its own lock, acquired only while
/// the pool lock is held (the replacer never calls back out). Per-frame
/// latches belong to the guard layer and are taken after the pool lock is
/// released.
pub struct BufferPool {
    config: BufferPoolConfig,
    frames: Vec<Arc<BufferFrame>>,
    state: Mutex<PoolState>,
    replacer: LruKReplacer,
    disk: Arc<dyn DiskManager>,
    log_manager: Option<Arc<dyn LogManager>>,
    next_page_id: AtomicU64,
    fetch_count: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    eviction_count: AtomicU64,
    flush_count: AtomicU64,
}

impl BufferPool {
    /// Creates a buffer pool over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk: Arc<dyn DiskManager>) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;

        let frames: Vec<Arc<BufferFrame>> = (0..config.pool_size)
            .map(|i| Arc::new(BufferFrame::new(FrameId::new(i), config.page_size)))
            .collect();
        let free_list: VecDeque<FrameId> = (0..config.pool_size).map(FrameId::new).collect();

        debug!(
            pool_size = config.pool_size,
            page_size = config.page_size,
            replacer_k = config.replacer_k,
            "buffer pool created"
        );

        Ok(Self {
            replacer: LruKReplacer::new(config.pool_size, config.replacer_k),
            config,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
            }),
            disk,
            log_manager: None,
            next_page_id: AtomicU64::new(0),
            fetch_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        })
    }

    /// Attaches a write-ahead log whose `flush` runs before any dirty
    /// write-back.
    pub fn with_log_manager(mut self, log_manager: Arc<dyn LogManager>) -> Self {
        self.log_manager = Some(log_manager);
        self
    }

    /// Allocates a fresh page and returns it pinned (pin count 1).
    ///
    /// The caller owns the pin and must release it with
    /// [`BufferPool::unpin_page`]; prefer [`BufferPool::new_page_guarded`].
    ///
    /// Returns [`BufferError::PoolExhausted`] when every frame is pinned.
    pub fn new_page(&self) -> BufferResult<(PageId, Arc<BufferFrame>)> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.index()];

        let page_id = self.allocate_page();
        state.page_table.insert(page_id, frame_id);
        frame.set_page_id(page_id);
        frame.pin();
        self.replacer.record_access(frame_id, AccessType::Write);
        self.replacer.set_evictable(frame_id, false);

        trace!(page_id = %page_id, frame_id = frame_id.index(), "new page");
        Ok((page_id, Arc::clone(frame)))
    }

    /// Returns the frame hosting `page_id`, pinned, loading it from disk on
    /// a miss.
    ///
    /// The caller owns the pin and must release it with
    /// [`BufferPool::unpin_page`]; prefer the guard factories.
    ///
    /// Returns [`BufferError::PoolExhausted`] when the page is not resident
    /// and every frame is pinned, and [`BufferError::InvalidPageId`] for the
    /// invalid sentinel. A disk read error propagates with the mapping and
    /// pin retained, leaving the pool consistent.
    pub fn fetch_page(&self, page_id: PageId, access: AccessType) -> BufferResult<Arc<BufferFrame>> {
        if !page_id.is_valid() {
            return Err(BufferError::InvalidPageId { page_id });
        }
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            self.replacer.record_access(frame_id, access);
            self.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(frame));
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.index()];

        state.page_table.insert(page_id, frame_id);
        frame.set_page_id(page_id);
        frame.pin();
        self.replacer.record_access(frame_id, access);
        self.replacer.set_evictable(frame_id, false);

        trace!(page_id = %page_id, frame_id = frame_id.index(), "fetch miss, reading from disk");
        let mut data = frame.write_data();
        self.disk.read_page(page_id, &mut data)?;
        drop(data);

        Ok(Arc::clone(frame))
    }

    /// Drops one pin on `page_id`, folding `is_dirty` into the frame's
    /// dirty flag.
    ///
    /// Returns false when the page is not resident or its pin count is
    /// already zero. When the last pin goes, the frame becomes evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes `page_id` back to disk, dirty or not, and clears its dirty
    /// flag.
    ///
    /// Returns `Ok(false)` when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<bool> {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.flush_frame_locked(&self.frames[frame_id.index()])?;
        Ok(true)
    }

    /// Writes every resident page back to disk.
    pub fn flush_all_pages(&self) -> BufferResult<()> {
        let state = self.state.lock();
        for &frame_id in state.page_table.values() {
            self.flush_frame_locked(&self.frames[frame_id.index()])?;
        }
        Ok(())
    }

    /// Evicts `page_id` from the pool and recycles its frame.
    ///
    /// Returns false when the page is pinned and true otherwise, including
    /// when the page was not resident to begin with. The page's bytes are
    /// discarded without write-back; deletion is the one path where dirty
    /// data is dropped on purpose.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.is_pinned() {
            return false;
        }

        self.replacer.remove(frame_id);
        state.page_table.remove(&page_id);
        state.free_list.push_back(frame_id);
        frame.reset();
        self.deallocate_page(page_id);

        trace!(page_id = %page_id, frame_id = frame_id.index(), "page deleted");
        true
    }

    /// Fetches `page_id` wrapped in a basic (unlatched) guard.
    pub fn fetch_page_basic(self: &Arc<Self>, page_id: PageId) -> BufferResult<PageGuard> {
        let frame = self.fetch_page(page_id, AccessType::Read)?;
        Ok(PageGuard::new(Arc::clone(self), frame))
    }

    /// Fetches `page_id` and takes its reader latch.
    pub fn fetch_page_read(self: &Arc<Self>, page_id: PageId) -> BufferResult<ReadPageGuard> {
        // The latch is acquired inside the guard constructor, after the pin
        // is in place and the pool lock has been dropped.
        Ok(ReadPageGuard::new(self.fetch_page_basic(page_id)?))
    }

    /// Fetches `page_id` and takes its writer latch.
    pub fn fetch_page_write(self: &Arc<Self>, page_id: PageId) -> BufferResult<WritePageGuard> {
        let frame = self.fetch_page(page_id, AccessType::Write)?;
        Ok(WritePageGuard::new(PageGuard::new(Arc::clone(self), frame)))
    }

    /// Allocates a fresh page wrapped in a basic guard.
    pub fn new_page_guarded(self: &Arc<Self>) -> BufferResult<PageGuard> {
        let (_, frame) = self.new_page()?;
        Ok(PageGuard::new(Arc::clone(self), frame))
    }

    /// Returns true if `page_id` is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Returns the pin count of `page_id`, or `None` when not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.index()].pin_count())
    }

    /// Returns the number of frames.
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns a snapshot of the pool's counters.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;
        for frame in &self.frames {
            if frame.is_pinned() {
                pinned_frames += 1;
            }
            if frame.is_dirty() {
                dirty_frames += 1;
            }
        }

        BufferPoolStats {
            fetches: self.fetch_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            evictions: self.eviction_count.load(Ordering::Relaxed),
            flushes: self.flush_count.load(Ordering::Relaxed),
            pinned_frames,
            dirty_frames,
        }
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Claims a frame for a new residency: the free list if possible,
    /// otherwise the replacer's victim, written back first when dirty.
    ///
    /// The returned frame is reset and belongs to the caller until it is
    /// installed in the page table.
    ///
    /// # Panics
    ///
    /// Panics if the replacer reports evictable frames but refuses to yield
    /// one; that cannot happen while the pool lock is held.
    fn acquire_frame(&self, state: &mut PoolState) -> BufferResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }
        if self.replacer.size() == 0 {
            return Err(BufferError::PoolExhausted);
        }

        // All replacer updates happen under the pool lock, so the size
        // check above cannot go stale.
        let frame_id = self
            .replacer
            .evict()
            .expect("evictable frames disappeared under the pool lock");
        let frame = &self.frames[frame_id.index()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            if let Err(e) = self.flush_frame_locked(frame) {
                // Put the victim back so the pool stays consistent; its
                // access history restarts but the page is not lost.
                self.replacer.record_access(frame_id, AccessType::Write);
                self.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
        }

        state.page_table.remove(&old_page_id);
        frame.reset();
        self.eviction_count.fetch_add(1, Ordering::Relaxed);

        trace!(page_id = %old_page_id, frame_id = frame_id.index(), "page evicted");
        Ok(frame_id)
    }

    /// Unconditional write-back of one frame; requires the pool lock.
    ///
    /// Reachable both from client flushes and from eviction, which is why it
    /// takes no lock of its own.
    fn flush_frame_locked(&self, frame: &BufferFrame) -> BufferResult<()> {
        if frame.is_dirty() {
            if let Some(log_manager) = &self.log_manager {
                log_manager.flush()?;
            }
        }

        let data = frame.read_data();
        self.disk.write_page(frame.page_id(), &data)?;
        drop(data);

        frame.set_dirty(false);
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Hands out the next page id; ids are monotonic and never reused.
    fn allocate_page(&self) -> PageId {
        PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Hook for the id allocator when a page is deleted. Ids are not
    /// recycled, so this does nothing yet.
    fn deallocate_page(&self, _page_id: PageId) {}
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("pool_size", &self.config.pool_size)
            .field("page_size", &self.config.page_size)
            .field("resident_pages", &self.state.lock().page_table.len())
            .field("stats", &self.stats())
            .finish()
    }
}
