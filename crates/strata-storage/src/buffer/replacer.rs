//! LRU-K replacement policy.
//!
//! LRU-K ranks eviction candidates by their backward K-distance: the age of
//! the K-th most recent access. A frame with fewer than K recorded accesses
//! has infinite distance and is always preferred as a victim over one with a
//! full history; ties inside either group go to the frame whose oldest
//! retained access is earliest.
//!
//! Compared to plain LRU this resists scan pollution: a burst of single
//! accesses cannot displace pages with an established re-reference history.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::warn;

use super::frame::FrameId;

/// How a page is being touched; reserved for access-aware policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Shared lookup.
    Read,
    /// Exclusive access that may mutate the page.
    Write,
}

/// Victim ordering key: greatest distance first, then earliest first access.
///
/// Distance is encoded as a flag - `u64::MAX` while the history is shorter
/// than K, `0` once it is full - so `Reverse` sorts infinite-distance frames
/// ahead and the timestamp breaks ties. With the history bounded at K
/// entries, the oldest retained timestamp of a full history *is* the K-th
/// most recent access.
type VictimKey = (Reverse<u64>, u64, FrameId);

const INFINITE_DISTANCE: u64 = u64::MAX;

#[derive(Default)]
struct LruKNode {
    /// Oldest to newest, at most K entries.
    history: VecDeque<u64>,
    evictable: bool,
}

impl LruKNode {
    fn distance(&self, k: usize) -> u64 {
        if self.history.len() < k {
            INFINITE_DISTANCE
        } else {
            0
        }
    }

    fn first_access(&self) -> u64 {
        *self
            .history
            .front()
            .expect("tracked frame has an empty access history")
    }

    fn key(&self, k: usize, frame_id: FrameId) -> VictimKey {
        (Reverse(self.distance(k)), self.first_access(), frame_id)
    }
}

struct ReplacerState {
    nodes: HashMap<FrameId, LruKNode>,
    /// Evictable frames only, ordered best victim first.
    victims: BTreeSet<VictimKey>,
    /// Logical clock; values only need to preserve order.
    clock: u64,
}

/// Tracks per-frame access history and selects eviction victims.
///
/// The replacer holds its own mutex and never performs I/O, so it is safe
/// to call into while the buffer pool lock is held (the replacer never
/// calls back out).
pub struct LruKReplacer {
    k: usize,
    capacity: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a replacer for frame ids in `[0, capacity)` with history depth `k`.
    pub fn new(capacity: usize, k: usize) -> Self {
        assert!(k >= 1, "replacer k must be >= 1");
        Self {
            k,
            capacity,
            state: Mutex::new(ReplacerState {
                nodes: HashMap::with_capacity(capacity),
                victims: BTreeSet::new(),
                clock: 0,
            }),
        }
    }

    /// Records an access to `frame_id`, tracking it if new.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is outside `[0, capacity)`; an out-of-range id
    /// is a programming error in the caller.
    pub fn record_access(&self, frame_id: FrameId, _access: AccessType) {
        assert!(
            frame_id.index() < self.capacity,
            "frame id {} out of range for replacer of {} frames",
            frame_id.index(),
            self.capacity,
        );

        let mut state = self.state.lock();
        let timestamp = state.clock;
        state.clock += 1;

        let ReplacerState { nodes, victims, .. } = &mut *state;
        let node = nodes.entry(frame_id).or_default();
        if node.evictable && !node.history.is_empty() {
            victims.remove(&node.key(self.k, frame_id));
        }
        node.history.push_back(timestamp);
        if node.history.len() > self.k {
            node.history.pop_front();
        }
        if node.evictable {
            victims.insert(node.key(self.k, frame_id));
        }
    }

    /// Marks `frame_id` as evictable or not. Idempotent; no-op when the
    /// frame is untracked.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut state = self.state.lock();
        let ReplacerState { nodes, victims, .. } = &mut *state;
        let Some(node) = nodes.get_mut(&frame_id) else {
            return;
        };
        if node.evictable == evictable {
            return;
        }
        node.evictable = evictable;
        if evictable {
            victims.insert(node.key(self.k, frame_id));
        } else {
            victims.remove(&node.key(self.k, frame_id));
        }
    }

    /// Removes and returns the best victim, forgetting its history.
    ///
    /// Returns `None` when no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let ReplacerState { nodes, victims, .. } = &mut *state;
        let (_, _, frame_id) = victims.pop_first()?;
        nodes.remove(&frame_id);
        Some(frame_id)
    }

    /// Forgets `frame_id` entirely.
    ///
    /// Only evictable frames may be removed; the pool guarantees pin = 0
    /// before calling. A non-evictable record is left untouched.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let ReplacerState { nodes, victims, .. } = &mut *state;
        let Some(node) = nodes.get(&frame_id) else {
            return;
        };
        if !node.evictable {
            warn!(
                frame_id = frame_id.index(),
                "ignoring removal of non-evictable frame"
            );
            return;
        }
        victims.remove(&node.key(self.k, frame_id));
        nodes.remove(&frame_id);
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().victims.len()
    }
}

impl std::fmt::Debug for LruKReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LruKReplacer")
            .field("k", &self.k)
            .field("capacity", &self.capacity)
            .field("tracked", &state.nodes.len())
            .field("evictable", &state.victims.len())
            .finish()
    }
}
