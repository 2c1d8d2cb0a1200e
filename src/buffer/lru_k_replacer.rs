use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::trace;

use crate::common::{FerruleError, FrameId, Result, Timestamp};

/// Tracks access history for a single frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// The last k access timestamps (most recent at back)
    history: VecDeque<Timestamp>,
    /// Whether this frame is currently evictable
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new(k: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(k),
            is_evictable: false,
        }
    }

    /// Records an access and returns the frame's new ordering key.
    fn record_access(&mut self, timestamp: Timestamp, k: usize) -> Timestamp {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
        self.history.front().copied().unwrap_or(timestamp)
    }

    /// Position of this frame inside its collection.
    ///
    /// Below k accesses the front is the first access ever recorded; at k it is
    /// the k-th most recent access. Both orderings evict the smallest key first.
    fn order_key(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }

    fn in_cache(&self, k: usize) -> bool {
        self.history.len() >= k
    }
}

struct ReplacerState {
    /// Logical clock, advanced once per recorded access
    current_timestamp: Timestamp,
    /// Bookkeeping for every tracked frame
    frames: HashMap<FrameId, FrameAccessInfo>,
    /// Frames with fewer than k accesses (+inf backward k-distance), keyed by first access
    history: BTreeMap<Timestamp, FrameId>,
    /// Frames with k accesses, keyed by their k-th most recent access
    cache: BTreeMap<Timestamp, FrameId>,
    /// Number of tracked frames marked evictable
    num_evictable: usize,
}

impl ReplacerState {
    fn collection_mut(&mut self, in_cache: bool) -> &mut BTreeMap<Timestamp, FrameId> {
        if in_cache {
            &mut self.cache
        } else {
            &mut self.history
        }
    }

    /// Drops every trace of the frame. Returns the removed record, if any.
    fn remove_record(&mut self, frame_id: FrameId, k: usize) -> Option<FrameAccessInfo> {
        let info = self.frames.remove(&frame_id)?;
        if let Some(key) = info.order_key() {
            self.collection_mut(info.in_cache(k)).remove(&key);
        }
        if info.is_evictable {
            self.num_evictable -= 1;
        }
        Some(info)
    }
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts a frame whose backward k-distance is the maximum
/// of all frames in the replacer. Backward k-distance is computed as the difference
/// in time between the current timestamp and the timestamp of kth previous access.
///
/// A frame with fewer than k historical accesses is given +inf as its backward k-distance.
/// If multiple frames have +inf backward k-distance, the replacer evicts the frame
/// with the earliest overall timestamp.
///
/// Frames are kept in two ordered collections: `history` for frames below k
/// accesses and `cache` for the rest. Eviction always drains `history` first.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and maximum frame count.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "k must be > 0");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState {
                current_timestamp: 0,
                frames: HashMap::with_capacity(max_frames),
                history: BTreeMap::new(),
                cache: BTreeMap::new(),
                num_evictable: 0,
            }),
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance.
    /// Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.num_evictable == 0 {
            return None;
        }

        let victim = state
            .history
            .values()
            .chain(state.cache.values())
            .copied()
            .find(|frame_id| {
                state
                    .frames
                    .get(frame_id)
                    .is_some_and(|info| info.is_evictable)
            })?;

        state.remove_record(victim, self.k);
        trace!(frame_id = victim.as_u32(), "replacer.evict");
        Some(victim)
    }

    /// Records that the given frame was accessed at the current timestamp.
    /// Unseen frames start out tracked but not evictable.
    pub fn record_access(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut state = self.state.lock();
        state.current_timestamp += 1;
        let timestamp = state.current_timestamp;

        let previous = state
            .frames
            .get(&frame_id)
            .and_then(|info| info.order_key().map(|key| (key, info.in_cache(self.k))));
        if let Some((key, in_cache)) = previous {
            state.collection_mut(in_cache).remove(&key);
        }

        let info = state
            .frames
            .entry(frame_id)
            .or_insert_with(|| FrameAccessInfo::new(self.k));
        let key = info.record_access(timestamp, self.k);
        let in_cache = info.in_cache(self.k);

        state.collection_mut(in_cache).insert(key, frame_id);
        Ok(())
    }

    /// Sets whether a frame is evictable.
    /// When a frame's pin count drops to 0, it should be marked as evictable.
    /// Untracked frames are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut state = self.state.lock();
        let Some(info) = state.frames.get_mut(&frame_id) else {
            return Ok(());
        };
        if info.is_evictable == is_evictable {
            return Ok(());
        }

        info.is_evictable = is_evictable;
        if is_evictable {
            state.num_evictable += 1;
        } else {
            state.num_evictable -= 1;
        }
        Ok(())
    }

    /// Removes a frame from the replacer entirely.
    /// This should be called when a page is deleted from the BufferPoolManager.
    ///
    /// Removing a tracked frame that is not evictable is a caller bug and fails
    /// with [`FerruleError::FrameNotEvictable`].
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut state = self.state.lock();
        let is_evictable = match state.frames.get(&frame_id) {
            Some(info) => info.is_evictable,
            None => return Ok(()),
        };
        if !is_evictable {
            return Err(FerruleError::FrameNotEvictable(frame_id));
        }

        state.remove_record(frame_id, self.k);
        Ok(())
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns whether the replacer holds a record for the frame.
    pub fn is_tracked(&self, frame_id: FrameId) -> bool {
        self.state.lock().frames.contains_key(&frame_id)
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.as_usize() >= self.max_frames {
            return Err(FerruleError::InvalidFrameId(frame_id));
        }
        Ok(())
    }
}
