//! Integration tests for the LRU-K replacer

use std::collections::HashMap;

use ferrule::buffer::LruKReplacer;
use ferrule::common::{FerruleError, FrameId};
use proptest::prelude::*;

fn touch(replacer: &LruKReplacer, frame: u32) {
    replacer.record_access(FrameId::new(frame)).unwrap();
}

fn set_evictable(replacer: &LruKReplacer, frame: u32, evictable: bool) {
    replacer.set_evictable(FrameId::new(frame), evictable).unwrap();
}

#[test]
fn test_lru_k_eviction_order() {
    let replacer = LruKReplacer::new(2, 10);

    for i in 0..5 {
        touch(&replacer, i);
        set_evictable(&replacer, i, true);
    }

    assert_eq!(replacer.size(), 5);

    // All frames have only 1 access (< k=2), so all have +inf distance
    // Should evict in order of earliest timestamp (FIFO for +inf frames)
    for i in 0..5 {
        assert_eq!(replacer.evict(), Some(FrameId::new(i)));
    }

    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_respects_k_distance() {
    let replacer = LruKReplacer::new(2, 10);

    // Frame 0: accessed once (will have +inf k-distance)
    touch(&replacer, 0);

    // Frames 1 and 2: accessed twice, frame 2 more recently
    touch(&replacer, 1);
    touch(&replacer, 1);
    touch(&replacer, 2);
    touch(&replacer, 2);

    for i in 0..3 {
        set_evictable(&replacer, i, true);
    }

    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_k_pinned_frames_not_evicted() {
    let replacer = LruKReplacer::new(2, 10);

    touch(&replacer, 0);
    touch(&replacer, 1);
    touch(&replacer, 2);

    // Only mark frames 1 and 2 as evictable
    set_evictable(&replacer, 1, true);
    set_evictable(&replacer, 2, true);

    assert_eq!(replacer.size(), 2);

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), None);
    assert!(replacer.is_tracked(FrameId::new(0)));
}

#[test]
fn test_lru_k_toggle_evictable() {
    let replacer = LruKReplacer::new(2, 10);

    touch(&replacer, 0);
    set_evictable(&replacer, 0, true);
    assert_eq!(replacer.size(), 1);

    set_evictable(&replacer, 0, false);
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);

    // Setting the same value twice does not double count
    set_evictable(&replacer, 0, true);
    set_evictable(&replacer, 0, true);
    assert_eq!(replacer.size(), 1);
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_k_remove() {
    let replacer = LruKReplacer::new(2, 10);

    touch(&replacer, 0);
    touch(&replacer, 1);
    set_evictable(&replacer, 0, true);
    set_evictable(&replacer, 1, true);

    replacer.remove(FrameId::new(0)).unwrap();
    assert_eq!(replacer.size(), 1);
    assert!(!replacer.is_tracked(FrameId::new(0)));

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_remove_pinned_frame_fails() {
    let replacer = LruKReplacer::new(2, 10);
    touch(&replacer, 4);

    assert!(matches!(
        replacer.remove(FrameId::new(4)),
        Err(FerruleError::FrameNotEvictable(_))
    ));
    assert!(replacer.is_tracked(FrameId::new(4)));
}

#[test]
fn test_lru_k_frame_bound_is_strict() {
    let replacer = LruKReplacer::new(2, 3);
    touch(&replacer, 2);

    for op in [
        replacer.record_access(FrameId::new(3)),
        replacer.set_evictable(FrameId::new(3), true),
        replacer.remove(FrameId::new(3)),
    ] {
        assert!(matches!(op, Err(FerruleError::InvalidFrameId(_))));
    }
}

#[test]
fn test_lru_k_multiple_inf_distance() {
    let replacer = LruKReplacer::new(3, 10);

    // All frames have fewer than k=3 accesses
    touch(&replacer, 0);
    touch(&replacer, 1);
    touch(&replacer, 1);
    touch(&replacer, 2);

    for i in 0..3 {
        set_evictable(&replacer, i, true);
    }

    // Ordered by first access
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_k_history_limit() {
    let replacer = LruKReplacer::new(2, 10);

    for _ in 0..10 {
        touch(&replacer, 0);
    }
    touch(&replacer, 1);
    touch(&replacer, 1);

    set_evictable(&replacer, 0, true);
    set_evictable(&replacer, 1, true);

    // Only the last k accesses of frame 0 count
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
}

/// k=2 over three frames holding pages A, B and C.
#[test]
fn test_lru_k_three_frame_walkthrough() {
    let (a, b, c) = (0, 1, 2);
    let replacer = LruKReplacer::new(2, 3);

    // Each page is loaded and pinned once, then unpinned
    for frame in [a, b, c] {
        touch(&replacer, frame);
    }
    for frame in [a, b, c] {
        set_evictable(&replacer, frame, true);
    }

    // A reaches k accesses, B and C stay in history
    touch(&replacer, a);
    assert_eq!(replacer.evict(), Some(FrameId::new(b)));

    // C reaches k accesses after A did, so A's k-th access is older
    touch(&replacer, c);
    assert_eq!(replacer.evict(), Some(FrameId::new(a)));
    assert_eq!(replacer.evict(), Some(FrameId::new(c)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_concurrent_access() {
    use std::sync::Arc;
    use std::thread;

    let replacer = Arc::new(LruKReplacer::new(2, 100));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..25 {
                    let frame_id = FrameId::new((t * 25 + i) as u32);
                    replacer.record_access(frame_id).unwrap();
                    replacer.set_evictable(frame_id, true).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 100);

    for _ in 0..100 {
        assert!(replacer.evict().is_some());
    }

    assert_eq!(replacer.size(), 0);
}

const MODEL_FRAMES: u32 = 8;

#[derive(Debug, Clone)]
enum Op {
    Access(u32),
    SetEvictable(u32, bool),
    Remove(u32),
    Evict,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..MODEL_FRAMES).prop_map(Op::Access),
        3 => (0..MODEL_FRAMES, any::<bool>()).prop_map(|(f, e)| Op::SetEvictable(f, e)),
        1 => (0..MODEL_FRAMES).prop_map(Op::Remove),
        2 => Just(Op::Evict),
    ]
}

/// Straightforward backward k-distance model: full access history per frame,
/// linear scan on eviction.
struct Model {
    k: usize,
    clock: u64,
    frames: HashMap<u32, (Vec<u64>, bool)>,
}

impl Model {
    fn access(&mut self, frame: u32) {
        self.clock += 1;
        self.frames.entry(frame).or_insert((Vec::new(), false)).0.push(self.clock);
    }

    fn set_evictable(&mut self, frame: u32, evictable: bool) {
        if let Some(entry) = self.frames.get_mut(&frame) {
            entry.1 = evictable;
        }
    }

    fn size(&self) -> usize {
        self.frames.values().filter(|(_, e)| *e).count()
    }

    /// (has fewer than k accesses, ordering timestamp); smaller key is evicted first
    fn rank(&self, accesses: &[u64]) -> (bool, u64) {
        if accesses.len() < self.k {
            (false, accesses[0])
        } else {
            (true, accesses[accesses.len() - self.k])
        }
    }

    fn evict(&mut self) -> Option<u32> {
        let victim = self
            .frames
            .iter()
            .filter(|(_, (_, evictable))| *evictable)
            .min_by_key(|(_, (accesses, _))| self.rank(accesses))
            .map(|(&frame, _)| frame)?;
        self.frames.remove(&victim);
        Some(victim)
    }
}

proptest! {
    #[test]
    fn prop_replacer_matches_k_distance_model(
        k in 1usize..4,
        ops in prop::collection::vec(arb_op(), 1..200),
    ) {
        let replacer = LruKReplacer::new(k, MODEL_FRAMES as usize);
        let mut model = Model { k, clock: 0, frames: HashMap::new() };

        for op in ops {
            match op {
                Op::Access(f) => {
                    replacer.record_access(FrameId::new(f)).unwrap();
                    model.access(f);
                }
                Op::SetEvictable(f, e) => {
                    replacer.set_evictable(FrameId::new(f), e).unwrap();
                    model.set_evictable(f, e);
                }
                Op::Remove(f) => {
                    let result = replacer.remove(FrameId::new(f));
                    let evictable = model.frames.get(&f).map(|(_, e)| *e);
                    match evictable {
                        None => prop_assert!(result.is_ok()),
                        Some(false) => prop_assert!(result.is_err()),
                        Some(true) => {
                            prop_assert!(result.is_ok());
                            model.frames.remove(&f);
                        }
                    }
                }
                Op::Evict => {
                    prop_assert_eq!(replacer.evict(), model.evict().map(FrameId::new));
                }
            }
            prop_assert_eq!(replacer.size(), model.size());
        }
    }
}
