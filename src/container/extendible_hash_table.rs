use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use parking_lot::Mutex;
use rustc_hash::FxHasher;
use tracing::debug;

use crate::common::MAX_GLOBAL_DEPTH;

/// Default hasher for the page table
pub type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Index of a bucket inside the directory's arena
type BucketId = usize;

/// A fixed-capacity array of key/value pairs
struct Bucket<K, V> {
    /// Number of hash bits shared by every key in this bucket
    depth: u32,
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(depth: u32, capacity: usize) -> Self {
        Self {
            depth,
            items: Vec::with_capacity(capacity),
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.items.swap_remove(pos);
                true
            }
            None => false,
        }
    }
}

struct Directory<K, V> {
    global_depth: u32,
    /// `2^global_depth` slots, each naming the bucket it routes to
    slots: Vec<BucketId>,
    /// Bucket arena. Buckets are never merged, so ids stay valid forever.
    buckets: Vec<Bucket<K, V>>,
    /// Total number of entries
    len: usize,
}

impl<K, V> Directory<K, V> {
    fn slot_of(&self, hash: u64) -> usize {
        let mask = (1u64 << self.global_depth) - 1;
        (hash & mask) as usize
    }
}

/// Extendible hash table.
///
/// The directory doubles only when a full bucket is already addressed by every
/// hash bit in use, and a split rehashes only the overflowing bucket. Several
/// directory slots may alias one bucket: a bucket with local depth `d` is
/// referenced by `2^(global_depth - d)` slots.
///
/// All operations serialize on a single mutex.
pub struct ExtendibleHashTable<K, V, S = FxBuildHasher> {
    /// Maximum entries per bucket
    bucket_size: usize,
    hash_builder: S,
    dir: Mutex<Directory<K, V>>,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V> {
    /// Creates an empty table with one bucket of the given capacity.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, FxBuildHasher::default())
    }
}

impl<K: Hash + Eq, V: Clone, S: BuildHasher> ExtendibleHashTable<K, V, S> {
    pub fn with_hasher(bucket_size: usize, hash_builder: S) -> Self {
        assert!(bucket_size > 0, "bucket_size must be > 0");
        Self {
            bucket_size,
            hash_builder,
            dir: Mutex::new(Directory {
                global_depth: 0,
                slots: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
                len: 0,
            }),
        }
    }

    /// Looks up the value stored for `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let hash = self.hash_builder.hash_one(key);
        let dir = self.dir.lock();
        let bucket = &dir.buckets[dir.slots[dir.slot_of(hash)]];
        bucket.find(key).cloned()
    }

    /// Removes `key`. Returns whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash_builder.hash_one(key);
        let mut dir = self.dir.lock();
        let bucket_id = dir.slots[dir.slot_of(hash)];
        let removed = dir.buckets[bucket_id].remove(key);
        if removed {
            dir.len -= 1;
        }
        removed
    }

    /// Inserts or overwrites `key`, splitting buckets until it fits.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hash_builder.hash_one(&key);
        let mut dir = self.dir.lock();

        loop {
            let slot = dir.slot_of(hash);
            let bucket_id = dir.slots[slot];
            let bucket = &mut dir.buckets[bucket_id];

            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if bucket.items.len() < self.bucket_size {
                bucket.items.push((key, value));
                dir.len += 1;
                return;
            }

            self.split_bucket(&mut dir, bucket_id);
        }
    }

    /// Splits a full bucket in two, doubling the directory first if the bucket
    /// already uses every global hash bit.
    fn split_bucket(&self, dir: &mut Directory<K, V>, bucket_id: BucketId) {
        let local_depth = dir.buckets[bucket_id].depth;

        if local_depth == dir.global_depth {
            assert!(
                dir.global_depth < MAX_GLOBAL_DEPTH,
                "extendible hash directory exceeded depth {}",
                MAX_GLOBAL_DEPTH
            );
            dir.slots.extend_from_within(..);
            dir.global_depth += 1;
            debug!(
                global_depth = dir.global_depth,
                slots = dir.slots.len(),
                "page_table.grow_directory"
            );
        }

        let new_depth = local_depth + 1;
        let high_bit = 1usize << local_depth;
        let sibling_id = dir.buckets.len();

        let items = std::mem::take(&mut dir.buckets[bucket_id].items);
        dir.buckets[bucket_id].depth = new_depth;
        dir.buckets.push(Bucket::new(new_depth, self.bucket_size));

        for (slot, target) in dir.slots.iter_mut().enumerate() {
            if *target == bucket_id && slot & high_bit != 0 {
                *target = sibling_id;
            }
        }

        for (key, value) in items {
            let hash = self.hash_builder.hash_one(&key);
            let target = if (hash >> local_depth) & 1 == 1 {
                sibling_id
            } else {
                bucket_id
            };
            dir.buckets[target].items.push((key, value));
        }
    }

    /// Number of hash bits used to address the directory.
    pub fn global_depth(&self) -> u32 {
        self.dir.lock().global_depth
    }

    /// Local depth of the bucket behind directory slot `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> Option<u32> {
        let dir = self.dir.lock();
        dir.slots
            .get(dir_index)
            .map(|&bucket_id| dir.buckets[bucket_id].depth)
    }

    /// Number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.dir.lock().buckets.len()
    }

    /// Number of directory slots (always `2^global_depth`).
    pub fn directory_size(&self) -> usize {
        self.dir.lock().slots.len()
    }

    pub fn len(&self) -> usize {
        self.dir.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks every structural invariant of the directory, panicking on violation.
    pub fn verify_integrity(&self) {
        let dir = self.dir.lock();
        assert_eq!(dir.slots.len(), 1usize << dir.global_depth);

        let mut references = vec![0usize; dir.buckets.len()];
        for &bucket_id in &dir.slots {
            references[bucket_id] += 1;
        }

        let mut total = 0;
        for (bucket_id, bucket) in dir.buckets.iter().enumerate() {
            assert!(bucket.depth <= dir.global_depth);
            assert!(bucket.items.len() <= self.bucket_size);
            assert_eq!(
                references[bucket_id],
                1usize << (dir.global_depth - bucket.depth),
                "bucket {} has the wrong number of directory references",
                bucket_id
            );
            for (key, _) in &bucket.items {
                let hash = self.hash_builder.hash_one(key);
                assert_eq!(dir.slots[dir.slot_of(hash)], bucket_id);
            }
            total += bucket.items.len();
        }
        assert_eq!(total, dir.len);
    }
}
