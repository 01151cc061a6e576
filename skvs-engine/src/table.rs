//! # Sharded Hash Table
//!
//! A fixed array of buckets, each a chain of entries behind its own
//! [`FairRwLock`].
//!
//! ## Design Principles
//!
//! 1. **Per-Bucket Locking**: An operation locks only the bucket its key
//!    hashes to; keys in different buckets never contend.
//! 2. **Owned Chains**: Entries own their key and value strings and the next
//!    link, so unlinking an entry releases all of its storage.
//! 3. **Copy-Out Reads**: `search` returns a fresh `String`; callers never
//!    hold a reference into the table after the read lock is released.
//! 4. **Fixed Geometry**: The bucket count is chosen at construction and never
//!    changes, so an index computed once stays valid.
//! 5. **Fallible Copies**: Key and value storage is reserved with
//!    `try_reserve_exact`, turning allocation failure into `OutOfMemory`
//!    instead of an abort.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use skvs_common::{SkvsError, SkvsResult};
use tracing::debug;

use crate::engine::{InsertStatus, KVEngine};
use crate::rwlock::{FairRwLock, LockOptions, LockStats};

/// Rolling polynomial hash (`hash * 32 + byte`) reduced to a bucket index.
///
/// Deterministic across runs and platforms.
pub fn bucket_index(key: &str, bucket_count: usize) -> usize {
    let hash = key
        .bytes()
        .fold(0u32, |hash, byte| (hash << 5).wrapping_add(u32::from(byte)));
    hash as usize % bucket_count
}

struct Entry {
    key: String,
    value: String,
    next: Option<Box<Entry>>,
}

/// Singly linked chain of one bucket.
#[derive(Default)]
struct Chain {
    head: Option<Box<Entry>>,
    len: usize,
}

impl Chain {
    fn iter(&self) -> impl Iterator<Item = &Entry> {
        std::iter::successors(self.head.as_deref(), |entry| entry.next.as_deref())
    }

    fn find(&self, key: &str) -> Option<&Entry> {
        self.iter().find(|entry| entry.key == key)
    }

    fn find_mut(&mut self, key: &str) -> Option<&mut Entry> {
        let mut node = self.head.as_deref_mut();
        while let Some(entry) = node {
            if entry.key == key {
                return Some(entry);
            }
            node = entry.next.as_deref_mut();
        }
        None
    }

    fn push_front(&mut self, key: String, value: String) {
        let next = self.head.take();
        self.head = Some(Box::new(Entry { key, value, next }));
        self.len += 1;
    }

    fn unlink(&mut self, key: &str) -> Option<Box<Entry>> {
        let mut cursor = &mut self.head;
        while cursor.as_ref().is_some_and(|entry| entry.key != key) {
            cursor = &mut cursor.as_mut()?.next;
        }
        let mut removed = cursor.take()?;
        *cursor = removed.next.take();
        self.len -= 1;
        Some(removed)
    }
}

impl Drop for Chain {
    // Iterative teardown keeps long chains from recursing through Box drops.
    fn drop(&mut self) {
        let mut node = self.head.take();
        while let Some(mut entry) = node {
            node = entry.next.take();
        }
    }
}

fn copy_str(src: &str) -> SkvsResult<String> {
    let mut out = String::new();
    out.try_reserve_exact(src.len())?;
    out.push_str(src);
    Ok(out)
}

/// Concurrent hash table with one fair reader-writer lock per bucket.
pub struct ShardedTable {
    buckets: Box<[FairRwLock<Chain>]>,
    // Advisory; refreshed by `dump`.
    total_entries: AtomicUsize,
}

impl ShardedTable {
    /// Creates a table with `bucket_count` empty buckets.
    ///
    /// Fails with `InvalidInput` for zero buckets or an invalid lock
    /// configuration, and `OutOfMemory` if buckets or locks cannot be
    /// allocated.
    pub fn new(bucket_count: usize, options: LockOptions) -> SkvsResult<Self> {
        if bucket_count == 0 {
            return Err(SkvsError::InvalidInput);
        }

        let mut buckets = Vec::new();
        buckets.try_reserve_exact(bucket_count)?;
        for _ in 0..bucket_count {
            buckets.push(FairRwLock::new(Chain::default(), options)?);
        }
        debug!(bucket_count, ring_capacity = options.ring_capacity, "hash table initialized");

        Ok(ShardedTable {
            buckets: buckets.into_boxed_slice(),
            total_entries: AtomicUsize::new(0),
        })
    }

    /// Number of buckets, fixed for the table's lifetime.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket a key maps to.
    pub fn bucket_index(&self, key: &str) -> usize {
        bucket_index(key, self.buckets.len())
    }

    /// Sum of the per-bucket counters, read bucket by bucket under read
    /// access. Not atomic across buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.read().len).sum()
    }

    /// True if no bucket holds an entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total recorded by the last `dump`.
    pub fn last_dumped_total(&self) -> usize {
        self.total_entries.load(Ordering::Relaxed)
    }

    /// Inserts `key` unless it already exists.
    pub fn insert(&self, key: &str, value: &str) -> SkvsResult<InsertStatus> {
        let mut chain = self.buckets[self.bucket_index(key)].write();
        if chain.find(key).is_some() {
            return Ok(InsertStatus::Collision);
        }
        let key = copy_str(key)?;
        let value = copy_str(value)?;
        chain.push_front(key, value);
        Ok(InsertStatus::Created)
    }

    /// Returns a copy of the value stored under `key`.
    pub fn search(&self, key: &str) -> SkvsResult<Option<String>> {
        let chain = self.buckets[self.bucket_index(key)].read();
        chain.find(key).map(|entry| copy_str(&entry.value)).transpose()
    }

    /// Replaces the value of an existing key. Returns false if the key is
    /// missing; no entry is created.
    pub fn update(&self, key: &str, value: &str) -> SkvsResult<bool> {
        let mut chain = self.buckets[self.bucket_index(key)].write();
        match chain.find_mut(key) {
            Some(entry) => {
                entry.value = copy_str(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unlinks `key`. Returns false if the key is missing.
    pub fn delete(&self, key: &str) -> SkvsResult<bool> {
        let mut chain = self.buckets[self.bucket_index(key)].write();
        Ok(chain.unlink(key).is_some())
    }

    /// Walks every bucket without taking its lock and returns a snapshot of
    /// all entries and lock counters.
    ///
    /// `&mut self` guarantees no operation is in flight, which is what makes
    /// skipping the locks sound. The recomputed total is also stored as the
    /// table's advisory counter.
    pub fn dump(&mut self) -> TableDump {
        let mut buckets = Vec::new();
        for (index, bucket) in self.buckets.iter_mut().enumerate() {
            let lock = bucket.stats();
            let chain = bucket.get_mut();
            if chain.len == 0 {
                continue;
            }
            buckets.push(BucketDump {
                index,
                lock,
                entries: chain
                    .iter()
                    .map(|entry| (entry.key.clone(), entry.value.clone()))
                    .collect(),
            });
        }

        let total_entries = buckets.iter().map(|bucket| bucket.entries.len()).sum();
        self.total_entries.store(total_entries, Ordering::Relaxed);
        TableDump {
            total_entries,
            buckets,
        }
    }
}

impl KVEngine for ShardedTable {
    fn insert(&self, key: &str, value: &str) -> SkvsResult<InsertStatus> {
        ShardedTable::insert(self, key, value)
    }

    fn search(&self, key: &str) -> SkvsResult<Option<String>> {
        ShardedTable::search(self, key)
    }

    fn update(&self, key: &str, value: &str) -> SkvsResult<bool> {
        ShardedTable::update(self, key, value)
    }

    fn delete(&self, key: &str) -> SkvsResult<bool> {
        ShardedTable::delete(self, key)
    }
}

impl fmt::Debug for ShardedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedTable")
            .field("bucket_count", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

/// Snapshot produced by [`ShardedTable::dump`]. Empty buckets are omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDump {
    pub total_entries: usize,
    pub buckets: Vec<BucketDump>,
}

/// One non-empty bucket in a [`TableDump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDump {
    pub index: usize,
    pub lock: LockStats,
    /// Key/value pairs in chain order (most recently created first).
    pub entries: Vec<(String, String)>,
}

impl fmt::Display for TableDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Hash Table Dump] Total Entries: {}", self.total_entries)?;
        for bucket in &self.buckets {
            writeln!(f, "Bucket {}: {} entries", bucket.index, bucket.entries.len())?;
            writeln!(
                f,
                "  Lock State -> Read Count: {}, Write Count: {}",
                bucket.lock.readers_present, bucket.lock.writers_active
            )?;
            for (key, value) in &bucket.entries {
                writeln!(f, "    Key:   {key}")?;
                writeln!(f, "    Value: {value}")?;
            }
        }
        write!(f, "End of Dump")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::time::{Duration, Instant};

    fn table(buckets: usize) -> ShardedTable {
        ShardedTable::new(buckets, LockOptions::default()).unwrap()
    }

    #[test]
    fn hash_is_rolling_polynomial() {
        assert_eq!(bucket_index("", 7), 0);
        assert_eq!(bucket_index("a", 1024), 97);
        assert_eq!(bucket_index("ab", 1024), (97 * 32 + 98) % 1024);
        assert_eq!(bucket_index("a", 4), 1);
        assert_eq!(bucket_index("b", 4), 2);
        assert_eq!(bucket_index("c", 4), 3);
    }

    #[test]
    fn rejects_zero_buckets() {
        assert_eq!(
            ShardedTable::new(0, LockOptions::default()).unwrap_err(),
            SkvsError::InvalidInput
        );
    }

    #[test]
    fn read_after_create_returns_value() {
        let table = table(16);
        assert_eq!(table.insert("k", "v").unwrap(), InsertStatus::Created);
        assert_eq!(table.search("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn duplicate_create_collides_and_keeps_original() {
        let table = table(16);
        assert_eq!(table.insert("k", "v1").unwrap(), InsertStatus::Created);
        assert_eq!(table.insert("k", "v2").unwrap(), InsertStatus::Collision);
        assert_eq!(table.search("k").unwrap().as_deref(), Some("v1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn update_missing_key_does_not_create() {
        let table = table(16);
        assert!(!table.update("ghost", "v").unwrap());
        assert_eq!(table.search("ghost").unwrap(), None);
        assert!(table.is_empty());
    }

    #[test]
    fn update_replaces_value() {
        let table = table(16);
        table.insert("k", "old").unwrap();
        assert!(table.update("k", "new").unwrap());
        assert_eq!(table.search("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn delete_then_read_misses_and_repeat_delete_misses() {
        let table = table(16);
        table.insert("k", "v").unwrap();
        assert!(table.delete("k").unwrap());
        assert_eq!(table.search("k").unwrap(), None);
        assert!(!table.delete("k").unwrap());
    }

    #[test]
    fn chains_handle_colliding_keys() {
        // One bucket: every key shares a chain.
        let table = table(1);
        for i in 0..10 {
            table.insert(&format!("k{i}"), &format!("v{i}")).unwrap();
        }
        // Unlink from the middle, the head and the tail.
        assert!(table.delete("k5").unwrap());
        assert!(table.delete("k9").unwrap());
        assert!(table.delete("k0").unwrap());
        assert_eq!(table.len(), 7);
        for i in [1, 2, 3, 4, 6, 7, 8] {
            assert_eq!(table.search(&format!("k{i}")).unwrap(), Some(format!("v{i}")));
        }
    }

    #[test]
    fn search_returns_independent_copy() {
        let table = table(4);
        table.insert("k", "v").unwrap();
        let mut copy = table.search("k").unwrap().unwrap();
        copy.push_str("-changed");
        assert_eq!(table.search("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn concurrent_creates_in_distinct_buckets() {
        let mut table = table(4);
        let barrier = Barrier::new(3);
        std::thread::scope(|s| {
            for (key, value) in [("a", "1"), ("b", "2"), ("c", "3")] {
                let (table, barrier) = (&table, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    assert_eq!(table.insert(key, value).unwrap(), InsertStatus::Created);
                });
            }
        });

        let dump = table.dump();
        assert_eq!(dump.total_entries, 3);
        assert_eq!(dump.buckets.len(), 3);
        assert_eq!(table.last_dumped_total(), 3);
    }

    #[test]
    fn writers_in_distinct_buckets_do_not_wait_for_each_other() {
        let delay = Duration::from_millis(300);
        let table = ShardedTable::new(
            4,
            LockOptions {
                release_delay: delay,
                ..LockOptions::default()
            },
        )
        .unwrap();
        let barrier = Barrier::new(3);

        let start = Instant::now();
        std::thread::scope(|s| {
            for key in ["a", "b", "c"] {
                let (table, barrier) = (&table, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    table.insert(key, "v").unwrap();
                });
            }
        });
        // Serialized writers would need three delays.
        assert!(start.elapsed() < delay * 2, "took {:?}", start.elapsed());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn concurrent_mixed_workload_keeps_keys_unique() {
        let mut table = table(8);
        std::thread::scope(|s| {
            for worker in 0..6 {
                let table = &table;
                s.spawn(move || {
                    for i in 0..200 {
                        let key = format!("key{}", i % 20);
                        match (worker + i) % 4 {
                            0 => {
                                let _ = table.insert(&key, "x").unwrap();
                            }
                            1 => {
                                let _ = table.search(&key).unwrap();
                            }
                            2 => {
                                let _ = table.update(&key, "y").unwrap();
                            }
                            _ => {
                                let _ = table.delete(&key).unwrap();
                            }
                        }
                    }
                });
            }
        });

        let dump = table.dump();
        let mut keys: Vec<_> = dump
            .buckets
            .iter()
            .flat_map(|bucket| bucket.entries.iter().map(|(key, _)| key.clone()))
            .collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
        assert!(dump.buckets.iter().all(|bucket| bucket.lock == LockStats::default()));
    }

    #[test]
    fn dump_renders_entries() {
        let mut table = table(4);
        table.insert("a", "1").unwrap();
        let text = table.dump().to_string();
        assert!(text.contains("Total Entries: 1"));
        assert!(text.contains("Bucket 1: 1 entries"));
        assert!(text.contains("Key:   a"));
        assert!(text.ends_with("End of Dump"));
    }

    #[test]
    fn long_chain_drops_without_recursion() {
        let mut chain = Chain::default();
        for i in 0..200_000 {
            chain.push_front(i.to_string(), String::new());
        }
        assert_eq!(chain.len, 200_000);
        drop(chain);
    }
}
