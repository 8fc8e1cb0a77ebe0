use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::buffer::BufferPool;
use crate::common::config::{PageId, HASH_TABLE_DIRECTORY_MAX_DEPTH};
use crate::storage::page::{fetch_page_read, fetch_page_write, hash_table_bucket_page as bucket, hash_table_directory_page as directory, new_page_guarded};

/// A disk-backed extendible hash table. The directory doubles (or a bucket's
/// sibling gets re-pointed, whichever the bucket's local depth calls for)
/// when a bucket overflows, and two sibling buckets fold back together when
/// both go empty.
///
/// Concurrency follows the optimistic scheme this is ported from: most
/// operations only need `table_latch` held for reading, since the directory
/// changes far less often than buckets do; only a split or merge takes it
/// for writing. Each page additionally carries its own read/write latch
/// (`ReadPageGuard`/`WritePageGuard`), acquired after the directory is
/// already latched, so lock order is always table latch, then page latch.
pub struct ExtendibleHashTable<K, V> {
    bpm: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    _marker: std::marker::PhantomData<fn() -> (K, V)>,
}

fn hash_key<K: Hash>(key: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as u32
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Copy + PartialEq + Hash,
    V: Copy + PartialEq,
{
    /// Allocates a directory page and its first bucket, and points the
    /// directory's sole entry at that bucket.
    pub fn new(bpm: Arc<dyn BufferPool>) -> Self {
        let mut dir_guard = new_page_guarded(&bpm).expect("buffer pool exhausted during hash table init");
        let directory_page_id = dir_guard.page_id();
        directory::init(dir_guard.get_data_mut());

        let mut bucket_guard = new_page_guarded(&bpm).expect("buffer pool exhausted during hash table init");
        let bucket_page_id = bucket_guard.page_id();
        bucket::init::<K, V>(bucket_guard.get_data_mut());

        directory::set_bucket_page_id(dir_guard.get_data_mut(), 0, bucket_page_id);

        Self {
            bpm,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: std::marker::PhantomData,
        }
    }

    fn key_to_directory_index(&self, key: &K, dir_data: &[u8; crate::common::config::BUSTUB_PAGE_SIZE]) -> usize {
        (hash_key(key) & directory::global_depth_mask(dir_data)) as usize
    }

    /// Returns every value stored under `key`.
    pub fn get_value(&self, key: &K) -> Vec<V> {
        let _table_guard = self.table_latch.read();
        let dir_guard = fetch_page_read(&self.bpm, self.directory_page_id).unwrap();
        let idx = self.key_to_directory_index(key, dir_guard.get_data());
        let bucket_page_id = directory::bucket_page_id(dir_guard.get_data(), idx);
        drop(dir_guard);

        let bucket_guard = fetch_page_read(&self.bpm, bucket_page_id).unwrap();
        let mut result = Vec::new();
        bucket::get_value::<K, V>(bucket_guard.get_data(), key, &mut result);
        result
    }

    /// Inserts `(key, value)`. Returns `false` only if that exact pair is
    /// already present; a full bucket triggers a split rather than failing.
    pub fn insert(&self, key: K, value: V) -> bool {
        {
            let _table_guard = self.table_latch.read();
            let dir_guard = fetch_page_read(&self.bpm, self.directory_page_id).unwrap();
            let idx = self.key_to_directory_index(&key, dir_guard.get_data());
            let bucket_page_id = directory::bucket_page_id(dir_guard.get_data(), idx);
            drop(dir_guard);

            let mut bucket_guard = fetch_page_write(&self.bpm, bucket_page_id).unwrap();
            if !bucket::is_full::<K, V>(bucket_guard.get_data()) {
                return bucket::insert(bucket_guard.get_data_mut(), key, value);
            }
        }
        self.split_insert(key, value)
    }

    /// Splits the bucket that `key` maps to (growing the directory first if
    /// the bucket's local depth has caught up to the global depth), rehashes
    /// its contents across itself and the new sibling, then retries the
    /// insert. Loops because the post-split bucket could still be full if
    /// every live key in it shares the bits that route to the same side.
    fn split_insert(&self, key: K, value: V) -> bool {
        let _table_guard = self.table_latch.write();
        loop {
            let mut dir_guard = fetch_page_write(&self.bpm, self.directory_page_id).unwrap();
            let idx = self.key_to_directory_index(&key, dir_guard.get_data());
            let bucket_page_id = directory::bucket_page_id(dir_guard.get_data(), idx);

            let is_full = {
                let bucket_guard = fetch_page_read(&self.bpm, bucket_page_id).unwrap();
                bucket::is_full::<K, V>(bucket_guard.get_data())
            };

            if !is_full {
                let mut bucket_guard = fetch_page_write(&self.bpm, bucket_page_id).unwrap();
                return bucket::insert(bucket_guard.get_data_mut(), key, value);
            }

            let global_depth = directory::global_depth(dir_guard.get_data());
            let local_depth = directory::local_depth(dir_guard.get_data(), idx);

            if global_depth == local_depth && local_depth == HASH_TABLE_DIRECTORY_MAX_DEPTH {
                return false;
            }

            let mut new_bucket_guard =
                new_page_guarded(&self.bpm).expect("buffer pool exhausted during split");
            let new_bucket_page_id = new_bucket_guard.page_id();
            bucket::init::<K, V>(new_bucket_guard.get_data_mut());

            if global_depth == local_depth {
                let dir_data = dir_guard.get_data_mut();
                let bucket_count = 1usize << global_depth;
                for i in 0..bucket_count {
                    let page_id = directory::bucket_page_id(dir_data, i);
                    let depth = directory::local_depth(dir_data, i);
                    directory::set_bucket_page_id(dir_data, i + bucket_count, page_id);
                    directory::set_local_depth(dir_data, i + bucket_count, depth);
                }
                directory::incr_global_depth(dir_data);
                directory::set_bucket_page_id(dir_data, idx + bucket_count, new_bucket_page_id);
                directory::incr_local_depth(dir_data, idx);
                directory::incr_local_depth(dir_data, idx + bucket_count);
            } else {
                let dir_data = dir_guard.get_data_mut();
                let mask = (1usize << local_depth) - 1;
                let base_idx = mask & idx;
                let records_num = 1usize << (global_depth - local_depth - 1);
                let step = 1usize << local_depth;

                let mut cursor = base_idx;
                for _ in 0..records_num {
                    directory::incr_local_depth(dir_data, cursor);
                    cursor += step * 2;
                }
                let mut cursor = base_idx + step;
                for _ in 0..records_num {
                    directory::set_bucket_page_id(dir_data, cursor, new_bucket_page_id);
                    directory::incr_local_depth(dir_data, cursor);
                    cursor += step * 2;
                }
            }

            // Rehash the old bucket's contents across itself and the
            // sibling; every key's low (local_depth + 1) bits now agree with
            // exactly one of the two page ids, since that's precisely what
            // the directory update above just arranged.
            let mut old_bucket_guard = fetch_page_write(&self.bpm, bucket_page_id).unwrap();
            let drained = bucket::drain_all::<K, V>(old_bucket_guard.get_data_mut());
            for (k, v) in drained {
                let target_idx = self.key_to_directory_index(&k, dir_guard.get_data());
                let target_page_id = directory::bucket_page_id(dir_guard.get_data(), target_idx);
                if target_page_id == bucket_page_id {
                    bucket::insert(old_bucket_guard.get_data_mut(), k, v);
                } else {
                    debug_assert_eq!(target_page_id, new_bucket_page_id);
                    bucket::insert(new_bucket_guard.get_data_mut(), k, v);
                }
            }

            trace!(bucket_page_id, new_bucket_page_id, "split bucket");
            // Loop back around: the bucket `key` now maps to might be either
            // half, and either could still be full if the rehash was lopsided.
        }
    }

    /// Removes the exact `(key, value)` pair. Returns `false` if not found.
    pub fn remove(&self, key: &K, value: &V) -> bool {
        let removed;
        let should_merge;
        {
            let _table_guard = self.table_latch.read();
            let dir_guard = fetch_page_read(&self.bpm, self.directory_page_id).unwrap();
            let idx = self.key_to_directory_index(key, dir_guard.get_data());
            let bucket_page_id = directory::bucket_page_id(dir_guard.get_data(), idx);
            let local_depth = directory::local_depth(dir_guard.get_data(), idx);
            drop(dir_guard);

            let mut bucket_guard = fetch_page_write(&self.bpm, bucket_page_id).unwrap();
            removed = bucket::remove(bucket_guard.get_data_mut(), key, value);
            should_merge =
                bucket::is_empty::<K, V>(bucket_guard.get_data()) && local_depth != 0;
        }
        if should_merge {
            self.merge(key);
        }
        removed
    }

    /// Attempts exactly one merge of the bucket `key` maps to with its
    /// split-image sibling, re-checking both are still empty (another
    /// thread may have inserted in the gap between dropping the read latch
    /// above and acquiring the write latch here). Does not cascade: after
    /// at most one bucket merge it checks once whether the directory itself
    /// can now shrink.
    fn merge(&self, key: &K) {
        let _table_guard = self.table_latch.write();
        let mut dir_guard = fetch_page_write(&self.bpm, self.directory_page_id).unwrap();
        let idx = self.key_to_directory_index(key, dir_guard.get_data());
        let bucket_page_id = directory::bucket_page_id(dir_guard.get_data(), idx);
        let local_depth = directory::local_depth(dir_guard.get_data(), idx);

        let bucket_is_empty = {
            let bucket_guard = fetch_page_read(&self.bpm, bucket_page_id).unwrap();
            bucket::is_empty::<K, V>(bucket_guard.get_data())
        };

        if bucket_is_empty && local_depth != 0 {
            let sibling_idx = directory::split_image(dir_guard.get_data(), idx);
            let sibling_page_id = directory::bucket_page_id(dir_guard.get_data(), sibling_idx);
            let sibling_local_depth = directory::local_depth(dir_guard.get_data(), sibling_idx);

            let sibling_is_empty = {
                let sibling_guard = fetch_page_read(&self.bpm, sibling_page_id).unwrap();
                bucket::is_empty::<K, V>(sibling_guard.get_data())
            };

            if sibling_local_depth == local_depth && sibling_is_empty {
                let new_local_depth = local_depth - 1;
                let dir_data = dir_guard.get_data_mut();
                let mask = (1usize << new_local_depth) - 1;
                let base_idx = mask & idx;
                let global_depth = directory::global_depth(dir_data);
                let records_num = 1usize << (global_depth - new_local_depth);
                let step = 1usize << new_local_depth;

                let mut cursor = base_idx;
                for _ in 0..records_num {
                    directory::set_bucket_page_id(dir_data, cursor, bucket_page_id);
                    directory::decr_local_depth(dir_data, cursor);
                    cursor += step;
                }
                self.bpm.delete_page(sibling_page_id);
            }

            while directory::can_shrink(dir_guard.get_data()) {
                directory::decr_global_depth(dir_guard.get_data_mut());
            }
        }
    }

    pub fn global_depth(&self) -> u32 {
        let _table_guard = self.table_latch.read();
        let dir_guard = fetch_page_read(&self.bpm, self.directory_page_id).unwrap();
        directory::global_depth(dir_guard.get_data())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::storage::disk::DiskManager;

    fn test_table() -> ExtendibleHashTable<i32, i32> {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = DiskManager::new(db_file.to_str().unwrap());
        let bpm: Arc<dyn BufferPool> = Arc::new(BufferPoolManager::new(50, disk_manager));
        ExtendibleHashTable::new(bpm)
    }

    #[test]
    fn insert_and_get_value() {
        let table = test_table();
        assert!(table.insert(1, 100));
        assert!(table.insert(2, 200));
        assert_eq!(table.get_value(&1), vec![100]);
        assert_eq!(table.get_value(&2), vec![200]);
        assert_eq!(table.get_value(&3), Vec::<i32>::new());
    }

    #[test]
    fn duplicate_pair_rejected() {
        let table = test_table();
        assert!(table.insert(1, 100));
        assert!(!table.insert(1, 100));
    }

    #[test]
    fn remove_pair() {
        let table = test_table();
        table.insert(1, 100);
        assert!(table.remove(&1, &100));
        assert!(!table.remove(&1, &100));
        assert_eq!(table.get_value(&1), Vec::<i32>::new());
    }

    #[test]
    fn directory_grows_under_load_and_every_key_stays_findable() {
        let table = test_table();
        let bucket_capacity = bucket::capacity::<i32, i32>();
        let n = bucket_capacity as i32 * 8;

        for i in 0..n {
            assert!(table.insert(i, i * 10));
        }
        assert!(table.global_depth() > 0);

        for i in 0..n {
            assert_eq!(table.get_value(&i), vec![i * 10]);
        }
    }

    #[test]
    fn buckets_merge_back_down_after_everything_is_removed() {
        let table = test_table();
        let bucket_capacity = bucket::capacity::<i32, i32>();
        let n = bucket_capacity as i32 * 8;

        for i in 0..n {
            table.insert(i, i * 10);
        }
        let grown_depth = table.global_depth();
        assert!(grown_depth > 0);

        for i in 0..n {
            assert!(table.remove(&i, &(i * 10)));
        }
        assert_eq!(table.global_depth(), 0);
        for i in 0..n {
            assert_eq!(table.get_value(&i), Vec::<i32>::new());
        }
    }
}
