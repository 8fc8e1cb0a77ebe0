use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::lru_replacer::LruReplacer;
use crate::buffer::BufferPool;
use crate::common::config::{FrameId, PageId};
use crate::storage::disk::{DiskManager, DiskScheduler};
use crate::storage::page::Page;

/// BufferPoolManager reads disk pages into an in-memory pool of frames and
/// serves them back out, evicting least-recently-used unpinned frames under
/// memory pressure.
///
/// One coarse lock (`Inner`) protects the frame table, page table, and free
/// list together, matching the single `latch_` the teacher's
/// `BufferPoolManagerInstance` takes around every operation. The replacer
/// has its own internal lock since it's consulted both to pick a victim and
/// to record pin/unpin independent of whether the caller is currently
/// holding `Inner`'s lock.
pub struct BufferPoolManager {
    pool_size: usize,
    /// Total number of instances in the parallel pool this belongs to, or 1
    /// if this manager stands alone.
    num_instances: u32,
    /// This instance's index within the parallel pool, or 0 if standalone.
    instance_index: u32,
    /// Next page id this instance will hand out. Stepped by `num_instances`
    /// each allocation so ids always mod back to `instance_index`.
    next_page_id: AtomicU32,

    disk_manager: DiskManager,
    disk_scheduler: DiskScheduler,
    replacer: LruReplacer,

    inner: Mutex<Inner>,
}

struct Inner {
    /// One slot per frame; `None` until a page is loaded into that frame.
    frames: Vec<Option<Page>>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

impl BufferPoolManager {
    /// Creates a standalone buffer pool manager (`num_instances = 1`).
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::new_sharded(pool_size, 1, 0, disk_manager)
    }

    /// Creates one shard of a parallel buffer pool. `instance_index` must be
    /// less than `num_instances`; every page id this instance allocates
    /// satisfies `page_id % num_instances == instance_index`.
    pub fn new_sharded(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: DiskManager,
    ) -> Self {
        assert!(num_instances > 0);
        assert!(instance_index < num_instances);

        let disk_scheduler = DiskScheduler::new(disk_manager.clone());
        Self {
            pool_size,
            num_instances,
            instance_index,
            next_page_id: AtomicU32::new(instance_index),
            disk_manager,
            disk_scheduler,
            replacer: LruReplacer::new(pool_size),
            inner: Mutex::new(Inner {
                frames: vec![None; pool_size],
                page_table: HashMap::new(),
                free_list: (0..pool_size as FrameId).collect(),
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Allocates a fresh page id, stepping by `num_instances` so a parallel
    /// pool's shards never collide.
    fn allocate_page(&self) -> PageId {
        let id = self.next_page_id.fetch_add(self.num_instances, Ordering::SeqCst);
        debug_assert_eq!(id % self.num_instances, self.instance_index);
        id
    }

    /// Picks a frame to hold a new or freshly-fetched page: the front of
    /// the free list if non-empty, otherwise the replacer's victim. If the
    /// chosen frame holds a dirty page, that page is flushed first.
    fn acquire_frame(&self, inner: &mut Inner) -> Option<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Some(frame_id);
        }

        let frame_id = self.replacer.victim()?;
        if let Some(old_page) = inner.frames[frame_id as usize].take() {
            if old_page.is_dirty() {
                self.disk_scheduler.write_sync(old_page.clone());
            }
            inner.page_table.remove(&old_page.get_page_id().unwrap());
        }
        Some(frame_id)
    }
}

impl BufferPool for BufferPoolManager {
    fn new_page(&self) -> Option<Page> {
        let mut inner = self.inner.lock();
        let frame_id = self.acquire_frame(&mut inner)?;

        let page_id = self.allocate_page();
        let page = Page::new();
        page.set_page_id(page_id);
        page.pin();

        inner.page_table.insert(page_id, frame_id);
        inner.frames[frame_id as usize] = Some(page.clone());
        self.replacer.pin(frame_id);

        debug!(page_id, frame_id, "allocated new page");
        Some(page)
    }

    fn fetch_page(&self, page_id: PageId) -> Option<Page> {
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let page = inner.frames[frame_id as usize].clone().unwrap();
            page.pin();
            self.replacer.pin(frame_id);
            return Some(page);
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let page = Page::new();
        page.set_page_id(page_id);
        self.disk_scheduler.read_sync(page.clone());
        page.pin();

        inner.page_table.insert(page_id, frame_id);
        inner.frames[frame_id as usize] = Some(page.clone());
        self.replacer.pin(frame_id);

        debug!(page_id, frame_id, "fetched page from disk");
        Some(page)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let page = inner.frames[frame_id as usize].as_ref().unwrap();
        if page.get_pin_count() <= 0 {
            return false;
        }

        if is_dirty {
            page.set_dirty(true);
        }
        page.unpin();
        if page.get_pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    fn flush_page(&self, page_id: PageId) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let page = inner.frames[frame_id as usize].as_ref().unwrap();
        page.set_dirty(false);
        self.disk_scheduler.write_sync(page.clone());
        true
    }

    fn flush_all_pages(&self) {
        let inner = self.inner.lock();
        for page in inner.frames.iter().flatten() {
            page.set_dirty(false);
            self.disk_scheduler.write_sync(page.clone());
        }
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };
        let page = inner.frames[frame_id as usize].as_ref().unwrap();
        if page.get_pin_count() != 0 {
            return false;
        }

        if page.is_dirty() {
            page.set_dirty(false);
            self.disk_scheduler.write_sync(page.clone());
        }

        inner.page_table.remove(&page_id);
        inner.frames[frame_id as usize] = None;
        self.replacer.pin(frame_id);
        inner.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    fn test_bpm(pool_size: usize) -> BufferPoolManager {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = DiskManager::new(db_file.to_str().unwrap());
        BufferPoolManager::new(pool_size, disk_manager)
    }

    #[test]
    fn new_page_then_fetch_round_trips_data() {
        let bpm = test_bpm(3);
        let page0 = bpm.new_page().unwrap();
        let page_id = page0.get_page_id().unwrap();
        page0.get_mut_data()[0] = 42;
        bpm.unpin_page(page_id, true);

        let fetched = bpm.fetch_page(page_id).unwrap();
        assert_eq!(fetched.get_data()[0], 42);
        bpm.unpin_page(page_id, false);
    }

    #[test]
    fn pool_exhaustion_returns_none_when_all_pinned() {
        let bpm = test_bpm(2);
        let _a = bpm.new_page().unwrap();
        let _b = bpm.new_page().unwrap();
        assert!(bpm.new_page().is_none());
    }

    #[test]
    fn unpinned_frame_gets_evicted_for_new_page() {
        let bpm = test_bpm(1);
        let a = bpm.new_page().unwrap();
        let a_id = a.get_page_id().unwrap();
        bpm.unpin_page(a_id, false);

        let b = bpm.new_page().unwrap();
        assert_ne!(a_id, b.get_page_id().unwrap());
        // `a` has been evicted; fetching it again must go back to disk and
        // succeed once `b` is unpinned and evicted in turn.
        bpm.unpin_page(b.get_page_id().unwrap(), false);
        assert!(bpm.fetch_page(a_id).is_some());
    }

    #[test]
    fn delete_page_refuses_while_pinned() {
        let bpm = test_bpm(2);
        let page = bpm.new_page().unwrap();
        let page_id = page.get_page_id().unwrap();
        assert!(!bpm.delete_page(page_id));

        bpm.unpin_page(page_id, false);
        assert!(bpm.delete_page(page_id));
        assert!(bpm.disk_manager.is_deallocated(page_id));
    }

    #[test]
    fn sharded_instances_allocate_disjoint_page_ids() {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = DiskManager::new(db_file.to_str().unwrap());

        let shard0 = BufferPoolManager::new_sharded(2, 2, 0, disk_manager.clone());
        let shard1 = BufferPoolManager::new_sharded(2, 2, 1, disk_manager);

        let p0 = shard0.new_page().unwrap().get_page_id().unwrap();
        let p1 = shard1.new_page().unwrap().get_page_id().unwrap();
        assert_eq!(p0 % 2, 0);
        assert_eq!(p1 % 2, 1);
    }
}
