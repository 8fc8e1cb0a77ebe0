use parking_lot::Mutex;

use crate::buffer::{BufferPool, BufferPoolManager};
use crate::common::config::PageId;
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;

/// Shards a logical buffer pool across `num_instances` independent
/// `BufferPoolManager`s, each backed by its own `DiskManager` handle onto
/// the same underlying file. Routing by `page_id % num_instances` spreads
/// both lock contention and eviction pressure across the shards.
pub struct ParallelBufferPoolManager {
    instances: Vec<BufferPoolManager>,
    /// Round-robin cursor consulted by `new_page` so page creation doesn't
    /// always hammer instance 0.
    start_idx: Mutex<usize>,
    pool_size: usize,
}

impl ParallelBufferPoolManager {
    pub fn new(num_instances: usize, pool_size: usize, disk_manager: DiskManager) -> Self {
        assert!(num_instances > 0);
        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolManager::new_sharded(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    disk_manager.clone(),
                )
            })
            .collect();

        Self {
            instances,
            start_idx: Mutex::new(0),
            pool_size,
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Total capacity across every shard.
    pub fn pool_size(&self) -> usize {
        self.pool_size * self.instances.len()
    }

    fn instance_for(&self, page_id: PageId) -> &BufferPoolManager {
        &self.instances[page_id as usize % self.instances.len()]
    }
}

impl BufferPool for ParallelBufferPoolManager {
    fn new_page(&self) -> Option<Page> {
        let num_instances = self.instances.len();
        let mut start_idx = self.start_idx.lock();

        for i in 0..num_instances {
            let idx = (*start_idx + i) % num_instances;
            if let Some(page) = self.instances[idx].new_page() {
                *start_idx = (page.get_page_id().unwrap() as usize + 1) % num_instances;
                return Some(page);
            }
        }

        *start_idx = (*start_idx + 1) % num_instances;
        None
    }

    fn fetch_page(&self, page_id: PageId) -> Option<Page> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> bool {
        self.instance_for(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) {
        for instance in &self.instances {
            instance.flush_all_pages();
        }
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        self.instance_for(page_id).delete_page(page_id)
    }
}
