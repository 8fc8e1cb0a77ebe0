pub mod buffer_pool_manager;
pub mod lru_replacer;
pub mod parallel_buffer_pool_manager;

pub use buffer_pool_manager::BufferPoolManager;
pub use parallel_buffer_pool_manager::ParallelBufferPoolManager;

use crate::common::config::PageId;
use crate::storage::page::Page;

/// Capability interface shared by `BufferPoolManager` and
/// `ParallelBufferPoolManager`. The hash table and the page guard
/// constructors are written against `Arc<dyn BufferPool>` so a caller can
/// swap a single instance for a sharded pool without touching call sites —
/// the role C++ filled with virtual inheritance from `BufferPoolManager`.
pub trait BufferPool: Send + Sync {
    /// Creates a new page in the buffer pool, pinned once on behalf of the
    /// caller. Returns `None` if every frame is pinned and none can be
    /// evicted.
    fn new_page(&self) -> Option<Page>;

    /// Fetches the requested page, pinning it once more on behalf of the
    /// caller. Returns `None` if the page isn't resident and no frame is
    /// free to bring it in.
    fn fetch_page(&self, page_id: PageId) -> Option<Page>;

    /// Unpins a page, optionally marking it dirty. Returns `false` if the
    /// page's pin count was already zero.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Flushes a page to disk regardless of its dirty flag. Returns `false`
    /// if the page is not resident.
    fn flush_page(&self, page_id: PageId) -> bool;

    /// Flushes every resident page to disk.
    fn flush_all_pages(&self);

    /// Deletes a page from the buffer pool and tells the disk manager its
    /// id may be reused. Returns `false` if the page is still pinned.
    fn delete_page(&self, page_id: PageId) -> bool;
}
