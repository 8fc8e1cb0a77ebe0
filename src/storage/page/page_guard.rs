use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock};

use crate::buffer::BufferPool;
use crate::common::config::{PageId, BUSTUB_PAGE_SIZE};
use crate::storage::page::page::{Page, PageInner};

/// A guard that pins a page without holding any latch on it. Useful when a
/// caller only needs pin-level protection against eviction (e.g. to look at
/// metadata) and will acquire `ReadPageGuard`/`WritePageGuard` itself when it
/// actually touches the data.
pub struct BasicPageGuard {
    bpm: Arc<dyn BufferPool>,
    page: Option<Page>,
    is_dirty: bool,
}

impl BasicPageGuard {
    pub(crate) fn new(bpm: Arc<dyn BufferPool>, page: Page) -> BasicPageGuard {
        Self {
            bpm,
            page: Some(page),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.as_ref().expect("guard already dropped").get_page_id().unwrap()
    }

    pub fn get_data(&self) -> parking_lot::MappedRwLockReadGuard<'_, [u8; BUSTUB_PAGE_SIZE]> {
        self.page.as_ref().expect("guard already dropped").get_data()
    }

    pub fn get_data_mut(&mut self) -> parking_lot::MappedRwLockWriteGuard<'_, [u8; BUSTUB_PAGE_SIZE]> {
        self.is_dirty = true;
        self.page.as_ref().expect("guard already dropped").get_mut_data()
    }

    /// Upgrades a `BasicPageGuard` to a `ReadPageGuard`. The protected page
    /// stays pinned throughout (the pin count is not touched); only a
    /// shared latch is newly acquired on top of it.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let page = self.page.take().expect("guard already dropped");
        let latch = page.read_arc();
        ReadPageGuard {
            bpm: self.bpm.clone(),
            page: Some(page),
            latch: Some(latch),
        }
    }

    /// Upgrades a `BasicPageGuard` to a `WritePageGuard`, same pin-carrying
    /// behavior as `upgrade_read`.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let page = self.page.take().expect("guard already dropped");
        let latch = page.write_arc();
        WritePageGuard {
            bpm: self.bpm.clone(),
            page: Some(page),
            latch: Some(latch),
        }
    }

    fn release(&mut self) {
        if let Some(page) = self.page.take() {
            self.bpm.unpin_page(page.get_page_id().unwrap(), self.is_dirty);
        }
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// A guard that pins a page and holds a shared latch on its contents for the
/// guard's entire lifetime. The latch is released before the pin, so any
/// eviction/flush triggered by the final unpin never contends with a latch
/// this guard still held.
pub struct ReadPageGuard {
    bpm: Arc<dyn BufferPool>,
    page: Option<Page>,
    latch: Option<ArcRwLockReadGuard<RawRwLock, PageInner>>,
}

impl ReadPageGuard {
    pub(crate) fn new(bpm: Arc<dyn BufferPool>, page: Page) -> Self {
        let latch = page.read_arc();
        Self {
            bpm,
            page: Some(page),
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.as_ref().expect("guard already dropped").get_page_id().unwrap()
    }

    /// Retrieves the data from the page.
    pub fn get_data(&self) -> &[u8; BUSTUB_PAGE_SIZE] {
        &self.latch.as_ref().expect("guard already dropped").data
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.latch.take();
        if let Some(page) = self.page.take() {
            self.bpm.unpin_page(page.get_page_id().unwrap(), false);
        }
    }
}

/// A guard that pins a page and holds an exclusive latch on its contents for
/// the guard's entire lifetime. Every `WritePageGuard` marks the page dirty
/// on drop, since the only way to obtain mutable access is through
/// `get_data_mut`.
pub struct WritePageGuard {
    bpm: Arc<dyn BufferPool>,
    page: Option<Page>,
    latch: Option<ArcRwLockWriteGuard<RawRwLock, PageInner>>,
}

impl WritePageGuard {
    pub(crate) fn new(bpm: Arc<dyn BufferPool>, page: Page) -> Self {
        let latch = page.write_arc();
        Self {
            bpm,
            page: Some(page),
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.as_ref().expect("guard already dropped").get_page_id().unwrap()
    }

    pub fn get_data(&self) -> &[u8; BUSTUB_PAGE_SIZE] {
        &self.latch.as_ref().expect("guard already dropped").data
    }

    pub fn get_data_mut(&mut self) -> &mut [u8; BUSTUB_PAGE_SIZE] {
        &mut self.latch.as_mut().expect("guard already dropped").data
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.take();
        if let Some(page) = self.page.take() {
            self.bpm.unpin_page(page.get_page_id().unwrap(), true);
        }
    }
}

/// Fetches a page and wraps it in a `BasicPageGuard` without taking any
/// latch on its contents.
pub fn fetch_page_basic(bpm: &Arc<dyn BufferPool>, page_id: PageId) -> Option<BasicPageGuard> {
    let page = bpm.fetch_page(page_id)?;
    Some(BasicPageGuard::new(bpm.clone(), page))
}

/// Fetches a page and immediately latches it for shared access.
pub fn fetch_page_read(bpm: &Arc<dyn BufferPool>, page_id: PageId) -> Option<ReadPageGuard> {
    let page = bpm.fetch_page(page_id)?;
    Some(ReadPageGuard::new(bpm.clone(), page))
}

/// Fetches a page and immediately latches it for exclusive access.
pub fn fetch_page_write(bpm: &Arc<dyn BufferPool>, page_id: PageId) -> Option<WritePageGuard> {
    let page = bpm.fetch_page(page_id)?;
    Some(WritePageGuard::new(bpm.clone(), page))
}

/// Allocates a new page and immediately latches it for exclusive access, the
/// usual way callers initialize a freshly-created page's contents.
pub fn new_page_guarded(bpm: &Arc<dyn BufferPool>) -> Option<WritePageGuard> {
    let page = bpm.new_page()?;
    Some(WritePageGuard::new(bpm.clone(), page))
}
