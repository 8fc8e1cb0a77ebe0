use std::sync::Arc;

use parking_lot::{
    ArcRwLockReadGuard, ArcRwLockWriteGuard, MappedRwLockReadGuard, MappedRwLockWriteGuard,
    RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::common::config::{Lsn, PageId, BUSTUB_PAGE_SIZE};

const OFFSET_LSN: usize = 4;

/// Page is the basic unit of storage within the database system. Page provides
/// a wrapper for actual data pages being held in main memory. Page also
/// contains book-keeping information that is used by the buffer pool manager,
/// e.g. pin count, dirty flag, page id, etc.
///
/// Data and metadata share a single lock (`PageInner`), matching the on-disk
/// unit they protect. `ReadPageGuard`/`WritePageGuard` acquire this lock
/// through the `arc_lock`-flavored `read_arc`/`write_arc` so the resulting
/// guard owns its lock independently of `Page`'s lifetime and can be held for
/// as long as the guard itself lives.
#[derive(Debug, Clone)]
pub struct Page(Arc<RwLock<PageInner>>);

#[derive(Debug)]
pub(crate) struct PageInner {
    pub(crate) data: [u8; BUSTUB_PAGE_SIZE],
    pub(crate) page_id: Option<PageId>,
    pub(crate) pin_count: i32,
    pub(crate) is_dirty: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// Constructor. Zeros out the page data.
    pub fn new() -> Page {
        let inner = PageInner {
            data: [0; BUSTUB_PAGE_SIZE],
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        };
        Page(Arc::new(RwLock::new(inner)))
    }

    pub fn reset(&self) {
        let mut p = self.0.write();
        p.data.fill(0);
        p.page_id = None;
        p.pin_count = 0;
        p.is_dirty = false;
    }

    /// @return the actual data contained within this page
    pub fn get_data(&self) -> MappedRwLockReadGuard<'_, [u8; BUSTUB_PAGE_SIZE]> {
        RwLockReadGuard::map(self.0.read(), |i| &i.data)
    }

    pub fn get_mut_data(&self) -> MappedRwLockWriteGuard<'_, [u8; BUSTUB_PAGE_SIZE]> {
        RwLockWriteGuard::map(self.0.write(), |i| &mut i.data)
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.0.write().page_id = Some(page_id);
    }

    /// @return the page id of this page
    pub fn get_page_id(&self) -> Option<PageId> {
        self.0.read().page_id
    }

    /// @return the pin count of this page
    pub fn get_pin_count(&self) -> i32 {
        self.0.read().pin_count
    }

    pub fn pin(&self) {
        self.0.write().pin_count += 1;
    }

    pub fn unpin(&self) {
        self.0.write().pin_count -= 1;
    }

    /// @return true if the page in memory has been modified from the page on
    /// disk, false otherwise
    pub fn is_dirty(&self) -> bool {
        self.0.read().is_dirty
    }

    pub fn set_dirty(&self, is_dirty: bool) {
        self.0.write().is_dirty = is_dirty;
    }

    /// @return the page LSN.
    // This method assumes that LSN is stored at a certain offset in the data.
    pub fn get_lsn(&self) -> Lsn {
        let inner = self.0.read();
        Lsn::from_ne_bytes(
            inner.data[OFFSET_LSN..OFFSET_LSN + std::mem::size_of::<Lsn>()]
                .try_into()
                .unwrap(),
        )
    }

    /// Sets the page LSN.
    pub fn set_lsn(&self, lsn: Lsn) {
        let mut inner = self.0.write();
        let lsn_bytes = lsn.to_ne_bytes();
        inner.data[OFFSET_LSN..OFFSET_LSN + std::mem::size_of::<Lsn>()].copy_from_slice(&lsn_bytes);
    }

    /// Acquires this page's lock in shared mode as an owned guard, usable for
    /// as long as the caller likes independent of `self`'s lifetime. Backs
    /// `ReadPageGuard`.
    pub(crate) fn read_arc(&self) -> ArcRwLockReadGuard<RawRwLock, PageInner> {
        self.0.read_arc()
    }

    /// Acquires this page's lock in exclusive mode as an owned guard. Backs
    /// `WritePageGuard`.
    pub(crate) fn write_arc(&self) -> ArcRwLockWriteGuard<RawRwLock, PageInner> {
        self.0.write_arc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_and_dirty_tracking() {
        let page = Page::new();
        page.set_page_id(7);
        assert_eq!(page.get_page_id(), Some(7));
        assert_eq!(page.get_pin_count(), 0);

        page.pin();
        page.pin();
        assert_eq!(page.get_pin_count(), 2);
        page.unpin();
        assert_eq!(page.get_pin_count(), 1);

        assert!(!page.is_dirty());
        page.set_dirty(true);
        assert!(page.is_dirty());
    }

    #[test]
    fn lsn_round_trips_through_page_data() {
        let page = Page::new();
        assert_eq!(page.get_lsn(), 0);
        page.set_lsn(42);
        assert_eq!(page.get_lsn(), 42);
    }

    #[test]
    fn reset_clears_everything() {
        let page = Page::new();
        page.set_page_id(3);
        page.pin();
        page.set_dirty(true);
        page.get_mut_data()[0] = 9;

        page.reset();

        assert_eq!(page.get_page_id(), None);
        assert_eq!(page.get_pin_count(), 0);
        assert!(!page.is_dirty());
        assert_eq!(page.get_data()[0], 0);
    }
}
