use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::common::config::{PageId, BUSTUB_PAGE_SIZE};

/// DiskManager takes care of the allocation and deallocation of pages within
/// a database. It performs the reading and writing of pages to and from
/// disk, providing a logical file layer within the context of a database
/// management system.
///
/// The backing file handle is reference-counted so a single on-disk file can
/// be shared by several logical `DiskManager` handles (the parallel buffer
/// pool gives each of its instances its own handle onto the same file).
#[derive(Clone)]
pub struct DiskManager {
    db_io: Arc<Mutex<File>>,
    next_page_id: Arc<AtomicU32>,
    deallocated: Arc<Mutex<HashSet<PageId>>>,
    num_flushes: Arc<AtomicU64>,
    num_writes: Arc<AtomicU64>,
}

impl DiskManager {
    /// Creates a new disk manager that writes to the specified database file.
    pub fn new(db_file: &str) -> Self {
        let db_io = OpenOptions::new()
            .read(true)
            .write(true)
            .open(db_file)
            .or_else(|_| {
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(db_file)
            })
            .unwrap();

        Self {
            db_io: Arc::new(Mutex::new(db_io)),
            next_page_id: Arc::new(AtomicU32::new(0)),
            deallocated: Arc::new(Mutex::new(HashSet::new())),
            num_flushes: Arc::new(AtomicU64::new(0)),
            num_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Write a page to the database file.
    pub fn write_page(&self, page_id: PageId, page_data: &[u8; BUSTUB_PAGE_SIZE]) {
        let offset = page_id as u64 * BUSTUB_PAGE_SIZE as u64;
        self.num_writes.fetch_add(1, Ordering::Relaxed);

        let mut db_io = self.db_io.lock().unwrap();
        db_io.seek(SeekFrom::Start(offset)).unwrap();
        if let Err(e) = db_io.write_all(page_data) {
            panic!("I/O error while writing: {:?}", e);
        }
        // Keep the file in sync on every write; this crate does not
        // implement group commit or a log-structured writer.
        db_io.flush().unwrap();
        self.num_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a page from the database file. Reads past the current end of
    /// file are tolerated and zero-filled, so that fetching a page that was
    /// allocated but never flushed returns a page of zeroes rather than
    /// erroring.
    pub fn read_page(&self, page_id: PageId, page_data: &mut [u8; BUSTUB_PAGE_SIZE]) {
        let offset = page_id as u64 * BUSTUB_PAGE_SIZE as u64;
        let mut db_io = self.db_io.lock().unwrap();
        let file_len = db_io.metadata().unwrap().len();
        if offset >= file_len {
            page_data.fill(0);
            return;
        }
        db_io.seek(SeekFrom::Start(offset)).unwrap();
        match db_io.read(page_data) {
            Ok(read_count) => {
                if read_count < BUSTUB_PAGE_SIZE {
                    debug!("read less than a page for page_id={page_id}");
                    page_data[read_count..].fill(0);
                }
            }
            Err(e) => panic!("I/O error while reading: {:?}", e),
        }
    }

    /// Allocates a fresh page id. Not used by the buffer pool (which
    /// partitions ids itself so a parallel pool's instances never collide,
    /// see `buffer::buffer_pool_manager`), but available for callers that
    /// drive the disk manager directly.
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Records a page as deallocated. This crate does not reclaim file
    /// space or recycle freed page ids; it is bookkeeping only.
    pub fn deallocate_page(&self, page_id: PageId) {
        self.deallocated.lock().unwrap().insert(page_id);
    }

    pub fn is_deallocated(&self, page_id: PageId) -> bool {
        self.deallocated.lock().unwrap().contains(&page_id)
    }

    pub fn get_num_flushes(&self) -> u64 {
        self.num_flushes.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u64 {
        self.num_writes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn read_write_page() {
        let mut buf = [0; BUSTUB_PAGE_SIZE];
        let mut data = [0; BUSTUB_PAGE_SIZE];

        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let dm = DiskManager::new(db_file.to_str().unwrap());
        let test_str = b"A test string.";
        data[..test_str.len()].copy_from_slice(test_str);

        dm.read_page(0, &mut buf); // tolerate empty read

        dm.write_page(0, &data);
        dm.read_page(0, &mut buf);
        assert_eq!(buf, data);

        buf.fill(0);
        dm.write_page(5, &data);
        dm.read_page(5, &mut buf);
        assert_eq!(buf, data);
    }

    #[test]
    fn allocate_and_deallocate_page() {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let dm = DiskManager::new(db_file.to_str().unwrap());

        let a = dm.allocate_page();
        let b = dm.allocate_page();
        assert_ne!(a, b);

        assert!(!dm.is_deallocated(a));
        dm.deallocate_page(a);
        assert!(dm.is_deallocated(a));
    }

    #[test]
    fn cloned_handles_share_the_same_file() {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let dm = DiskManager::new(db_file.to_str().unwrap());
        let dm2 = dm.clone();

        let mut data = [0u8; BUSTUB_PAGE_SIZE];
        data[0] = 42;
        dm.write_page(3, &data);

        let mut buf = [0u8; BUSTUB_PAGE_SIZE];
        dm2.read_page(3, &mut buf);
        assert_eq!(buf, data);
    }
}
