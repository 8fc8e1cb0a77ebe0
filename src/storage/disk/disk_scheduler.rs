use std::thread;

use tokio::sync::oneshot;

use crate::common::config::PageId;
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;

/// Represents a Read, Write, or Deallocate request for the DiskManager to
/// execute.
pub enum DiskRequest {
    Read {
        /// The page being read from disk.
        page: Page,
        /// Callback used to signal to the request issuer when the request
        /// has been completed.
        callback: oneshot::Sender<()>,
    },
    Write {
        /// The page being written out to disk.
        page: Page,
        /// Callback used to signal to the request issuer when the request
        /// has been completed.
        callback: oneshot::Sender<()>,
    },
    Deallocate {
        page_id: PageId,
        callback: oneshot::Sender<()>,
    },
}

/// The DiskScheduler schedules disk read, write, and deallocate operations.
///
/// A request is scheduled by calling `DiskScheduler::schedule` with an
/// appropriate `DiskRequest`. The scheduler maintains a background worker
/// thread that processes the scheduled requests using the disk manager. The
/// background thread is created in the constructor and joined on drop.
pub struct DiskScheduler {
    /// A shared queue to concurrently schedule and process requests. When
    /// the DiskScheduler is dropped, `None` is put into the queue to signal
    /// to the background thread to stop execution.
    request_queue: std::sync::mpsc::Sender<Option<DiskRequest>>,

    /// The background thread responsible for issuing scheduled requests to
    /// the disk manager.
    background_thread: Option<thread::JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: DiskManager) -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            request_queue: tx,
            background_thread: Some(thread::spawn(move || {
                Self::start_worker_thread(rx, disk_manager)
            })),
        }
    }

    /// Schedules a request for the DiskManager to execute.
    pub fn schedule(&self, r: DiskRequest) {
        self.request_queue.send(Some(r)).unwrap();
    }

    /// Schedules a page read and blocks until it completes.
    pub fn read_sync(&self, page: Page) {
        let (tx, rx) = oneshot::channel();
        self.schedule(DiskRequest::Read { page, callback: tx });
        rx.blocking_recv().unwrap();
    }

    /// Schedules a page write and blocks until it completes.
    pub fn write_sync(&self, page: Page) {
        let (tx, rx) = oneshot::channel();
        self.schedule(DiskRequest::Write { page, callback: tx });
        rx.blocking_recv().unwrap();
    }

    /// Schedules a page deallocation and blocks until it completes.
    pub fn deallocate_sync(&self, page_id: PageId) {
        let (tx, rx) = oneshot::channel();
        self.schedule(DiskRequest::Deallocate {
            page_id,
            callback: tx,
        });
        rx.blocking_recv().unwrap();
    }

    /// Background worker thread function that processes scheduled requests.
    ///
    /// The background thread processes requests while the DiskScheduler
    /// exists; this function returns only once `drop` sends the sentinel
    /// `None` into the queue.
    fn start_worker_thread(
        rx: std::sync::mpsc::Receiver<Option<DiskRequest>>,
        disk_manager: DiskManager,
    ) {
        while let Ok(r) = rx.recv() {
            match r {
                Some(DiskRequest::Read { page, callback }) => {
                    disk_manager.read_page(page.get_page_id().unwrap(), &mut page.get_mut_data());
                    let _ = callback.send(());
                }
                Some(DiskRequest::Write { page, callback }) => {
                    disk_manager.write_page(page.get_page_id().unwrap(), &page.get_data());
                    let _ = callback.send(());
                }
                Some(DiskRequest::Deallocate { page_id, callback }) => {
                    disk_manager.deallocate_page(page_id);
                    let _ = callback.send(());
                }
                None => break,
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Put `None` in the queue to signal the worker thread to exit.
        let _ = self.request_queue.send(None);
        if let Some(handle) = self.background_thread.take() {
            handle.join().unwrap();
        }
    }
}
