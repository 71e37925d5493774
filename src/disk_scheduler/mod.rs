use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::disk_manager::DiskManager;
use crate::pages::{PageBuf, PageId};

const REQUEST_QUEUE_DEPTH: usize = 64;

/// One read or write against the disk back-end. The buffer travels with
/// the request and comes back through the completion channel, so the
/// worker never aliases the caller's frame memory.
pub struct DiskRequest {
    pub is_write: bool,
    pub data: Box<PageBuf>,
    pub page_id: PageId,
    pub callback: Sender<(bool, Box<PageBuf>)>,
}

/// One-shot future for a scheduled request.
pub struct DiskFuture {
    rx: Receiver<(bool, Box<PageBuf>)>,
}

impl DiskFuture {
    /// Blocks until the worker signals completion, returning the buffer.
    pub fn wait(self) -> (bool, Box<PageBuf>) {
        self.rx.recv().expect("disk worker dropped the completion")
    }
}

/// Serialises page I/O on a single background worker. Requests are served
/// strictly FIFO; a `None` on the queue is the shutdown sentinel.
pub struct DiskScheduler {
    request_tx: Sender<Option<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: DiskManager) -> Self {
        let (request_tx, request_rx) = bounded::<Option<DiskRequest>>(REQUEST_QUEUE_DEPTH);
        let worker = std::thread::spawn(move || Self::worker_loop(disk_manager, request_rx));
        Self {
            request_tx,
            worker: Some(worker),
        }
    }

    /// A one-shot promise/future pair for a request's completion.
    pub fn create_promise() -> (Sender<(bool, Box<PageBuf>)>, DiskFuture) {
        let (done_tx, done_rx) = bounded(1);
        (done_tx, DiskFuture { rx: done_rx })
    }

    pub fn schedule(&self, request: DiskRequest) {
        self.request_tx
            .send(Some(request))
            .expect("disk worker is gone");
    }

    fn worker_loop(disk_manager: DiskManager, requests: Receiver<Option<DiskRequest>>) {
        while let Ok(Some(mut request)) = requests.recv() {
            if request.is_write {
                disk_manager
                    .write_page(request.page_id, &request.data)
                    .expect("disk write failed");
            } else {
                disk_manager
                    .read_page(request.page_id, &mut request.data)
                    .expect("disk read failed");
            }
            // the caller may have dropped the future; that's its business
            let _ = request.callback.send((true, request.data));
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        let _ = self.request_tx.send(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
