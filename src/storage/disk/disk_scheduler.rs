use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{trace, warn};

use crate::common::{FerruleError, PageId, Result, DISK_SCHEDULER_QUEUE_DEPTH, PAGE_SIZE};

use super::DiskIo;

/// Represents a disk I/O request.
///
/// Requests own their buffers, so nothing borrowed crosses the thread boundary.
pub enum DiskRequest {
    /// Read a page; the filled image comes back on `reply`.
    Read {
        page_id: PageId,
        reply: Sender<Result<Bytes>>,
    },
    /// Write `data` as the page image.
    Write {
        page_id: PageId,
        data: Bytes,
        reply: Sender<Result<()>>,
    },
}

impl DiskRequest {
    /// Creates a read request and the receiver its result arrives on.
    pub fn read(page_id: PageId) -> (Self, Receiver<Result<Bytes>>) {
        let (reply, rx) = bounded(1);
        (Self::Read { page_id, reply }, rx)
    }

    /// Creates a write request and the receiver its completion arrives on.
    pub fn write(page_id: PageId, data: Bytes) -> (Self, Receiver<Result<()>>) {
        let (reply, rx) = bounded(1);
        (Self::Write { page_id, data, reply }, rx)
    }
}

/// DiskScheduler manages a background worker thread that processes disk I/O requests.
/// Requests are served in submission order.
pub struct DiskScheduler {
    /// The page store used by the worker
    disk: Arc<dyn DiskIo>,
    /// Channel sender for queuing requests; dropped on shutdown
    request_sender: Option<Sender<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk: Arc<dyn DiskIo>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(DISK_SCHEDULER_QUEUE_DEPTH);

        let worker_disk = Arc::clone(&disk);
        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(worker_disk, receiver);
        });

        Self {
            disk,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| FerruleError::DiskScheduler("scheduler is shut down".into()))?;
        sender
            .send(request)
            .map_err(|e| FerruleError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Schedules a read request and waits for completion.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (request, rx) = DiskRequest::read(page_id);
        self.schedule(request)?;

        let image = Self::wait(&rx)??;
        data.copy_from_slice(&image);
        Ok(())
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (request, rx) = DiskRequest::write(page_id, Bytes::copy_from_slice(data));
        self.schedule(request)?;

        Self::wait(&rx)?
    }

    fn wait<T>(rx: &Receiver<T>) -> Result<T> {
        rx.recv().map_err(|e| {
            FerruleError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })
    }

    /// The background worker thread function.
    /// Runs until every sender is dropped and the queue is drained.
    fn start_worker_thread(disk: Arc<dyn DiskIo>, receiver: Receiver<DiskRequest>) {
        while let Ok(request) = receiver.recv() {
            Self::process_request(disk.as_ref(), request);
        }
        trace!("disk_scheduler.worker_exit");
    }

    fn process_request(disk: &dyn DiskIo, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, reply } => {
                let mut buf = BytesMut::zeroed(PAGE_SIZE);
                let result = disk.read_page(page_id, &mut buf).map(|()| buf.freeze());
                if let Err(e) = &result {
                    warn!(page_id = page_id.as_u32(), error = %e, "disk_scheduler.read_failed");
                }
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                reply,
            } => {
                let result = disk.write_page(page_id, &data);
                if let Err(e) = &result {
                    warn!(page_id = page_id.as_u32(), error = %e, "disk_scheduler.write_failed");
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Returns the underlying page store.
    pub fn disk(&self) -> &Arc<dyn DiskIo> {
        &self.disk
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        self.request_sender.take();

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
