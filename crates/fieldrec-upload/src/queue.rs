use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

use fieldrec_storage::FinishedRecordings;

/// Recordings waiting to be uploaded.
pub const UPLOAD_QUEUE_CAPACITY: usize = 20;

/// Bounded FIFO of finished recordings awaiting upload.
///
/// Only the upload manager removes entries, and only after the remote has
/// confirmed the transfer, so an entry survives every failed attempt. The
/// queue is the at-least-once delivery log of the device.
pub struct UploadQueue {
    inner: Mutex<VecDeque<String>>,
    space: Condvar,
    capacity: usize,
}

impl UploadQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Condvar::new(),
            capacity,
        }
    }

    /// Appends an entry, blocking while the queue is full. The finalize
    /// path is the only caller and is not time-critical.
    pub fn push_blocking(&self, filename: String) {
        let mut queue = self.inner.lock();
        while queue.len() >= self.capacity {
            self.space.wait(&mut queue);
        }
        queue.push_back(filename);
    }

    /// Head entry without removing it.
    pub fn peek(&self) -> Option<String> {
        self.inner.lock().front().cloned()
    }

    /// Removes the head entry, but only if it still matches `filename`.
    /// Returns whether anything was removed.
    pub fn ack(&self, filename: &str) -> bool {
        let mut queue = self.inner.lock();
        if queue.front().map(|head| head == filename).unwrap_or(false) {
            queue.pop_front();
            self.space.notify_one();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl FinishedRecordings for UploadQueue {
    fn submit(&self, filename: String) {
        self.push_blocking(filename);
    }
}
