use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::frame::AudioFrame;

/// Creates the bounded capture → writer queue, split into its two ends.
///
/// A fresh queue is created for every recording session so a new session
/// never starts with stale frames.
pub fn frame_queue(capacity: usize) -> (FramePusher, FramePopper) {
    let (tx, rx) = bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FramePusher {
            tx,
            dropped: dropped.clone(),
        },
        FramePopper { rx, dropped },
    )
}

/// Producer end. Insertion never blocks.
pub struct FramePusher {
    tx: Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FramePusher {
    /// Non-blocking insert. A full queue drops the frame and counts it;
    /// capture always stays real-time.
    pub fn push(&self, frame: AudioFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Frame queue full, dropping frame ({} dropped so far)", total);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer end. Removal waits at most the given timeout.
pub struct FramePopper {
    rx: Receiver<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FramePopper {
    pub fn pop_timeout(&self, timeout: Duration) -> Option<AudioFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
