use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters for the capture → write → upload pipeline.
///
/// All fields are atomics behind `Arc`s so a clone can be handed to every
/// worker thread. Updates use relaxed ordering; the numbers are for
/// operators, not for synchronization.
#[derive(Clone)]
pub struct RecorderMetrics {
    pub frames_captured: Arc<AtomicU64>,
    pub frames_dropped: Arc<AtomicU64>,
    pub capture_read_errors: Arc<AtomicU64>,
    pub capture_stalls: Arc<AtomicU64>,

    pub frames_written: Arc<AtomicU64>,
    pub bytes_recorded: Arc<AtomicU64>,
    pub write_faults: Arc<AtomicU64>,
    pub sessions_finalized: Arc<AtomicU64>,

    pub uploads_started: Arc<AtomicU64>,
    pub uploads_completed: Arc<AtomicU64>,
    pub upload_retries: Arc<AtomicU64>,
    pub upload_bytes: Arc<AtomicU64>,
    pub markers_sent: Arc<AtomicU64>,
    pub uploads_discarded: Arc<AtomicU64>,

    /// Average absolute sample value of the most recent frame.
    pub current_level_avg: Arc<AtomicI64>,
    /// Peak absolute sample value of the most recent frame.
    pub current_level_peak: Arc<AtomicI64>,

    last_frame_at: Arc<RwLock<Option<Instant>>>,
}

impl Default for RecorderMetrics {
    fn default() -> Self {
        Self {
            frames_captured: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            capture_read_errors: Arc::new(AtomicU64::new(0)),
            capture_stalls: Arc::new(AtomicU64::new(0)),
            frames_written: Arc::new(AtomicU64::new(0)),
            bytes_recorded: Arc::new(AtomicU64::new(0)),
            write_faults: Arc::new(AtomicU64::new(0)),
            sessions_finalized: Arc::new(AtomicU64::new(0)),
            uploads_started: Arc::new(AtomicU64::new(0)),
            uploads_completed: Arc::new(AtomicU64::new(0)),
            upload_retries: Arc::new(AtomicU64::new(0)),
            upload_bytes: Arc::new(AtomicU64::new(0)),
            markers_sent: Arc::new(AtomicU64::new(0)),
            uploads_discarded: Arc::new(AtomicU64::new(0)),
            current_level_avg: Arc::new(AtomicI64::new(0)),
            current_level_peak: Arc::new(AtomicI64::new(0)),
            last_frame_at: Arc::new(RwLock::new(None)),
        }
    }
}

impl RecorderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the level stats of one written frame.
    pub fn frame_level(&self, sum: u64, peak: i32, sample_count: usize) {
        if sample_count > 0 {
            let avg = (sum / sample_count as u64) as i64;
            self.current_level_avg.store(avg, Ordering::Relaxed);
            self.current_level_peak.store(peak as i64, Ordering::Relaxed);
        }
        *self.last_frame_at.write() = Some(Instant::now());
    }

    /// Seconds since the writer last consumed a frame, if it ever has.
    pub fn seconds_since_last_frame(&self) -> Option<u64> {
        self.last_frame_at.read().map(|t| t.elapsed().as_secs())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            capture_read_errors: self.capture_read_errors.load(Ordering::Relaxed),
            capture_stalls: self.capture_stalls.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            bytes_recorded: self.bytes_recorded.load(Ordering::Relaxed),
            write_faults: self.write_faults.load(Ordering::Relaxed),
            sessions_finalized: self.sessions_finalized.load(Ordering::Relaxed),
            uploads_started: self.uploads_started.load(Ordering::Relaxed),
            uploads_completed: self.uploads_completed.load(Ordering::Relaxed),
            upload_retries: self.upload_retries.load(Ordering::Relaxed),
            upload_bytes: self.upload_bytes.load(Ordering::Relaxed),
            markers_sent: self.markers_sent.load(Ordering::Relaxed),
            uploads_discarded: self.uploads_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters, printable as one summary line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub capture_read_errors: u64,
    pub capture_stalls: u64,
    pub frames_written: u64,
    pub bytes_recorded: u64,
    pub write_faults: u64,
    pub sessions_finalized: u64,
    pub uploads_started: u64,
    pub uploads_completed: u64,
    pub upload_retries: u64,
    pub upload_bytes: u64,
    pub markers_sent: u64,
    pub uploads_discarded: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "captured {} frames ({} dropped, {} read errors, {} stalls), \
             wrote {} frames / {} bytes in {} sessions ({} write faults), \
             uploads {}/{} ({} retries, {} bytes, {} markers, {} discarded)",
            self.frames_captured,
            self.frames_dropped,
            self.capture_read_errors,
            self.capture_stalls,
            self.frames_written,
            self.bytes_recorded,
            self.sessions_finalized,
            self.write_faults,
            self.uploads_completed,
            self.uploads_started,
            self.upload_retries,
            self.upload_bytes,
            self.markers_sent,
            self.uploads_discarded,
        )
    }
}
